use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use medtrail_lib::auth;
use medtrail_lib::client::{
    AnalysisService, AuthService, HttpClient, MockAnalysisService, MockAuthService,
};
use medtrail_lib::config::{self, ClientConfig};
use medtrail_lib::models::AnalysisBundle;
use medtrail_lib::pipeline::{HistoryAggregator, ProgressPhase, UploadOrchestrator};
use medtrail_lib::session::{FileSessionRepository, SessionContext, SessionError};

#[derive(Parser)]
#[command(name = "medtrail", version)]
#[command(about = "Submit medical reports for analysis and review past results", long_about = None)]
struct Cli {
    /// Analysis backend base URL (overrides MEDTRAIL_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Use the built-in offline backend
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with an existing account
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MEDTRAIL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "MEDTRAIL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Analyze a report (image or PDF)
    Analyze {
        file: PathBuf,
        /// Print the normalized result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List past reports, newest first
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Show one report in full
        #[arg(long)]
        id: Option<String>,
    },
}

struct Backend {
    analysis: Arc<dyn AnalysisService>,
    auth: Arc<dyn AuthService>,
}

impl Backend {
    fn connect(config: &ClientConfig, session: &SessionContext, demo: bool) -> Result<Self> {
        if demo {
            tracing::info!("Using offline demo backend");
            return Ok(Self {
                analysis: Arc::new(MockAnalysisService::demo()),
                auth: Arc::new(MockAuthService::new()),
            });
        }
        let client = Arc::new(HttpClient::new(config)?.with_bearer_token(session.token()));
        Ok(Self {
            analysis: client.clone(),
            auth: client,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    medtrail_lib::init_tracing();
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(url) = &cli.api_url {
        config = config.with_api_base_url(url);
    }
    tracing::debug!(api = %config.api_base_url, "{} v{}", config::APP_NAME, config::APP_VERSION);

    let repo = FileSessionRepository::new(config.data_dir.clone());
    let session = Arc::new(SessionContext::restore(Box::new(repo)).context("loading session")?);
    let backend = Backend::connect(&config, &session, cli.demo)?;

    match cli.command {
        Commands::Login { email, password } => {
            let user = auth::login(backend.auth.as_ref(), &session, &email, &password).await?;
            println!("Signed in as {} <{}>", user.username, user.email);
        }
        Commands::Signup {
            username,
            email,
            password,
        } => {
            let user =
                auth::signup(backend.auth.as_ref(), &session, &username, &email, &password).await?;
            println!("Welcome, {}!", user.username);
        }
        Commands::Logout => {
            auth::logout(&session)?;
            println!("Signed out");
        }
        Commands::Whoami => match session.user() {
            Some(user) => {
                println!("{} <{}>", user.username, user.email);
                println!("Reports analyzed: {}", user.reports_analyzed);
                if let Some(at) = user.last_upload_date {
                    println!("Last upload: {}", at.format("%Y-%m-%d %H:%M UTC"));
                }
            }
            None => println!("Not signed in"),
        },
        Commands::Analyze { file, json } => {
            analyze(&config, backend.analysis, session, &file, json).await?;
        }
        Commands::History { limit, id } => {
            let email = session.email().ok_or(SessionError::NotAuthenticated)?;
            let mut history = HistoryAggregator::new(backend.analysis);
            history.fetch_history(&email).await?;

            if let Some(id) = id {
                let record = history
                    .get(&id)
                    .with_context(|| format!("no report with id {id}"))?;
                print_bundle(record.normalized_view());
            } else if history.is_empty() {
                println!("No reports yet");
            } else {
                for record in history.records().iter().take(limit) {
                    let view = record.normalized_view();
                    let when = record
                        .timestamp()
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "unknown date".to_string());
                    let top = view
                        .top_disease()
                        .map(|d| format!("{} ({}%)", d.name, d.probability_percent))
                        .unwrap_or_else(|| "no prediction".to_string());
                    println!("{}  {when}  {:<8}  {top}", record.id(), view.risk.status.as_str());
                }
            }
        }
    }

    Ok(())
}

async fn analyze(
    config: &ClientConfig,
    service: Arc<dyn AnalysisService>,
    session: Arc<SessionContext>,
    file: &std::path::Path,
    json: bool,
) -> Result<()> {
    let email = session.email();
    let orchestrator = UploadOrchestrator::new(service, session, config.stage_interval());

    let mut progress = orchestrator.progress();
    let render = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snap = *progress.borrow_and_update();
            if snap.phase == ProgressPhase::Cancelled {
                break;
            }
            if let Some((label, detail)) = snap.label() {
                eprintln!("[{}/{}] {label} ({detail})", snap.stage + 1, snap.stage_count);
            }
            if snap.phase == ProgressPhase::Finalized {
                break;
            }
        }
    });

    let result = orchestrator.analyze_path(file, email.as_deref()).await;
    match &result {
        Ok(_) => {
            if let Err(e) = render.await {
                tracing::debug!(error = %e, "Progress renderer ended abnormally");
            }
        }
        Err(_) => render.abort(),
    }
    let bundle = result.with_context(|| format!("analyzing {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(bundle.as_ref())?);
    } else {
        print_bundle(&bundle);
    }
    Ok(())
}

fn print_bundle(bundle: &AnalysisBundle) {
    println!("Risk: {} (score {:.2})", bundle.risk.status.label(), bundle.risk.score);
    for factor in &bundle.risk.risk_factors {
        println!("  - {} [{}]", factor.name, factor.severity);
    }

    if !bundle.diseases.is_empty() {
        println!("Predictions:");
        for disease in &bundle.diseases {
            println!("  {:>3}%  {}", disease.probability_percent, disease.name);
        }
    }

    println!();
    println!("{}", bundle.summary.summary_text);
    for rec in &bundle.summary.recommendations {
        println!("  * {rec}");
    }
    println!(
        "Confidence {:.0}% · model {}",
        bundle.summary.confidence * 100.0,
        bundle.summary.model_version
    );
}
