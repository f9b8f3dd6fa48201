use std::path::Path;

/// A report file ready to be sent to `/predict`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ReportUpload {
    /// Build from in-memory bytes; the MIME type is guessed from the name.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    /// Read a report from disk.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        Ok(Self::new(file_name, bytes))
    }

    /// Images and PDFs are the only formats the analysis backend reads.
    pub fn is_supported_type(&self) -> bool {
        self.mime_type.starts_with("image/") || self.mime_type == "application/pdf"
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(ReportUpload::new("cbc.pdf", vec![1]).mime_type, "application/pdf");
        assert_eq!(ReportUpload::new("scan.PNG", vec![1]).mime_type, "image/png");
        assert_eq!(ReportUpload::new("photo.jpg", vec![1]).mime_type, "image/jpeg");
    }

    #[test]
    fn supported_types() {
        assert!(ReportUpload::new("cbc.pdf", vec![1]).is_supported_type());
        assert!(ReportUpload::new("scan.webp", vec![1]).is_supported_type());
        assert!(!ReportUpload::new("notes.txt", vec![1]).is_supported_type());
        assert!(!ReportUpload::new("report", vec![1]).is_supported_type());
    }

    #[tokio::test]
    async fn from_path_reads_bytes_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labs.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let upload = ReportUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, "labs.pdf");
        assert_eq!(upload.mime_type, "application/pdf");
        assert_eq!(upload.size_bytes(), 8);
    }

    #[tokio::test]
    async fn from_path_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReportUpload::from_path(&dir.path().join("nope.pdf")).await.is_err());
    }
}
