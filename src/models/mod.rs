pub mod raw;
pub mod session;
pub mod upload;
pub mod view;

pub use raw::*;
pub use session::*;
pub use upload::*;
pub use view::*;
