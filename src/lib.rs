pub mod app;
pub mod config;
pub mod form;
pub mod multipart;
pub mod submit;
pub mod ui;

// Re-export commonly used types
pub use app::App;
pub use config::Config;
pub use form::{Attachment, FormState, SendPhase};
pub use multipart::{build_multipart, MultipartBody};
pub use submit::{SubmitError, Submitter};
