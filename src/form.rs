use std::path::{Path, PathBuf};

/// A file chosen by the user. Only the reference is held; bytes are read
/// when a send is triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub filename: String,
}

impl Attachment {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = display_name(&path);
        Self { path, filename }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    Sending,
    Succeeded,
    Failed,
}

/// Live values of the compose form. Owned by the UI; fields persist after a
/// send.
#[derive(Debug, Clone)]
pub struct FormState {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
    pub status: String,
    pub phase: SendPhase,
}

/// Owned copy of the form taken when a send is triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSnapshot {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            subject: String::new(),
            body: String::new(),
            attachment: None,
            status: String::new(),
            phase: SendPhase::Idle,
        }
    }
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            recipient: self.recipient.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            attachment: self.attachment.clone(),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.phase == SendPhase::Sending
    }

    pub fn set_status(&mut self, phase: SendPhase, status: impl Into<String>) {
        self.phase = phase;
        self.status = status.into();
    }

    pub fn attach(&mut self, path: impl Into<PathBuf>) -> &Attachment {
        self.attachment.insert(Attachment::from_path(path))
    }

    pub fn detach(&mut self) -> Option<Attachment> {
        self.attachment.take()
    }
}
