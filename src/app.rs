use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::config::Config;
use crate::form::FormState;
use crate::submit::{apply_result, Dispatch, PendingSend, Submitter};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Recipient,
    Subject,
    Body,
}

impl FormField {
    fn next(self) -> Self {
        match self {
            FormField::Recipient => FormField::Subject,
            FormField::Subject => FormField::Body,
            FormField::Body => FormField::Recipient,
        }
    }

    fn previous(self) -> Self {
        match self {
            FormField::Recipient => FormField::Body,
            FormField::Subject => FormField::Recipient,
            FormField::Body => FormField::Subject,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileItem {
    pub name: String,
    pub path: PathBuf,
    pub is_directory: bool,
    pub size: Option<u64>, // None for directories
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Compose,
    FileBrowser,
    AttachmentInput,
    Help,
}

pub struct App {
    pub config: Config,
    pub submitter: Submitter,
    runtime: Handle,
    pub should_quit: bool,
    pub mode: AppMode,
    pub focus: FormField,

    pub form: FormState,
    pub pending_send: Option<PendingSend>,

    pub error_message: Option<String>,
    pub info_message: Option<String>,
    pub message_timeout: Option<Instant>,

    // Attachment picking
    pub attachment_input_text: String,
    pub file_browser_items: Vec<FileItem>,
    pub file_browser_selected: usize,
    pub file_browser_current_path: PathBuf,
}

impl App {
    pub fn new(config: Config, submitter: Submitter, runtime: Handle) -> Self {
        let file_browser_current_path = config.ui.browser_start_dir();
        log::debug!("Form targets {}", submitter.endpoint());

        Self {
            config,
            submitter,
            runtime,
            should_quit: false,
            mode: AppMode::Compose,
            focus: FormField::Recipient,
            form: FormState::new(),
            pending_send: None,
            error_message: None,
            info_message: None,
            message_timeout: None,
            attachment_input_text: String::new(),
            file_browser_items: Vec::new(),
            file_browser_selected: 0,
            file_browser_current_path,
        }
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) -> AppResult<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'))
        {
            self.should_quit = true;
            return Ok(());
        }

        match self.mode {
            AppMode::Compose => self.handle_compose_mode(key),
            AppMode::FileBrowser => self.handle_file_browser_input(key),
            AppMode::AttachmentInput => self.handle_attachment_input(key),
            AppMode::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('q')) {
                    self.mode = AppMode::Compose;
                }
                Ok(())
            }
        }
    }

    fn handle_compose_mode(&mut self, key: KeyEvent) -> AppResult<()> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Char('s') if ctrl => {
                self.trigger_send();
                Ok(())
            }
            KeyCode::Char('o') if ctrl => self.add_attachment(),
            KeyCode::Char('p') if ctrl => {
                self.mode = AppMode::AttachmentInput;
                self.attachment_input_text.clear();
                self.show_info("Type a file path, Enter to attach, Esc to cancel");
                Ok(())
            }
            KeyCode::Char('r') if ctrl => {
                self.remove_attachment();
                Ok(())
            }
            KeyCode::F(1) => {
                self.mode = AppMode::Help;
                Ok(())
            }
            KeyCode::Esc => {
                self.error_message = None;
                self.info_message = None;
                self.message_timeout = None;
                Ok(())
            }
            KeyCode::Tab | KeyCode::Down => {
                self.focus = self.focus.next();
                Ok(())
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = self.focus.previous();
                Ok(())
            }
            KeyCode::Enter => {
                if self.focus == FormField::Body {
                    self.form.body.push('\n');
                } else {
                    self.focus = self.focus.next();
                }
                Ok(())
            }
            KeyCode::Backspace => {
                self.focused_text_mut().pop();
                Ok(())
            }
            KeyCode::Char(c) if !ctrl => {
                self.focused_text_mut().push(c);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn focused_text_mut(&mut self) -> &mut String {
        match self.focus {
            FormField::Recipient => &mut self.form.recipient,
            FormField::Subject => &mut self.form.subject,
            FormField::Body => &mut self.form.body,
        }
    }

    /// Start sending the current form. A send already in flight blocks a
    /// second one.
    pub fn trigger_send(&mut self) {
        match self.submitter.dispatch(&self.runtime, &mut self.form) {
            Dispatch::Started(pending) => {
                self.pending_send = Some(pending);
            }
            Dispatch::Finished => {}
            Dispatch::Busy => {
                self.show_info("A message is already being sent");
            }
        }
    }

    pub fn add_attachment(&mut self) -> AppResult<()> {
        self.mode = AppMode::FileBrowser;
        self.file_browser_selected = 0;
        self.load_file_browser_directory()?;
        // A failed load has already reported the error and left the browser
        if self.mode == AppMode::FileBrowser {
            self.show_info("Navigate with ↑↓, Enter to select, Backspace for parent dir, Esc to cancel");
        }
        Ok(())
    }

    /// Attach a typed path. `~` is expanded; the file must exist now but is
    /// only read when the form is sent.
    pub fn add_attachment_from_path(&mut self, file_path: &str) {
        let expanded = shellexpand::tilde(file_path).into_owned();
        let path = Path::new(&expanded);

        if path.is_file() {
            self.attach(path.to_path_buf());
        } else {
            self.show_error(&format!("Not a readable file: {}", expanded));
        }
    }

    fn attach(&mut self, path: PathBuf) {
        let filename = self.form.attach(path).filename.clone();
        log::info!("Attached {}", filename);
        self.show_info(&format!("Attached {}", filename));
    }

    pub fn remove_attachment(&mut self) {
        match self.form.detach() {
            Some(attachment) => self.show_info(&format!("Removed attachment: {}", attachment.filename)),
            None => self.show_info("No attachment selected"),
        }
    }

    fn handle_attachment_input(&mut self, key: KeyEvent) -> AppResult<()> {
        match key.code {
            KeyCode::Esc => {
                self.mode = AppMode::Compose;
                self.attachment_input_text.clear();
                self.show_info("Attachment input cancelled");
            }
            KeyCode::Enter => {
                let file_path = self.attachment_input_text.trim().to_string();
                self.mode = AppMode::Compose;
                self.attachment_input_text.clear();
                if !file_path.is_empty() {
                    self.add_attachment_from_path(&file_path);
                }
            }
            KeyCode::Tab => {
                if self.attachment_input_text.is_empty() || self.attachment_input_text == "~" {
                    self.attachment_input_text = "~/Downloads/".to_string();
                }
            }
            KeyCode::Backspace => {
                self.attachment_input_text.pop();
            }
            KeyCode::Char(c) => {
                self.attachment_input_text.push(c);
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_file_browser_input(&mut self, key: KeyEvent) -> AppResult<()> {
        match key.code {
            KeyCode::Esc => {
                self.mode = AppMode::Compose;
                self.show_info("File selection cancelled");
            }
            KeyCode::Up => {
                self.file_browser_selected = self.file_browser_selected.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.file_browser_selected + 1 < self.file_browser_items.len() {
                    self.file_browser_selected += 1;
                }
            }
            KeyCode::Backspace => {
                if let Some(parent) = self.file_browser_current_path.parent() {
                    self.file_browser_current_path = parent.to_path_buf();
                    self.file_browser_selected = 0;
                    self.load_file_browser_directory()?;
                }
            }
            KeyCode::Enter => {
                if let Some(item) = self.file_browser_items.get(self.file_browser_selected).cloned() {
                    if item.is_directory {
                        self.file_browser_current_path = item.path;
                        self.file_browser_selected = 0;
                        self.load_file_browser_directory()?;
                    } else {
                        self.mode = AppMode::Compose;
                        self.attach(item.path);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn load_file_browser_directory(&mut self) -> AppResult<()> {
        self.file_browser_items.clear();

        log::debug!("Loading directory: {}", self.file_browser_current_path.display());

        match std::fs::read_dir(&self.file_browser_current_path) {
            Ok(entries) => {
                let mut items = Vec::new();

                if let Some(parent) = self.file_browser_current_path.parent() {
                    items.push(FileItem {
                        name: "..".to_string(),
                        path: parent.to_path_buf(),
                        is_directory: true,
                        size: None,
                    });
                }

                for entry in entries.flatten() {
                    let path = entry.path();
                    let name = entry.file_name().to_string_lossy().to_string();

                    // Skip hidden files (starting with .)
                    if name.starts_with('.') {
                        continue;
                    }

                    let is_directory = path.is_dir();
                    if !is_directory && !self.config.ui.allows(&path) {
                        continue;
                    }
                    let size = if is_directory {
                        None
                    } else {
                        std::fs::metadata(&path).ok().map(|m| m.len())
                    };

                    items.push(FileItem {
                        name,
                        path,
                        is_directory,
                        size,
                    });
                }

                // Sort: directories first, then files, both alphabetically
                items.sort_by(|a, b| match (a.is_directory, b.is_directory) {
                    (true, false) => std::cmp::Ordering::Less,
                    (false, true) => std::cmp::Ordering::Greater,
                    _ => a.name.cmp(&b.name),
                });

                log::debug!("Found {} items in directory", items.len());
                self.file_browser_items = items;
            }
            Err(e) => {
                self.show_error(&format!("Failed to read directory: {}", e));
                self.mode = AppMode::Compose;
            }
        }

        Ok(())
    }

    pub fn show_error(&mut self, message: &str) {
        self.error_message = Some(message.to_string());
        self.info_message = None;
        self.message_timeout =
            Some(Instant::now() + Duration::from_secs(self.config.ui.message_timeout_secs + 2));
    }

    pub fn show_info(&mut self, message: &str) {
        self.info_message = Some(message.to_string());
        self.error_message = None;
        self.message_timeout =
            Some(Instant::now() + Duration::from_secs(self.config.ui.message_timeout_secs));
    }

    pub fn tick(&mut self) -> AppResult<()> {
        // Write a finished send back into the form
        if let Some(pending) = self.pending_send.as_mut() {
            if let Some(result) = pending.poll() {
                apply_result(&mut self.form, &result);
                self.pending_send = None;
            }
        }

        // Clear messages after timeout
        if let Some(timeout) = self.message_timeout {
            if Instant::now() > timeout {
                self.error_message = None;
                self.info_message = None;
                self.message_timeout = None;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::SendPhase;
    use crate::submit::{Transport, TransportError, SENT_STATUS};
    use async_trait::async_trait;
    use reqwest::Url;
    use std::sync::Arc;

    struct FixedStatus(u16);

    #[async_trait]
    impl Transport for FixedStatus {
        async fn post(&self, _: Url, _: String, _: Vec<u8>) -> Result<u16, TransportError> {
            Ok(self.0)
        }
    }

    fn app_with(status: u16, start_dir: Option<&Path>) -> App {
        let mut config = Config::default();
        config.ui.start_dir = start_dir.map(|p| p.to_string_lossy().into_owned());
        let submitter = Submitter::new(config.endpoint.clone(), Arc::new(FixedStatus(status)));
        App::new(config, submitter, Handle::current())
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key_event(KeyEvent::new(code, KeyModifiers::NONE)).unwrap();
    }

    fn ctrl(app: &mut App, c: char) {
        app.handle_key_event(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
            .unwrap();
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    async fn wait_for_send(app: &mut App) {
        for _ in 0..100 {
            app.tick().unwrap();
            if app.pending_send.is_none() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("send did not finish");
    }

    #[tokio::test]
    async fn test_typing_fills_focused_fields() {
        let mut app = app_with(200, None);

        type_text(&mut app, "ali@example.com");
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "Hi");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "one");
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "twoo");
        press(&mut app, KeyCode::Backspace);

        assert_eq!(app.form.recipient, "ali@example.com");
        assert_eq!(app.form.subject, "Hi");
        assert_eq!(app.form.body, "one\ntwo");

        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.focus, FormField::Subject);
    }

    #[tokio::test]
    async fn test_ctrl_s_sends_and_keeps_fields() {
        let mut app = app_with(201, None);
        type_text(&mut app, "ali@example.com");

        ctrl(&mut app, 's');
        assert_eq!(app.form.phase, SendPhase::Sending);
        wait_for_send(&mut app).await;

        assert_eq!(app.form.phase, SendPhase::Succeeded);
        assert_eq!(app.form.status, SENT_STATUS);
        assert_eq!(app.form.recipient, "ali@example.com");
    }

    #[tokio::test]
    async fn test_remote_error_code_reaches_status() {
        let mut app = app_with(503, None);
        app.trigger_send();
        wait_for_send(&mut app).await;
        assert_eq!(app.form.phase, SendPhase::Failed);
        assert!(app.form.status.contains("503"));
    }

    #[tokio::test]
    async fn test_send_while_sending_shows_info() {
        let mut app = app_with(200, None);
        app.trigger_send();
        app.trigger_send();
        assert_eq!(
            app.info_message.as_deref(),
            Some("A message is already being sent")
        );
        wait_for_send(&mut app).await;
        assert_eq!(app.form.phase, SendPhase::Succeeded);
    }

    #[tokio::test]
    async fn test_file_browser_filters_and_attaches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("scans")).unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"pdf").unwrap();
        std::fs::write(dir.path().join("tool.exe"), b"exe").unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), b"x").unwrap();

        let mut app = app_with(200, Some(dir.path()));
        ctrl(&mut app, 'o');
        assert_eq!(app.mode, AppMode::FileBrowser);

        let names: Vec<&str> = app.file_browser_items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["..", "scans", "report.pdf"]);

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.mode, AppMode::Compose);
        let attachment = app.form.attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, "report.pdf");
        assert_eq!(attachment.path, dir.path().join("report.pdf"));
    }

    #[tokio::test]
    async fn test_unreadable_start_dir_keeps_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-here");

        let mut app = app_with(200, Some(&missing));
        ctrl(&mut app, 'o');

        assert_eq!(app.mode, AppMode::Compose);
        let error = app.error_message.as_deref().expect("read failure is shown");
        assert!(error.contains("Failed to read directory"), "{}", error);
        assert!(app.info_message.is_none());
        assert!(app.file_browser_items.is_empty());
    }

    #[tokio::test]
    async fn test_typed_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"hello").unwrap();

        let mut app = app_with(200, None);
        ctrl(&mut app, 'p');
        type_text(&mut app, &dir.path().join("missing.txt").to_string_lossy());
        press(&mut app, KeyCode::Enter);
        assert!(app.form.attachment.is_none());
        assert!(app.error_message.is_some());

        ctrl(&mut app, 'p');
        type_text(&mut app, &file.to_string_lossy());
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.form.attachment.as_ref().unwrap().filename, "notes.txt");

        ctrl(&mut app, 'r');
        assert!(app.form.attachment.is_none());
    }

    #[tokio::test]
    async fn test_ctrl_q_quits() {
        let mut app = app_with(200, None);
        ctrl(&mut app, 'q');
        assert!(app.should_quit);
    }
}
