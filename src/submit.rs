//! One-shot submission of the compose form to the backend endpoint.
//!
//! A send goes through three steps: the endpoint is validated, the form is
//! snapshotted and serialized, and the serialized request is posted on a
//! background task. The result comes back exactly once through a one-shot
//! channel and is written into the form by the UI thread.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::form::{FormSnapshot, FormState, SendPhase};
use crate::multipart::{build_multipart, FilePart, MultipartBody, TextFields};

pub const SENDING_STATUS: &str = "⏳ Sending...";
pub const SENT_STATUS: &str = "✅ Mail sent";
pub const CONFIG_ERROR_STATUS: &str = "❌ Invalid endpoint URL";
pub const TRANSPORT_ERROR_STATUS: &str = "❌ Send failed, no response from server";

#[derive(Error, Debug)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid endpoint URL '{endpoint}': {reason}")]
    Configuration { endpoint: String, reason: String },

    #[error("Failed to read attachment {}: {source}", .path.display())]
    AttachmentRead {
        path: PathBuf,
        filename: String,
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Server responded with HTTP {0}")]
    Remote(u16),
}

pub type SubmissionResult = std::result::Result<(), SubmitError>;

/// Text shown in the form's status line for a finished send.
pub fn status_line(result: &SubmissionResult) -> String {
    match result {
        Ok(()) => SENT_STATUS.to_string(),
        Err(SubmitError::Configuration { .. }) => CONFIG_ERROR_STATUS.to_string(),
        Err(SubmitError::AttachmentRead { filename, .. }) => {
            format!("❌ Could not read attachment {}", filename)
        }
        Err(SubmitError::Transport(_)) => TRANSPORT_ERROR_STATUS.to_string(),
        Err(SubmitError::Remote(code)) => format!("❌ Send failed ({})", code),
    }
}

/// Write a finished send back into the form.
pub fn apply_result(form: &mut FormState, result: &SubmissionResult) {
    let phase = if result.is_ok() {
        SendPhase::Succeeded
    } else {
        SendPhase::Failed
    };
    form.set_status(phase, status_line(result));
}

/// Parse the configured endpoint. Only absolute http(s) URLs with a host are
/// accepted.
pub fn validate_endpoint(endpoint: &str) -> Result<Url, SubmitError> {
    let config_error = |reason: String| SubmitError::Configuration {
        endpoint: endpoint.to_string(),
        reason,
    };

    let url = Url::parse(endpoint.trim()).map_err(|e| config_error(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(config_error(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(config_error("missing host".to_string()));
    }
    Ok(url)
}

/// A fully serialized request. Built at trigger time so later form edits
/// cannot reach it.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: Url,
    pub body: MultipartBody,
}

/// Validate the endpoint, read the attachment and encode the snapshot.
pub fn prepare(endpoint: &str, snapshot: &FormSnapshot) -> Result<PreparedRequest, SubmitError> {
    let url = validate_endpoint(endpoint)?;

    let file = match &snapshot.attachment {
        Some(attachment) => {
            let data =
                std::fs::read(&attachment.path).map_err(|source| SubmitError::AttachmentRead {
                    path: attachment.path.clone(),
                    filename: attachment.filename.clone(),
                    source,
                })?;
            Some((attachment.filename.as_str(), data))
        }
        None => None,
    };

    let body = build_multipart(
        TextFields {
            recipient: &snapshot.recipient,
            subject: &snapshot.subject,
            body: &snapshot.body,
        },
        file.as_ref().map(|(filename, data)| FilePart {
            filename,
            data: data.as_slice(),
        }),
    );

    Ok(PreparedRequest { url, body })
}

/// Anything that can POST a body and report the response status code.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: Url,
        content_type: String,
        body: Vec<u8>,
    ) -> Result<u16, TransportError>;
}

/// `reqwest`-backed transport. Uses the client's default timeouts.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: Url,
        content_type: String,
        body: Vec<u8>,
    ) -> Result<u16, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

/// Post a prepared request and classify the outcome.
pub async fn deliver(transport: &dyn Transport, request: PreparedRequest) -> SubmissionResult {
    let PreparedRequest { url, body } = request;
    log::info!("Posting {} bytes to {}", body.bytes.len(), url);

    let code = transport.post(url, body.content_type, body.bytes).await?;
    match code {
        200 | 201 => {
            log::info!("Backend accepted the message (HTTP {})", code);
            Ok(())
        }
        other => Err(SubmitError::Remote(other)),
    }
}

/// Result of asking the submitter to start a send.
#[derive(Debug)]
pub enum Dispatch {
    /// The request is in flight; poll the handle for the result.
    Started(PendingSend),
    /// The send failed before any network call; the status is already set.
    Finished,
    /// Another send is still in flight; nothing was changed.
    Busy,
}

/// Receiving end of an in-flight send. Resolves exactly once.
#[derive(Debug)]
pub struct PendingSend {
    /// `None` once the result has been handed out.
    receiver: Option<oneshot::Receiver<SubmissionResult>>,
}

impl PendingSend {
    fn new(receiver: oneshot::Receiver<SubmissionResult>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }

    /// Non-blocking check for the result. Returns `Some` on the first poll
    /// that sees the outcome and `None` on every poll after that.
    pub fn poll(&mut self) -> Option<SubmissionResult> {
        let receiver = self.receiver.as_mut()?;
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(abandoned()),
        };
        self.receiver = None;
        Some(result)
    }

    /// Whether the result has already been taken by `poll`.
    pub fn is_resolved(&self) -> bool {
        self.receiver.is_none()
    }

    /// Wait for the result. A handle already drained by `poll` reads as
    /// abandoned.
    pub async fn wait(self) -> SubmissionResult {
        match self.receiver {
            Some(receiver) => receiver.await.unwrap_or_else(|_| Err(abandoned())),
            None => Err(abandoned()),
        }
    }
}

fn abandoned() -> SubmitError {
    SubmitError::Transport(TransportError::new("send task ended without a result"))
}

/// Sends the form to one fixed endpoint.
#[derive(Clone)]
pub struct Submitter {
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl Submitter {
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
        }
    }

    pub fn http(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, Arc::new(HttpTransport::new()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send the form and wait for the outcome. The form itself is not
    /// touched.
    pub async fn submit(&self, form: &FormState) -> SubmissionResult {
        let request = prepare(&self.endpoint, &form.snapshot())?;
        deliver(self.transport.as_ref(), request).await
    }

    /// Start a send in the background.
    ///
    /// The status moves to "sending" immediately. Validation, attachment
    /// reading and encoding happen here on the caller's thread; only the
    /// network call is spawned onto `runtime`.
    pub fn dispatch(&self, runtime: &Handle, form: &mut FormState) -> Dispatch {
        if form.is_sending() {
            log::debug!("Send requested while another send is in flight");
            return Dispatch::Busy;
        }

        form.set_status(SendPhase::Sending, SENDING_STATUS);

        let request = match prepare(&self.endpoint, &form.snapshot()) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Send aborted before posting: {}", e);
                apply_result(form, &Err(e));
                return Dispatch::Finished;
            }
        };

        let (sender, receiver) = oneshot::channel();
        let transport = Arc::clone(&self.transport);
        runtime.spawn(async move {
            let result = deliver(transport.as_ref(), request).await;
            if let Err(e) = &result {
                log::warn!("Send failed: {}", e);
            }
            if sender.send(result).is_err() {
                log::debug!("Send result dropped, receiver is gone");
            }
        });

        Dispatch::Started(PendingSend::new(receiver))
    }
}
