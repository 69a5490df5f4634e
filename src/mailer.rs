use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// OutgoingMail
///
/// One message handed to the mail collaborator: `send(subject, body, from, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailError {
    /// The relay could not be reached (connect/timeout/TLS).
    #[error("mail relay unreachable: {0}")]
    Transport(String),

    /// The relay answered with a non-success status.
    #[error("mail relay rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

// 1. Mailer Contract
/// Mailer
///
/// The external mail collaborator. Failures are always returned to the caller;
/// implementations must never swallow them and must not retry on their own.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

// 2. The Real Implementation (HTTP mail relay)
/// HttpMailer
///
/// Delivers through an HTTP mail relay: `POST {endpoint}` with a bearer key and
/// the `OutgoingMail` as JSON. Any non-2xx answer is a `MailError::Rejected`.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&mail)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = ?mail.to, subject = %mail.subject, "mail handed to relay");
        Ok(())
    }
}

// 3. Local development
/// LogMailer
///
/// Writes the message to the log instead of sending it. Used in `Env::Local`
/// when no relay is configured, so the confirmation code can be read from the
/// console.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::info!(
            from = %mail.from,
            to = ?mail.to,
            subject = %mail.subject,
            body = %mail.body,
            "mail (log only)"
        );
        Ok(())
    }
}

// 4. The Mock Implementation (For Tests)
/// MockMailer
///
/// Records every message it is asked to send. With `should_fail` set, every
/// send returns a simulated relay rejection.
#[derive(Clone, Default)]
pub struct MockMailer {
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Messages accepted so far, oldest first.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Body of the most recent message to `address`.
    pub fn last_body_for(&self, address: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|mail| mail.to.iter().any(|to| to == address))
            .map(|mail| mail.body)
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Rejected {
                status: 503,
                body: "Mock Mail Error: Simulation requested".to_string(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(mail);
        }
        Ok(())
    }
}

/// MailerState
///
/// The shared handle stored in `AppState`.
pub type MailerState = Arc<dyn Mailer>;
