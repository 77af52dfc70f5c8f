//! Email state + sending.
//! The transport is chosen at startup; everything else is per message.

use std::{fs, time::Duration};

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::{file::AsyncFileTransport, stub::AsyncStubTransport},
    Address, AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::{Settings, TransportMethod, TransportSettings};
use crate::sanitize::strip_header_breaks;

/// Transport selected at runtime (sendmail in prod, FILE/STUB for local dev).
pub enum Mailer {
    Sendmail(AsyncSendmailTransport<Tokio1Executor>),
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
    Stub(AsyncStubTransport),
}

impl Mailer {
    /// Unified `send` so callers don't care which transport we're using.
    /// We normalize errors to String to avoid mixing different transport error types.
    pub async fn send(&self, email: Message) -> Result<(), String> {
        match self {
            Mailer::Sendmail(m) => m.send(email).await.map(|_| ()).map_err(|e| e.to_string()),
            Mailer::Smtp(m) => m.send(email).await.map(|_| ()).map_err(|e| e.to_string()),
            Mailer::File(f) => f.send(email).await.map(|_| ()).map_err(|e| e.to_string()),
            Mailer::Stub(s) => s.send(email).await.map_err(|e| e.to_string()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Mailer::Sendmail(_) => "sendmail",
            Mailer::Smtp(_) => "smtp",
            Mailer::File(_) => "file",
            Mailer::Stub(_) => "stub",
        }
    }
}

/// Why a dispatch failed. Only ever logged; callers see a generic message.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("message build error: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transport did not answer within {0:?}")]
    Timeout(Duration),
}

/// App-wide email state (transport + sender identity + deadline).
pub struct EmailState {
    pub mailer: Mailer,
    pub from: Mailbox,
    pub timeout: Duration,
}

impl EmailState {
    /// Build the sender identity and the configured transport.
    pub fn from_settings(settings: &Settings) -> Result<Self, anyhow::Error> {
        let mailer = build_mailer(&settings.transport)?;
        tracing::debug!("Using {} transport", mailer.name());
        Ok(Self {
            mailer,
            from: sender(settings),
            timeout: settings.transport.timeout,
        })
    }
}

/// `FromName <FromEmail>`, or the bare address when no name is configured.
pub fn sender(settings: &Settings) -> Mailbox {
    let name = Some(settings.from_name.clone()).filter(|n| !n.is_empty());
    Mailbox::new(name, settings.from_email.clone())
}

fn build_mailer(transport: &TransportSettings) -> Result<Mailer, anyhow::Error> {
    Ok(match &transport.method {
        TransportMethod::Sendmail { command: Some(cmd) } => {
            Mailer::Sendmail(AsyncSendmailTransport::<Tokio1Executor>::new_with_command(cmd.as_str()))
        }
        TransportMethod::Sendmail { command: None } => {
            Mailer::Sendmail(AsyncSendmailTransport::<Tokio1Executor>::new())
        }
        TransportMethod::Smtp { host, port, username, password } => {
            build_smtp_mailer(host, *port, username, password.expose(), transport.timeout)?
        }
        TransportMethod::File { outbox_dir } => {
            fs::create_dir_all(outbox_dir)?;
            Mailer::File(AsyncFileTransport::new(outbox_dir))
        }
        TransportMethod::Stub => Mailer::Stub(AsyncStubTransport::new_ok()),
    })
}

/// Build a STARTTLS SMTP transport with creds.
fn build_smtp_mailer(
    host: &str,
    port: u16,
    user: &str,
    pass: &str,
    timeout: Duration,
) -> Result<Mailer, anyhow::Error> {
    use lettre::transport::smtp::authentication::Credentials;

    let creds = Credentials::new(user.to_string(), pass.to_string());
    Ok(Mailer::Smtp(
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .credentials(creds)
            .timeout(Some(timeout))
            .build(),
    ))
}

/// A fully resolved message, ready for the transport.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub to: Address,
    pub subject: String,
    pub body: String,
}

impl Outgoing {
    /// The subject loses any CR/LF here, right before hand-off.
    pub fn new(to: Address, subject: &str, body: String) -> Self {
        Self {
            to,
            subject: strip_header_breaks(subject),
            body,
        }
    }
}

/// Result of one delivery attempt, as recorded in the log.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    pub recipient: Address,
    pub subject: String,
    pub body: String,
    pub failure: Option<String>,
}

impl DispatchOutcome {
    pub fn new(msg: Outgoing, result: Result<(), EmailError>) -> Self {
        let failure = result.err().map(|e| e.to_string());
        Self {
            success: failure.is_none(),
            recipient: msg.to,
            subject: msg.subject,
            body: msg.body,
            failure,
        }
    }
}

/// Build a plain-text message and hand it to the transport, bounded by the
/// configured timeout.
pub async fn dispatch(state: &EmailState, msg: &Outgoing) -> Result<(), EmailError> {
    let email = Message::builder()
        .from(state.from.clone())
        .to(Mailbox::new(None, msg.to.clone()))
        .subject(msg.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(msg.body.clone())
        .map_err(|e| EmailError::Build(e.to_string()))?;

    match tokio::time::timeout(state.timeout, state.mailer.send(email)).await {
        Ok(sent) => sent.map_err(EmailError::Transport),
        Err(_) => Err(EmailError::Timeout(state.timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(stub: AsyncStubTransport) -> EmailState {
        EmailState {
            mailer: Mailer::Stub(stub),
            from: "Mailer <noreply@example.com>".parse().unwrap(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn dispatch_hands_message_to_transport() {
        let stub = AsyncStubTransport::new_ok();
        let st = state(stub.clone());
        let msg = Outgoing::new("x@y.com".parse().unwrap(), "Test", "Hello".into());

        dispatch(&st, &msg).await.unwrap();

        let sent = stub.messages().await;
        assert_eq!(sent.len(), 1);
        let (envelope, raw) = &sent[0];
        assert_eq!(envelope.to(), ["x@y.com".parse::<Address>().unwrap()]);
        assert!(raw.contains("Subject: Test"));
        assert!(raw.contains("From: Mailer <noreply@example.com>"));
        assert!(raw.contains("Hello"));
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let st = state(AsyncStubTransport::new_error());
        let msg = Outgoing::new("x@y.com".parse().unwrap(), "Test", "Hello".into());
        let err = dispatch(&st, &msg).await.unwrap_err();
        assert!(matches!(err, EmailError::Transport(_)));

        let outcome = DispatchOutcome::new(msg, Err(err));
        assert!(!outcome.success);
        assert!(outcome.failure.is_some());
    }

    #[test]
    fn subject_loses_line_breaks() {
        let msg = Outgoing::new("x@y.com".parse().unwrap(), "Hi\r\nBcc: evil@example.com", String::new());
        assert_eq!(msg.subject, "HiBcc: evil@example.com");
    }
}
