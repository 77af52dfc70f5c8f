//! Route handlers: the single send endpoint and the pipeline behind it.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Response,
    routing::get,
    Router,
};
use lettre::Address;
use serde::Deserialize;
use tracing::{debug, info, info_span, Instrument};

use crate::config::Settings;
use crate::email::{dispatch, DispatchOutcome, EmailState, Outgoing};
use crate::gate::{authorize, resolve_recipient, resolve_text};
use crate::response::{respond, DENIED, SEND_FAILED, SENT};
use crate::sanitize::{sanitize_email, sanitize_text};

/// Everything a request handler needs, shared behind an `Arc`.
pub struct AppState {
    pub settings: Settings,
    pub email: EmailState,
}

/// Query parameters, already percent-decoded by the extractor.
#[derive(Default, Deserialize)]
pub struct RawRequest {
    pub subject: Option<String>,
    pub mailbody: Option<String>,
    pub mailadresse: Option<String>,
    pub secret: Option<String>,
}

/// Cleaned request fields; `None` means absent or rejected.
#[derive(Debug, Default)]
pub struct SanitizedFields {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub recipient: Option<Address>,
    pub secret: Option<String>,
}

impl SanitizedFields {
    pub fn from_raw(raw: &RawRequest) -> Self {
        Self {
            subject: sanitize_text(raw.subject.as_deref()),
            body: sanitize_text(raw.mailbody.as_deref()),
            recipient: sanitize_email(raw.mailadresse.as_deref()),
            secret: sanitize_text(raw.secret.as_deref()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(send_email).post(send_email))
        .route("/send", get(send_email).post(send_email))
        .with_state(state)
}

/// GET|POST `/` (and `/send`)
/// - Query: `subject`, `mailbody`, `mailadresse`, `secret`
/// - Always `200 OK`; the body says whether the mail went out.
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RawRequest>, QueryRejection>,
) -> Response {
    let raw = match query {
        Ok(Query(raw)) => raw,
        Err(e) => {
            info!("Unreadable query string ({e}), treating request as empty");
            RawRequest::default()
        }
    };
    let span = info_span!("request", id = %request_id());
    handle(&state, raw).instrument(span).await
}

async fn handle(state: &AppState, raw: RawRequest) -> Response {
    let settings = &state.settings;

    // 1) Sanitize
    let fields = SanitizedFields::from_raw(&raw);
    debug!(
        "Sanitized fields: subject={:?} body={:?} recipient={:?} secret_present={}",
        fields.subject,
        fields.body,
        fields.recipient.as_ref().map(ToString::to_string),
        fields.secret.is_some()
    );

    // 2) Auth
    if !authorize(fields.secret.as_deref(), &settings.secret) {
        info!("Unauthorized access attempt: invalid or missing secret word");
        return respond(DENIED, false, settings.use_json);
    }
    debug!("Secret word accepted");

    // 3) Resolve recipient, subject, body
    let requested = raw.mailadresse.is_some();
    let recipient = resolve_recipient(settings.allow_to_override, fields.recipient, &settings.default_to);
    if recipient.overridden {
        debug!("Recipient overridden by request: {}", recipient.address);
    } else if requested {
        debug!("Requested recipient ignored, using default {}", recipient.address);
    }
    let subject = resolve_text(fields.subject, &settings.default_subject);
    let body = resolve_text(fields.body, &settings.default_body);
    let msg = Outgoing::new(recipient.address, &subject, body);
    debug!("Dispatching: to={} subject={:?}", msg.to, msg.subject);

    // 4) Send
    let result = dispatch(&state.email, &msg).await;
    let outcome = DispatchOutcome::new(msg, result);

    // 5) Respond
    if outcome.success {
        info!("Email sent to {} with subject {:?}", outcome.recipient, outcome.subject);
        respond(SENT, true, settings.use_json)
    } else {
        info!(
            "Failed to send email to {}: {}",
            outcome.recipient,
            outcome.failure.as_deref().unwrap_or("unknown error")
        );
        respond(SEND_FAILED, false, settings.use_json)
    }
}

/// Generate a compact request id (22 chars, URL-safe).
fn request_id() -> String {
    use rand::{distr::Alphanumeric, rng, Rng};
    rng()
        .sample_iter(&Alphanumeric)
        .take(22)
        .map(char::from)
        .collect()
}
