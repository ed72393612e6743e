//! HTTP client - response interpretation.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::http_client::{
    envelope::{Envelope, Locale},
    errors::RequestError,
    hooks::{Navigator, NetworkStatus, Notifier},
};

/// Turns envelopes and transport failures into call results, with user-facing side effects.
#[derive(Clone)]
pub(crate) struct ResponseInterceptor {
    pub(crate) locale: Locale,
    pub(crate) login_path: String,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) network: Arc<dyn NetworkStatus>,
}

impl ResponseInterceptor {
    /// Show the message for a status code, or the generic message for unknown codes.
    pub(crate) fn warning(&self, code: &str) {
        self.notifier.warning(&self.locale.message(code));
    }

    /// Unwrap successful envelope, or report the failure.
    pub(crate) fn on_envelope(&self, envelope: Envelope) -> Result<Value, RequestError> {
        if envelope.is_success() {
            return Ok(envelope.into_data());
        }
        warn!(status = %envelope.status, "request rejected by server");
        self.warning(&envelope.status);
        if envelope.is_session_expired() {
            let location = format!(
                "{}?redirect={}",
                self.login_path,
                self.navigator.current_path()
            );
            debug!(%location, "session expired, redirecting");
            self.navigator.replace(&location);
        }
        Err(RequestError::Application(envelope))
    }

    /// Report a failure which happened before an envelope could be obtained.
    pub(crate) fn on_failure(&self, err: RequestError) -> RequestError {
        if !self.network.is_online() {
            self.warning(self.locale.offline_key());
        } else if err.is_cancelled() {
            debug!("superseded request dropped");
        } else {
            self.notifier.alert(&err.to_string());
        }
        err
    }
}
