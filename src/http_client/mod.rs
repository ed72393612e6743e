//! Envelope-aware HTTP client.
//!
//! Uses [`reqwest`] internally, wrapped in a [`reqwest_middleware`] tracing stack. Superseded
//! in-flight requests are cancelled until their response body has been fully read.

mod config;
mod envelope;
mod errors;
mod hooks;
mod interceptor;
mod middleware;
mod pending;
mod upload;

use std::{fmt, sync::Arc};

use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Method,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use self::interceptor::ResponseInterceptor;
pub use self::{
    config::{RedirectPolicy, RequestClientConfig},
    envelope::{
        lookup, CodeEntry, Envelope, Locale, ERROR_CODES, SESSION_EXPIRED_CODE, SUCCESS_CODE,
    },
    errors::{HttpClientError, RequestError, CANCEL_MARKER},
    hooks::{
        AlwaysOnline, LogNotifier, MemoryNavigator, Navigator, NetworkStatus, Notifier, OnlineFlag,
    },
    pending::{PendingKey, PendingRequests},
    upload::{ProgressCallback, UploadForm},
};

/// Body of an outgoing request.
#[derive(Debug, Default)]
#[non_exhaustive]
pub enum RequestData {
    /// No body.
    #[default]
    None,
    /// JSON body.
    Json(Value),
    /// URL-encoded form body.
    Form(Value),
    /// Multipart form body.
    Multipart(UploadForm),
}

/// Options of a single request.
#[must_use]
pub struct RequestConfig {
    /// Request URL, relative to base URL unless absolute.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Query string parameters.
    pub params: Option<Value>,
    /// Request body.
    pub data: RequestData,
    /// Additional request headers.
    pub headers: HeaderMap,
    /// Upload progress callback.
    pub on_upload_progress: Option<ProgressCallback>,
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("data", &self.data)
            .field("headers", &self.headers)
            .field("on_upload_progress", &self.on_upload_progress.is_some())
            .finish()
    }
}

impl RequestConfig {
    /// Create request options with URL and method.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            params: None,
            data: RequestData::None,
            headers: HeaderMap::new(),
            on_upload_progress: None,
        }
    }

    /// Set query string parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Set request body.
    pub fn with_data(mut self, data: RequestData) -> Self {
        self.data = data;
        self
    }

    /// Add request header.
    pub fn with_header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set upload progress callback.
    pub fn with_upload_progress(mut self, cb: ProgressCallback) -> Self {
        self.on_upload_progress = Some(cb);
        self
    }

    /// Identity used to detect superseded requests.
    #[must_use]
    pub fn pending_key(&self) -> PendingKey {
        PendingKey::new(&self.url, &self.method)
    }
}

/// Builder for [`RequestClient`].
#[must_use]
pub struct RequestClientBuilder {
    config: RequestClientConfig,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    network: Arc<dyn NetworkStatus>,
}

impl RequestClientBuilder {
    /// Create builder with default collaborators.
    pub fn new(config: RequestClientConfig) -> Self {
        Self {
            config,
            notifier: Arc::new(LogNotifier),
            navigator: Arc::new(MemoryNavigator::default()),
            network: Arc::new(AlwaysOnline),
        }
    }

    /// Set user notification back-end.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set router.
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Set network connectivity source.
    pub fn with_network_status(mut self, network: Arc<dyn NetworkStatus>) -> Self {
        self.network = network;
        self
    }

    /// Build client.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    /// * Base URL is invalid.
    /// * TLS subsystem cannot be initialized.
    /// * DNS resolver fails to load its configuration.
    pub fn build(self) -> Result<RequestClient, HttpClientError> {
        let base_url = self.config.parsed_base_url()?;
        let http = self.config.build_client(self.config.to_client_builder())?;
        Ok(RequestClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                pending: PendingRequests::new(),
                interceptor: ResponseInterceptor {
                    locale: self.config.locale,
                    login_path: self.config.login_path,
                    notifier: self.notifier,
                    navigator: self.navigator,
                    network: self.network,
                },
            }),
        })
    }
}

struct ClientInner {
    http: reqwest_middleware::ClientWithMiddleware,
    base_url: Url,
    pending: PendingRequests,
    interceptor: ResponseInterceptor,
}

/// HTTP client which unwraps response envelopes and cancels superseded requests.
///
/// Cheap to clone, all clones share the same list of pending requests.
#[derive(Clone)]
pub struct RequestClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

impl RequestClient {
    /// Create builder for request client.
    pub fn builder(config: RequestClientConfig) -> RequestClientBuilder {
        RequestClientBuilder::new(config)
    }

    /// Requests currently in flight.
    #[must_use]
    pub fn pending(&self) -> &PendingRequests {
        &self.inner.pending
    }

    /// Resolve request URL against base URL.
    ///
    /// # Errors
    ///
    /// Returns `Err` if resulting URL is not valid.
    pub fn resolve_url(&self, url: &str) -> Result<Url, url::ParseError> {
        if url.starts_with("//") {
            return self.inner.base_url.join(url);
        }
        if is_absolute_url(url) {
            return Url::parse(url);
        }
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let rel = url.trim_start_matches('/');
        if rel.is_empty() {
            Url::parse(base)
        } else {
            Url::parse(&format!("{base}/{rel}"))
        }
    }

    /// Send request and unwrap response envelope.
    ///
    /// Any request in flight with the same URL and method is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    /// * Server responded with a non-success status code in envelope.
    /// * Request was superseded by a newer request (see [`RequestError::is_cancelled`]).
    /// * Request failed on transport level.
    pub async fn send(&self, config: RequestConfig) -> Result<Value, RequestError> {
        let icpt = &self.inner.interceptor;
        match self.dispatch(config).await {
            Ok(envelope) => icpt.on_envelope(envelope),
            Err(err) => Err(icpt.on_failure(err)),
        }
    }

    /// Register request as pending, then race the whole exchange against supersession.
    ///
    /// The record lives until the envelope is decoded, or until this future is dropped.
    async fn dispatch(&self, config: RequestConfig) -> Result<Envelope, RequestError> {
        let key = config.pending_key();
        let ticket = self.inner.pending.supersede(&key);
        tokio::select! {
            biased;
            () = ticket.token().cancelled() => {
                trace!(key = key.as_str(), "request cancelled");
                Err(RequestError::Cancelled)
            }
            res = self.exchange(config, key.clone()) => res,
        }
    }

    async fn exchange(
        &self,
        config: RequestConfig,
        key: PendingKey,
    ) -> Result<Envelope, RequestError> {
        let url = self.resolve_url(&config.url)?;
        debug!(key = key.as_str(), %url, "sending request");
        let mut req = self
            .inner
            .http
            .request(config.method, url)
            .headers(config.headers)
            .with_extension(key);
        if let Some(params) = config.params.as_ref().filter(|p| !p.is_null()) {
            req = req.query(params);
        }
        req = match config.data {
            RequestData::None => req,
            RequestData::Json(body) => req.json(&body),
            RequestData::Form(body) => req.form(&body),
            RequestData::Multipart(form) => req.multipart(
                form.into_multipart(config.on_upload_progress)
                    .map_err(|err| RequestError::Transport(err.into()))?,
            ),
        };
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RequestError::Status(status));
        }
        resp.json::<Envelope>().await.map_err(RequestError::Decode)
    }

    /// Send `GET` request with query string parameters.
    ///
    /// # Errors
    ///
    /// See [`Self::send`]. Also returns `Err` if parameters cannot be serialized.
    pub async fn get(&self, url: &str, params: impl Serialize) -> Result<Value, RequestError> {
        let config =
            RequestConfig::new(Method::GET, url).with_params(serde_json::to_value(params)?);
        self.send(config).await
    }

    /// Send `POST` request with URL-encoded form body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`]. Also returns `Err` if parameters cannot be serialized.
    pub async fn post_form(
        &self,
        url: &str,
        params: impl Serialize,
    ) -> Result<Value, RequestError> {
        let config = RequestConfig::new(Method::POST, url)
            .with_data(RequestData::Form(serde_json::to_value(params)?))
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
        self.send(config).await
    }

    /// Send `POST` request with JSON body.
    ///
    /// # Errors
    ///
    /// See [`Self::send`]. Also returns `Err` if parameters cannot be serialized.
    pub async fn post_json(
        &self,
        url: &str,
        params: impl Serialize,
    ) -> Result<Value, RequestError> {
        let config = RequestConfig::new(Method::POST, url)
            .with_data(RequestData::Json(serde_json::to_value(params)?));
        self.send(config).await
    }

    /// Send `POST` request with multipart body.
    ///
    /// `on_progress` receives cumulative sent and total bytes, and is only called when the total
    /// size of the form is known.
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn upload_file(
        &self,
        url: &str,
        form: UploadForm,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Value, RequestError> {
        let mut config =
            RequestConfig::new(Method::POST, url).with_data(RequestData::Multipart(form));
        config.on_upload_progress = on_progress;
        self.send(config).await
    }
}

/// Whether URL has a scheme (`scheme://`).
fn is_absolute_url(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> RequestClient {
        let mut cfg = RequestClientConfig::default();
        cfg.with_base_url(base_url);
        RequestClient::builder(cfg).build().unwrap()
    }

    /// Relative URLs are joined with a single slash.
    #[test]
    fn resolve_relative() {
        let client = client("http://localhost/dev/");
        assert_eq!(
            client.resolve_url("/users").unwrap().as_str(),
            "http://localhost/dev/users"
        );
        assert_eq!(
            client.resolve_url("users").unwrap().as_str(),
            "http://localhost/dev/users"
        );
        assert_eq!(
            client.resolve_url("").unwrap().as_str(),
            "http://localhost/dev"
        );
    }

    /// Absolute URLs bypass base URL.
    #[test]
    fn resolve_absolute() {
        let client = client("http://localhost/dev");
        assert_eq!(
            client.resolve_url("https://cdn.example.com/a").unwrap().as_str(),
            "https://cdn.example.com/a"
        );
        assert!(!is_absolute_url("/a?next=http://x"));
    }

    /// Protocol-relative URLs take the scheme of base URL.
    #[test]
    fn resolve_protocol_relative() {
        let client = client("https://shop.example.com/dev");
        assert_eq!(
            client.resolve_url("//cdn.example.com/a").unwrap().as_str(),
            "https://cdn.example.com/a"
        );
    }

    /// Pending key is built from caller URL, not resolved URL.
    #[test]
    fn config_pending_key() {
        let cfg =
            RequestConfig::new(Method::GET, "/users").with_params(serde_json::json!({ "id": 1 }));
        assert_eq!(cfg.pending_key().as_str(), "/users&get");
    }

    /// Builder rejects relative base URL.
    #[test]
    fn builder_invalid_base() {
        let mut cfg = RequestClientConfig::default();
        cfg.with_base_url("/dev");
        assert!(matches!(
            RequestClient::builder(cfg).build(),
            Err(HttpClientError::InvalidBaseUrl(_))
        ));
    }
}
