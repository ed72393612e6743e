//! HTTP client - configuration.

use std::{collections::BTreeMap, str::FromStr, time::Duration};

use reqwest::{
    header::{HeaderName, HeaderValue},
    ClientBuilder,
};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http_client::{envelope::Locale, errors::HttpClientError, middleware::wrap_client};

/// Request client configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct RequestClientConfig {
    /// Prefix for all relative request URLs.
    ///
    /// Default is `http://localhost/dev`.
    #[serde(default = "RequestClientConfig::default_base_url", alias = "base")]
    pub base_url: String,
    /// Total request deadline.
    ///
    /// The timeout is applied from when the request starts connecting until the response body has
    /// finished.
    ///
    /// Default is 60 seconds.
    #[serde(
        default = "RequestClientConfig::default_timeout",
        alias = "request_timeout",
        with = "humantime_serde"
    )]
    pub timeout: Duration,
    /// Set a timeout for only the connect phase of a client.
    ///
    /// Default is `None`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub connect_timeout: Option<Duration>,
    /// Keep cookies received from the server and send them with subsequent requests.
    ///
    /// Default is `false`.
    #[serde(default, alias = "credentials")]
    pub with_credentials: bool,
    /// Language of messages shown to the user.
    #[serde(default)]
    pub locale: Locale,
    /// Route to navigate to when the session has expired.
    ///
    /// Default is `/login`.
    #[serde(default = "RequestClientConfig::default_login_path")]
    pub login_path: String,
    /// Sets the default headers for every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", alias = "headers")]
    pub extra_headers: BTreeMap<String, String>,
    /// Set an optional timeout for idle sockets being kept-alive.
    ///
    /// Set to `None` to disable timeout.
    ///
    /// Default is 90 seconds.
    #[serde(
        default = "RequestClientConfig::default_pool_idle_timeout",
        skip_serializing_if = "Option::is_none",
        alias = "idle_timeout",
        with = "humantime_serde"
    )]
    pub pool_idle_timeout: Option<Duration>,
    /// Sets the maximum idle connection per host allowed in the pool.
    #[serde(default = "RequestClientConfig::default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    /// Set a redirect policy for this client.
    ///
    /// Default will follow redirects up to a maximum of 10.
    #[serde(default)]
    pub redirect: RedirectPolicy,
    /// Set whether connections should emit verbose logs.
    #[serde(default)]
    pub verbose: bool,
    /// Short application name.
    #[serde(skip)]
    app_name: Option<String>,
    /// Application version.
    #[serde(skip)]
    app_version: Option<String>,
}

impl Default for RequestClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout: Self::default_timeout(),
            connect_timeout: None,
            with_credentials: false,
            locale: Locale::default(),
            login_path: Self::default_login_path(),
            extra_headers: BTreeMap::new(),
            pool_idle_timeout: Self::default_pool_idle_timeout(),
            pool_max_idle_per_host: Self::default_pool_max_idle_per_host(),
            redirect: RedirectPolicy::default(),
            verbose: false,
            app_name: None,
            app_version: None,
        }
    }
}

impl RequestClientConfig {
    /// Default value for [`Self::base_url`].
    #[must_use]
    #[inline]
    fn default_base_url() -> String {
        "http://localhost/dev".into()
    }

    /// Default value for [`Self::timeout`].
    #[must_use]
    #[inline]
    fn default_timeout() -> Duration {
        Duration::from_secs(60)
    }

    /// Default value for [`Self::login_path`].
    #[must_use]
    #[inline]
    fn default_login_path() -> String {
        "/login".into()
    }

    /// Default value for [`Self::pool_idle_timeout`].
    #[must_use]
    #[inline]
    fn default_pool_idle_timeout() -> Option<Duration> {
        Some(Duration::from_secs(90))
    }

    /// Default value for [`Self::pool_max_idle_per_host`].
    #[must_use]
    #[inline]
    fn default_pool_max_idle_per_host() -> usize {
        usize::MAX
    }

    /// Set base URL.
    pub fn with_base_url(&mut self, base_url: impl ToString) -> &mut Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Set message locale.
    pub fn with_locale(&mut self, locale: Locale) -> &mut Self {
        self.locale = locale;
        self
    }

    /// Set total request deadline.
    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Set short name of an application.
    ///
    /// Whitespace is not allowed, as this value is used in User-Agent: HTTP header.
    pub fn with_app_name(&mut self, app_name: impl ToString) -> &mut Self {
        self.app_name = Some(app_name.to_string());
        self
    }

    /// Set application version.
    ///
    /// Preferably in semver format. Whitespace is not allowed, as this value is used in
    /// User-Agent: HTTP header.
    pub fn with_app_version(&mut self, app_version: impl ToString) -> &mut Self {
        self.app_version = Some(app_version.to_string());
        self
    }

    /// Build a value for `User-Agent` header.
    #[must_use]
    fn user_agent(&self) -> Option<HeaderValue> {
        const LIB_PRODUCT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        let val = match (&self.app_name, &self.app_version) {
            (Some(name), Some(version)) => format!("{name}/{version} {LIB_PRODUCT}"),
            (Some(name), None) => format!("{name} {LIB_PRODUCT}"),
            _ => LIB_PRODUCT.to_owned(),
        };
        HeaderValue::from_str(&val).ok()
    }

    /// Parse and validate [`Self::base_url`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if base URL is not an absolute URL.
    pub fn parsed_base_url(&self) -> Result<Url, HttpClientError> {
        Url::parse(&self.base_url).map_err(HttpClientError::InvalidBaseUrl)
    }

    /// Create [`reqwest::ClientBuilder`] from configuration.
    #[must_use]
    pub fn to_client_builder(&self) -> ClientBuilder {
        let mut builder = ClientBuilder::new()
            .use_rustls_tls()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .connection_verbose(self.verbose)
            .timeout(self.timeout)
            .cookie_store(self.with_credentials)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .redirect(self.redirect.into());
        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if !self.extra_headers.is_empty() {
            builder = builder.default_headers(
                self.extra_headers
                    .iter()
                    .filter_map(|(k, v)| {
                        Some((
                            HeaderName::from_str(k).ok()?,
                            HeaderValue::from_str(v).ok()?,
                        ))
                    })
                    .collect(),
            );
        }
        if let Some(user_agent) = self.user_agent() {
            builder = builder.user_agent(user_agent);
        }
        builder
    }

    /// Convert passed client builder into client with all necessary middlewares attached.
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    /// * TLS subsystem cannot be initialized.
    /// * DNS resolver fails to load its configuration.
    pub(crate) fn build_client(
        &self,
        builder: ClientBuilder,
    ) -> Result<ClientWithMiddleware, HttpClientError> {
        Ok(wrap_client(builder.build()?))
    }
}

/// HTTP redirect policy.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RedirectPolicy {
    /// No redirects will be followed.
    None,
    /// Redirects will be followed up to a preconfigured limit.
    Limited {
        /// Max number of redirects to follow.
        #[serde(default = "RedirectPolicy::default_redirect_limit")]
        redirect_limit: usize,
    },
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::Limited {
            redirect_limit: Self::default_redirect_limit(),
        }
    }
}

impl From<RedirectPolicy> for reqwest::redirect::Policy {
    fn from(value: RedirectPolicy) -> Self {
        match value {
            RedirectPolicy::None => Self::none(),
            RedirectPolicy::Limited { redirect_limit } => Self::limited(redirect_limit),
        }
    }
}

impl RedirectPolicy {
    /// Default value for [`Self::Limited::redirect_limit`].
    #[must_use]
    #[inline]
    fn default_redirect_limit() -> usize {
        10
    }
}
