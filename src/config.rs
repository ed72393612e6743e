//! Client settings loaded from files and environment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    http_client::{HttpClientError, RequestClient, RequestClientBuilder, RequestClientConfig},
    logging::LoggingConfig,
};

/// Root container for client settings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ClientSettings {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Request client configuration.
    #[serde(default, alias = "client")]
    pub http_client: RequestClientConfig,
}

impl ClientSettings {
    /// Create builder for client settings.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Create request client builder from these settings.
    pub fn client_builder(&self) -> RequestClientBuilder {
        RequestClient::builder(self.http_client.clone())
    }

    /// Build request client with default collaborators.
    ///
    /// # Errors
    ///
    /// See [`RequestClientBuilder::build`].
    pub fn to_client(&self) -> Result<RequestClient, HttpClientError> {
        self.client_builder().build()
    }
}

/// Settings loading error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
    /// Configuration builder error
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Builder for client settings.
#[must_use]
pub struct SettingsBuilder {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsBuilder {
    /// Alternative method to construct a settings builder.
    pub fn new() -> Self {
        Self {
            builder: config::Config::builder(),
        }
    }

    /// Try to build settings object from preconfigured sources.
    ///
    /// This method will do all the I/O necessary to load the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if some configuration loading was unsuccessful.
    pub fn build(self) -> Result<ClientSettings, SettingsError> {
        self.builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Add a custom object implementing [`Source`] trait as a source of settings.
    ///
    /// [`Source`]: config::Source
    pub fn with_source<T>(mut self, source: T) -> Self
    where
        T: config::Source + Send + Sync + 'static,
    {
        self.builder = self.builder.add_source(source);
        self
    }

    /// Add file as a source of settings.
    pub fn with_file(self, name: impl AsRef<str>) -> Self {
        self.with_source(config::File::with_name(name.as_ref()))
    }

    /// Add environment variables as a source of settings.
    pub fn with_env(self, prefix: impl AsRef<str>) -> Self {
        self.with_source(
            config::Environment::with_prefix(prefix.as_ref())
                .separator("_")
                .prefix_separator("__"),
        )
    }
}
