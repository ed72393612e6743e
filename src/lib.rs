#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
// #![warn(clippy::pedantic)]
// #![warn(missing_docs)]
// #![allow(clippy::module_name_repetitions)]

mod config;
mod http_client;
mod logging;

pub use self::{
    config::{ClientSettings, SettingsBuilder, SettingsError},
    http_client::*,
    logging::{
        LogRotation, LoggingConfig, LoggingDestination, LoggingError, LoggingFormat,
        LoggingGuard, LoggingLevel, LoggingSubscriberConfig,
    },
};
