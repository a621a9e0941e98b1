//! Broker settings loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::consumer::ConsumerOptions;
use crate::publisher::ConnectionMode;
use crate::topology::{TopicSpec, EVENTS_TOPIC};

pub const DEFAULT_BROKER_URL: &str = "memory://xyz";

/// Error loading settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings shared by publishers and consumers.
///
/// | Variable                | Default        |
/// |-------------------------|----------------|
/// | `BROKER_URL`            | `memory://xyz` |
/// | `EVENTS_TOPIC`          | `xyz.events`   |
/// | `CONSUMER_QUEUE`        | unset          |
/// | `POLL_INTERVAL_MS`      | `1000`         |
/// | `RECONNECT_DELAY_MS`    | `1000`         |
/// | `SHUTDOWN_TIMEOUT_SECS` | `30`           |
/// | `PUBLISHER_CONNECTION`  | `pooled`       |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub url: String,
    pub topic: String,
    /// Queue a consumer process reads from, e.g. `inventory-queue`.
    pub queue: Option<String>,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub shutdown_timeout: Duration,
    pub connection_mode: ConnectionMode,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        let consumer = ConsumerOptions::default();
        Self {
            url: DEFAULT_BROKER_URL.to_string(),
            topic: EVENTS_TOPIC.to_string(),
            queue: None,
            poll_interval: consumer.poll_interval,
            reconnect_delay: consumer.reconnect_delay,
            shutdown_timeout: consumer.shutdown_timeout,
            connection_mode: ConnectionMode::default(),
        }
    }
}

impl BrokerSettings {
    /// Load settings from the process environment, after reading `.env` if
    /// one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Load settings through `lookup`, falling back to defaults for
    /// missing or empty keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            url: get("BROKER_URL").unwrap_or(defaults.url),
            topic: get("EVENTS_TOPIC").unwrap_or(defaults.topic),
            queue: get("CONSUMER_QUEUE"),
            poll_interval: match get("POLL_INTERVAL_MS") {
                Some(v) => Duration::from_millis(parse_nonzero("POLL_INTERVAL_MS", &v)?),
                None => defaults.poll_interval,
            },
            reconnect_delay: match get("RECONNECT_DELAY_MS") {
                Some(v) => Duration::from_millis(parse("RECONNECT_DELAY_MS", &v)?),
                None => defaults.reconnect_delay,
            },
            shutdown_timeout: match get("SHUTDOWN_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse("SHUTDOWN_TIMEOUT_SECS", &v)?),
                None => defaults.shutdown_timeout,
            },
            connection_mode: match get("PUBLISHER_CONNECTION") {
                Some(v) => parse_mode(&v)?,
                None => defaults.connection_mode,
            },
        })
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            poll_interval: self.poll_interval,
            reconnect_delay: self.reconnect_delay,
            shutdown_timeout: self.shutdown_timeout,
        }
    }

    /// Durable declaration of the configured topic.
    pub fn topic_spec(&self) -> TopicSpec {
        TopicSpec::new(self.topic.clone())
    }

    /// The configured consumer queue, or `fallback` when none is set.
    pub fn queue_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.queue.as_deref().unwrap_or(fallback)
    }

    /// The broker URL with any password masked, safe to log.
    pub fn redacted_url(&self) -> String {
        redact(&self.url)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// An empty queue would otherwise be polled in a tight loop.
fn parse_nonzero(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match parse(key, value)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

fn parse_mode(value: &str) -> Result<ConnectionMode, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "pooled" => Ok(ConnectionMode::Pooled),
        "per-call" | "per_call" => Ok(ConnectionMode::PerCall),
        _ => Err(ConfigError::Invalid {
            key: "PUBLISHER_CONNECTION",
            value: value.to_string(),
            reason: "expected pooled or per-call".to_string(),
        }),
    }
}

fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);
    let Some((userinfo, host)) = authority.rsplit_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}{}", scheme, user, host, path),
        None => url.to_string(),
    }
}
