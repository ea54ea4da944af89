//! Per-exchange options and their serde-friendly configuration form.
//!
//! # Design
//! [`RequestOptions`] is what the engine consumes: validated headers and
//! typed durations. [`ClientConfig`] is the shape read from configuration
//! files; converting it validates every header up front so a bad config
//! fails at load time instead of on the first request.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{header, DEFAULT_USER_AGENT};
use crate::error::Error;
use crate::headers::Headers;

/// Options applied to a single exchange.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Deadline for the whole exchange, from resolution to the last body
    /// byte. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Added to the request for every name it does not already carry.
    pub headers: Headers,
    /// Cap on the decoded response body.
    pub max_body_bytes: Option<usize>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        let mut headers = Headers::new();
        headers.push_trusted(header::USER_AGENT, DEFAULT_USER_AGENT);
        RequestOptions {
            timeout: None,
            headers,
            max_body_bytes: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a default header, replacing any earlier default of that name.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        self.headers.set(name, value)?;
        Ok(self)
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }
}

/// Client settings as they appear in a configuration file.
///
/// ```toml
/// timeout_ms = 5000
/// user_agent = "probe/1.0"
/// max_body_bytes = 1048576
///
/// [headers]
/// Accept = "application/json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub max_body_bytes: Option<usize>,
}

impl ClientConfig {
    /// Validate and convert into [`RequestOptions`]. An explicit
    /// `User-Agent` entry in `headers` wins over `user_agent`.
    pub fn into_options(self) -> Result<RequestOptions, Error> {
        let mut options = RequestOptions::default();
        if let Some(ms) = self.timeout_ms {
            options.timeout = Some(Duration::from_millis(ms));
        }
        if let Some(agent) = &self.user_agent {
            options.headers.set(header::USER_AGENT, agent)?;
        }
        for (name, value) in &self.headers {
            options.headers.set(name, value)?;
        }
        options.max_body_bytes = self.max_body_bytes;
        Ok(options)
    }
}

impl TryFrom<ClientConfig> for RequestOptions {
    type Error = Error;

    fn try_from(config: ClientConfig) -> Result<Self, Error> {
        config.into_options()
    }
}
