//! Request builder configuration.
//!
//! [`ProbeConfig`] controls how the ephemeral listener is bound and which
//! headers every request starts with. It can be built fluently or loaded from
//! a TOML snippet.
//!
//! # Example
//!
//! ```rust
//! use httpcheck::ProbeConfig;
//!
//! let config = ProbeConfig::builder()
//!     .default_header("Accept", "application/json")
//!     .build();
//!
//! assert_eq!(config.bind_addr, "127.0.0.1:0");
//! assert_eq!(config.default_headers["Accept"], "application/json");
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CheckResult;

/// Default bind address: loopback, kernel-assigned port.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:0";

/// Configuration shared by every request a builder issues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    /// Address the ephemeral listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Headers applied to every request before the builder's own headers.
    ///
    /// POST, PUT and PATCH requests always set their own `Content-Type`
    /// (JSON or form) after these, so a `Content-Type` here only reaches
    /// read methods. Use [`RequestBuilder::header`] to override it on a
    /// write.
    ///
    /// [`RequestBuilder::header`]: crate::RequestBuilder::header
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,

    /// User-Agent sent by the HTTP client. `None` sends no User-Agent.
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            default_headers: BTreeMap::new(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_user_agent() -> Option<String> {
    Some(concat!("httpcheck/", env!("CARGO_PKG_VERSION")).to_string())
}

impl ProbeConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::default()
    }

    /// Parses a configuration from TOML. Missing fields take their defaults.
    ///
    /// # Example
    ///
    /// ```rust
    /// use httpcheck::ProbeConfig;
    ///
    /// let config = ProbeConfig::from_toml_str(r#"
    ///     bind_addr = "127.0.0.1:0"
    ///
    ///     [default_headers]
    ///     X-Tenant = "acme"
    /// "#).unwrap();
    ///
    /// assert_eq!(config.default_headers["X-Tenant"], "acme");
    /// ```
    pub fn from_toml_str(content: &str) -> CheckResult<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Builder for [`ProbeConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProbeConfigBuilder {
    config: ProbeConfig,
}

impl ProbeConfigBuilder {
    /// Sets the listener bind address.
    #[must_use]
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .insert(name.into(), value.into());
        self
    }

    /// Sets or clears the User-Agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.config.user_agent = user_agent;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ProbeConfig {
        self.config
    }
}
