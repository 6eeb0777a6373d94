//! Server configuration.
//!
//! All configuration is loaded from environment variables, each with a
//! default:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `YACV_HOST` | `localhost` | Bind host |
//! | `YACV_PORT` | `32323` | Bind port (`0` picks a free one) |
//! | `YACV_GRACEFUL_SECS_CONNECT` | `12` | Stop: wait for a first client (seconds) |
//! | `YACV_GRACEFUL_SECS_REQUEST` | `5` | Stop: wait for requests to drain (seconds) |
//! | `YACV_SHUTDOWN_TIMEOUT_SECS` | `30` | Stop: hard ceiling on the final join (seconds) |

use std::time::Duration;

/// Default bind host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default bind port.
pub const DEFAULT_PORT: u16 = 32323;
/// Default first-client grace window.
pub const DEFAULT_GRACE_CONNECT: Duration = Duration::from_secs(12);
/// Default request-drain grace window.
pub const DEFAULT_GRACE_REQUEST: Duration = Duration::from_secs(5);
/// Default ceiling on joining the serve loop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set to an unusable value.
    #[error("invalid {var}: {message}")]
    Invalid {
        /// The environment variable name.
        var: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host name or address to bind to.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// How long `stop` waits for at least one client to have connected.
    pub grace_connect: Duration,
    /// How long `stop` waits for in-flight requests to finish, restarted by
    /// every new request.
    pub grace_request: Duration,
    /// How long `stop` waits for the serve loop to exit once told to.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            grace_connect: DEFAULT_GRACE_CONNECT,
            grace_request: DEFAULT_GRACE_REQUEST,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = lookup("YACV_HOST")
            .map(|host| host.trim().to_owned())
            .filter(|host| !host.is_empty())
            .unwrap_or(defaults.host);

        let port = match lookup("YACV_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "YACV_PORT",
                message: format!("{e}"),
            })?,
            None => defaults.port,
        };

        let grace_connect = secs_var(&lookup, "YACV_GRACEFUL_SECS_CONNECT")?
            .unwrap_or(defaults.grace_connect);
        let grace_request = secs_var(&lookup, "YACV_GRACEFUL_SECS_REQUEST")?
            .unwrap_or(defaults.grace_request);
        let shutdown_timeout = secs_var(&lookup, "YACV_SHUTDOWN_TIMEOUT_SECS")?
            .unwrap_or(defaults.shutdown_timeout);

        Ok(Self {
            host,
            port,
            grace_connect,
            grace_request,
            shutdown_timeout,
        })
    }

    /// Return a copy listening on `port`.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Return a copy with both stop grace windows replaced.
    #[must_use]
    pub const fn with_grace(mut self, connect: Duration, request: Duration) -> Self {
        self.grace_connect = connect;
        self.grace_request = request;
        self
    }

    /// `host:port`, as accepted by [`tokio::net::TcpListener::bind`].
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a (possibly fractional) number of seconds.
fn secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let secs: f64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
        var,
        message: format!("{e}"),
    })?;
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            var,
            message: format!("{e}"),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_address(), "localhost:32323");
        assert_eq!(config.grace_connect, Duration::from_secs(12));
        assert_eq!(config.grace_request, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("YACV_HOST", "0.0.0.0"),
            ("YACV_PORT", "8080"),
            ("YACV_GRACEFUL_SECS_CONNECT", "0.5"),
            ("YACV_GRACEFUL_SECS_REQUEST", " 2 "),
            ("YACV_SHUTDOWN_TIMEOUT_SECS", "1"),
        ])
        .unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.grace_connect, Duration::from_millis(500));
        assert_eq!(config.grace_request, Duration::from_secs(2));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = load(&[("YACV_PORT", "70000")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "YACV_PORT", .. }));

        let err = load(&[("YACV_GRACEFUL_SECS_CONNECT", "-1")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "YACV_GRACEFUL_SECS_CONNECT",
                ..
            }
        ));

        let err = load(&[("YACV_GRACEFUL_SECS_REQUEST", "soon")]).unwrap_err();
        assert!(err.to_string().starts_with("invalid YACV_GRACEFUL_SECS_REQUEST"));
    }
}
