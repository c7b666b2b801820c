//! Builder-style option types for the client, the transport and the agent.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for the command-line Subversion client used by
/// [`crate::SvnCliManager`].
pub struct ClientOptions {
    /// Program to run (`svn` by default, resolved via `PATH`).
    pub svn_binary: PathBuf,
    /// Upper bound for one `svn info` run.
    pub timeout: Duration,
    /// Whether each client handle gets a private, empty `--config-dir`.
    ///
    /// This keeps user configuration and cached credentials out of the query
    /// and is removed when the handle is dropped.
    pub isolated_config: bool,
    /// Extra environment variables for the child process.
    pub env: Vec<(String, String)>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            svn_binary: PathBuf::from("svn"),
            timeout: Duration::from_secs(60),
            isolated_config: true,
            env: Vec::new(),
        }
    }
}

impl ClientOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the program used as the Subversion client.
    #[must_use]
    pub fn with_svn_binary(mut self, svn_binary: impl Into<PathBuf>) -> Self {
        self.svn_binary = svn_binary.into();
        self
    }

    /// Sets the per-query timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables the private configuration directory.
    #[must_use]
    pub fn with_isolated_config(mut self, isolated_config: bool) -> Self {
        self.isolated_config = isolated_config;
        self
    }

    /// Adds an environment variable for the child process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Timeouts for the agent wire protocol.
pub struct TransportOptions {
    /// Timeout for establishing a TCP connection to an agent.
    pub connect_timeout: Duration,
    /// Timeout for reading one protocol item.
    ///
    /// On the client side this must cover the agent's query time.
    pub read_timeout: Duration,
    /// Timeout for writing one protocol item.
    pub write_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            write_timeout: Duration::from_secs(60),
        }
    }
}

impl TransportOptions {
    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Options for [`crate::Agent`].
pub struct AgentOptions {
    /// Per-connection timeouts.
    pub transport: TransportOptions,
    /// If set, only absolute paths below this directory may be inspected.
    pub boundary: Option<PathBuf>,
}

impl AgentOptions {
    /// Creates options with no boundary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport timeouts.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Restricts inspection to paths below `boundary`.
    #[must_use]
    pub fn with_boundary(mut self, boundary: impl Into<PathBuf>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_options_builder_overrides_defaults() {
        let options = ClientOptions::new()
            .with_svn_binary("/opt/svn/bin/svn")
            .with_timeout(Duration::from_secs(5))
            .with_isolated_config(false)
            .with_env("SVN_EDITOR", "true");
        assert_eq!(options.svn_binary, PathBuf::from("/opt/svn/bin/svn"));
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!(!options.isolated_config);
        assert_eq!(options.env, vec![("SVN_EDITOR".into(), "true".into())]);
    }

    #[test]
    fn agent_options_default_has_no_boundary() {
        let options = AgentOptions::new();
        assert!(options.boundary.is_none());
        assert_eq!(options.transport, TransportOptions::default());
        let options = options.with_boundary("/ws");
        assert_eq!(options.boundary.as_deref(), Some(std::path::Path::new("/ws")));
    }
}
