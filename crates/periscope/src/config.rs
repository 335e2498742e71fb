//! Attach-time configuration.
//!
//! The environment boundary of the crate is deliberately narrow: the caller
//! passes an explicit [`AttachOptions`] value and nothing is read from config
//! files or the process environment.

use std::fmt;
use std::time::Duration;

/// Default interface the console listens on.
pub const DEFAULT_HOST: &str = "localhost";

/// Default TCP port the console listens on.
pub const DEFAULT_PORT: u16 = 10000;

/// Default frequency at which background workers re-check their stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of datapoints retained per series before eviction.
pub const DEFAULT_SERIES_CAPACITY: usize = 500;

/// Hosts accepted without the external-bind opt-in.
const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Options accepted by [`attach`](crate::attach).
///
/// The defaults bind the console to `localhost:10000` with a one second poll
/// interval and a 500-point series capacity, and refuse non-loopback hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachOptions {
    host: String,
    port: u16,
    poll_interval: Duration,
    series_capacity: usize,
    allow_external_bind: bool,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            series_capacity: DEFAULT_SERIES_CAPACITY,
            allow_external_bind: false,
        }
    }
}

impl AttachOptions {
    /// Builds the default option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interface to listen for connections on.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port to listen for connections on. Port `0` requests an
    /// ephemeral port; the bound address is reported by
    /// [`local_addr`](crate::local_addr).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the frequency at which background workers check for a stop
    /// request. This bounds worst-case shutdown latency.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum number of datapoints recorded per series. Past the
    /// limit, datapoints are discarded oldest-first.
    #[must_use]
    pub fn series_capacity(mut self, capacity: usize) -> Self {
        self.series_capacity = capacity;
        self
    }

    /// Permits binding to a non-loopback interface. The console channel is
    /// neither authenticated nor encrypted, so this is off by default.
    #[must_use]
    pub fn allow_external_bind(mut self, allow: bool) -> Self {
        self.allow_external_bind = allow;
        self
    }

    pub(crate) fn host_str(&self) -> &str {
        &self.host
    }

    pub(crate) const fn port_value(&self) -> u16 {
        self.port
    }

    pub(crate) const fn poll_interval_value(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) const fn series_capacity_value(&self) -> usize {
        self.series_capacity
    }

    /// Whether these options may bind: loopback hosts always may, anything
    /// else requires the explicit opt-in.
    pub(crate) fn bind_permitted(&self) -> bool {
        self.allow_external_bind || LOOPBACK_HOSTS.contains(&self.host.as_str())
    }
}

impl fmt::Display for AttachOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = AttachOptions::new();
        assert_eq!(options.host_str(), "localhost");
        assert_eq!(options.port_value(), 10000);
        assert_eq!(options.poll_interval_value(), Duration::from_secs(1));
        assert_eq!(options.series_capacity_value(), 500);
        assert!(options.bind_permitted());
    }

    #[rstest]
    #[case("localhost")]
    #[case("127.0.0.1")]
    #[case("::1")]
    fn loopback_hosts_bind_without_opt_in(#[case] host: &str) {
        assert!(AttachOptions::new().host(host).bind_permitted());
    }

    #[rstest]
    #[case("0.0.0.0")]
    #[case("192.168.1.4")]
    #[case("example.com")]
    fn external_hosts_require_opt_in(#[case] host: &str) {
        assert!(!AttachOptions::new().host(host).bind_permitted());
        assert!(
            AttachOptions::new()
                .host(host)
                .allow_external_bind(true)
                .bind_permitted()
        );
    }

    #[test]
    fn builder_setters_apply() {
        let options = AttachOptions::new()
            .port(0)
            .poll_interval(Duration::from_millis(50))
            .series_capacity(8);
        assert_eq!(options.port_value(), 0);
        assert_eq!(options.poll_interval_value(), Duration::from_millis(50));
        assert_eq!(options.series_capacity_value(), 8);
        assert_eq!(options.to_string(), "localhost:0");
    }
}
