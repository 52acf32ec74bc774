//! Configuration for routers and dispatchers.

use std::time::Duration;

/// Configuration for a [`CallRouter`](crate::CallRouter).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Emit per-message debug events.
    pub debug: bool,

    /// How long a call waits for its reply.
    ///
    /// Set to `Duration::ZERO` to disable timeouts.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            debug: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create a configuration from an integer millisecond timeout, `0`
    /// meaning no timeout.
    pub fn from_millis(timeout_ms: u64) -> Self {
        Self {
            debug: false,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Toggle debug events.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for replies forever.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = Duration::ZERO;
        self
    }

    /// The timeout, unless disabled.
    pub fn effective_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Emit per-message debug events.
    pub debug: bool,
}

impl ServerConfig {
    /// Toggle debug events.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
