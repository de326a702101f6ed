//! Driver tuning knobs.
//!
//! Per-connection policy such as the idle timeout and message size limit
//! comes from the [`Handler`](crate::handler::Handler). [`DriverConfig`]
//! covers the I/O mechanics shared by every connection.

use std::time::Duration;

use thiserror::Error;

/// Bytes requested from the socket per read.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;
/// Bytes read per readiness event before output and broadcasts get a turn.
pub const DEFAULT_READ_BUDGET: usize = 64 * 1024;
/// Time allowed for flushing queued frames and the close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// Input discarded while closing before giving up on the peer.
pub const DEFAULT_DRAIN_LIMIT: usize = 64 * 1024;

/// Errors returned by [`DriverConfigBuilder::build`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The read chunk size was zero.
    #[error("read chunk size must be at least one byte")]
    ZeroReadChunk,
    /// The read budget was smaller than one read chunk.
    #[error("read budget {budget} is smaller than the read chunk {chunk}")]
    ReadBudgetBelowChunk {
        /// Configured budget.
        budget: usize,
        /// Configured chunk size.
        chunk: usize,
    },
    /// The close timeout was zero.
    #[error("close timeout must be non-zero")]
    ZeroCloseTimeout,
}

/// I/O settings for a [`ConnectionDriver`](crate::driver::ConnectionDriver).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    read_chunk: usize,
    read_budget: usize,
    close_timeout: Duration,
    drain_limit: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
            read_budget: DEFAULT_READ_BUDGET,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            drain_limit: DEFAULT_DRAIN_LIMIT,
        }
    }
}

impl DriverConfig {
    /// Start from the defaults.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use wsengine::config::DriverConfig;
    ///
    /// let config = DriverConfig::builder()
    ///     .read_chunk(4096)
    ///     .close_timeout(Duration::from_millis(250))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.read_chunk_size(), 4096);
    /// ```
    #[must_use]
    pub fn builder() -> DriverConfigBuilder { DriverConfigBuilder::default() }

    /// Bytes requested from the socket per read.
    #[must_use]
    pub fn read_chunk_size(&self) -> usize { self.read_chunk }

    /// Bytes consumed from the socket per readiness event.
    ///
    /// Once spent, the driver flushes output and delivers broadcasts before
    /// reading again, so a peer that never stops sending cannot starve them.
    #[must_use]
    pub fn read_budget(&self) -> usize { self.read_budget }

    /// Upper bound on the time spent flushing output while closing.
    #[must_use]
    pub fn close_timeout(&self) -> Duration { self.close_timeout }

    /// Most input discarded while closing.
    #[must_use]
    pub fn drain_limit(&self) -> usize { self.drain_limit }
}

/// Builder for [`DriverConfig`].
#[derive(Debug, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Set the read chunk size.
    #[must_use]
    pub fn read_chunk(mut self, bytes: usize) -> Self {
        self.config.read_chunk = bytes;
        self
    }

    /// Set the per-event read budget.
    #[must_use]
    pub fn read_budget(mut self, bytes: usize) -> Self {
        self.config.read_budget = bytes;
        self
    }

    /// Set the close timeout.
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Set the drain limit. Zero skips draining.
    #[must_use]
    pub fn drain_limit(mut self, bytes: usize) -> Self {
        self.config.drain_limit = bytes;
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero read chunk, a read budget below
    /// the chunk size, or a zero close timeout.
    pub fn build(self) -> Result<DriverConfig, ConfigError> {
        let DriverConfig {
            read_chunk,
            read_budget,
            ..
        } = self.config;
        if read_chunk == 0 {
            return Err(ConfigError::ZeroReadChunk);
        }
        if read_budget < read_chunk {
            return Err(ConfigError::ReadBudgetBelowChunk {
                budget: read_budget,
                chunk: read_chunk,
            });
        }
        if self.config.close_timeout.is_zero() {
            return Err(ConfigError::ZeroCloseTimeout);
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DriverConfig::builder().build().expect("defaults");
        assert_eq!(config, DriverConfig::default());
        assert_eq!(config.read_chunk_size(), 8192);
        assert_eq!(config.read_budget(), 64 * 1024);
    }

    #[test]
    fn rejects_budget_below_chunk() {
        assert_eq!(
            DriverConfig::builder().read_chunk(4096).read_budget(1024).build(),
            Err(ConfigError::ReadBudgetBelowChunk {
                budget: 1024,
                chunk: 4096,
            })
        );
    }

    #[test]
    fn rejects_zero_chunk() {
        assert_eq!(
            DriverConfig::builder().read_chunk(0).build(),
            Err(ConfigError::ZeroReadChunk)
        );
    }

    #[test]
    fn rejects_zero_close_timeout() {
        assert_eq!(
            DriverConfig::builder().close_timeout(Duration::ZERO).build(),
            Err(ConfigError::ZeroCloseTimeout)
        );
    }
}
