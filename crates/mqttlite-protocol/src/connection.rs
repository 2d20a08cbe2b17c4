//! Connection lifecycle vocabulary shared by the protocol engine and the
//! client task: disconnect reasons, reconnect policy, and the retry
//! backoff schedule (a fixed attempt budget with a linearly growing
//! delay, reset on any successful connection).

use crate::v5::reason_codes::ReasonCode;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Caller asked for the disconnect.
    ClientInitiated,
    /// The broker closed the connection or sent DISCONNECT.
    ServerClosed,
    NetworkError(String),
    ProtocolError(String),
    /// Broker refused the connection at CONNACK time.
    Refused(ReasonCode),
    KeepAliveTimeout,
    ConnectTimeout,
}

impl DisconnectReason {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::KeepAliveTimeout | Self::ConnectTimeout)
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Base interval; attempt `n` sleeps `base_delay * n` before retrying.
    pub base_delay: Duration,
    pub max_attempts: u8,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_delay: Duration::from_secs(20),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u8) -> bool {
        self.enabled && attempt < self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based). The first retry goes
    /// out immediately; later ones back off linearly.
    #[must_use]
    pub fn delay(&self, attempt: u8) -> Duration {
        self.base_delay * u32::from(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget() {
        let config = ReconnectConfig {
            enabled: true,
            base_delay: Duration::from_secs(20),
            max_attempts: 5,
        };
        assert!(config.should_retry(0));
        assert!(config.should_retry(4));
        assert!(!config.should_retry(5));
    }

    #[test]
    fn test_disabled_never_retries() {
        let config = ReconnectConfig::default();
        assert!(!config.should_retry(0));
    }

    #[test]
    fn test_linear_backoff() {
        let config = ReconnectConfig {
            enabled: true,
            base_delay: Duration::from_secs(20),
            max_attempts: 5,
        };
        assert_eq!(config.delay(0), Duration::ZERO);
        assert_eq!(config.delay(1), Duration::from_secs(20));
        assert_eq!(config.delay(3), Duration::from_secs(60));
    }

    #[test]
    fn test_timeout_reasons() {
        assert!(DisconnectReason::KeepAliveTimeout.is_timeout());
        assert!(DisconnectReason::ConnectTimeout.is_timeout());
        assert!(!DisconnectReason::ClientInitiated.is_timeout());
    }
}
