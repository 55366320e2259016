//! Configuration for the handshake engine.
//!
//! Mirrors `spec.md` §6's "Configuration options": every field has the
//! spec's documented default, and every field is adjustable via a
//! builder-style `with_*` method, in the style of `NodeConfig` /
//! `TransportConfig` from the teacher crate this workspace is grounded on.

use std::time::Duration;

use crate::error::ApkesError;

/// Default number of bootstrap broadcast rounds.
pub const DEFAULT_ROUNDS: u32 = 6;

/// Default duration of each bootstrap round.
pub const DEFAULT_ROUND_DURATION: Duration = Duration::from_secs(7);

/// Default size of the wait-timer pool (and thus the admission bound on
/// concurrently tentative neighbors).
pub const DEFAULT_MAX_TENTATIVE_NEIGHBORS: usize = 2;

/// Default budget for the HELLOACK to arrive after ACK is sent.
pub const DEFAULT_ACK_DELAY: Duration = Duration::from_secs(5);

/// Configuration for an [`crate::engine::Engine`] instance.
#[derive(Debug, Clone)]
pub struct ApkesConfig {
    /// Number of bootstrap broadcast rounds.
    pub rounds: u32,
    /// Duration of each bootstrap round.
    pub round_duration: Duration,
    /// Size of the wait-timer pool; also the admission bound on
    /// concurrently tentative neighbors (flood protection).
    pub max_tentative_neighbors: usize,
    /// Upper bound of the randomized HELLOACK reply delay.
    pub max_waiting_period: Duration,
    /// Extra time budgeted for the ACK to arrive after HELLOACK is sent.
    pub ack_delay: Duration,
    /// Enables the broadcast-key (EBEAP) piggyback in HELLOACK/ACK.
    pub ebeap_with_encryption: bool,
    /// Network-wide broadcast key threaded through the HELLOACK/ACK
    /// trailer when `ebeap_with_encryption` is set. No broadcast-key
    /// distribution or rotation logic is implemented; APKES only
    /// specifies where the key bytes appear on the wire (§4.1.3/§6).
    pub broadcast_key: Option<[u8; 16]>,
    /// Fixed capacity of the neighbor table.
    pub max_neighbors: usize,
}

impl Default for ApkesConfig {
    fn default() -> Self {
        let round_duration = DEFAULT_ROUND_DURATION;
        Self {
            rounds: DEFAULT_ROUNDS,
            round_duration,
            max_tentative_neighbors: DEFAULT_MAX_TENTATIVE_NEIGHBORS,
            max_waiting_period: round_duration.saturating_sub(Duration::from_secs(2)),
            ack_delay: DEFAULT_ACK_DELAY,
            ebeap_with_encryption: false,
            broadcast_key: None,
            max_neighbors: 16,
        }
    }
}

impl ApkesConfig {
    /// Set the number of bootstrap rounds.
    #[must_use]
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    /// Set the duration of each bootstrap round.
    #[must_use]
    pub fn with_round_duration(mut self, duration: Duration) -> Self {
        self.round_duration = duration;
        self
    }

    /// Set the wait-timer pool size / tentative-neighbor admission bound.
    #[must_use]
    pub fn with_max_tentative_neighbors(mut self, max: usize) -> Self {
        self.max_tentative_neighbors = max;
        self
    }

    /// Set the upper bound of the randomized HELLOACK reply delay.
    #[must_use]
    pub fn with_max_waiting_period(mut self, period: Duration) -> Self {
        self.max_waiting_period = period;
        self
    }

    /// Set the extra time budgeted for the ACK to arrive.
    #[must_use]
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    /// Enable or disable the broadcast-key (EBEAP) piggyback.
    #[must_use]
    pub fn with_ebeap_with_encryption(mut self, enabled: bool) -> Self {
        self.ebeap_with_encryption = enabled;
        self
    }

    /// Set the network-wide broadcast key threaded through HELLOACK/ACK
    /// trailers when `ebeap_with_encryption` is enabled.
    #[must_use]
    pub fn with_broadcast_key(mut self, key: [u8; 16]) -> Self {
        self.broadcast_key = Some(key);
        self
    }

    /// Set the neighbor table's fixed capacity.
    #[must_use]
    pub fn with_max_neighbors(mut self, max: usize) -> Self {
        self.max_neighbors = max;
        self
    }

    /// Reject configurations that cannot produce a live handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ApkesError::InvalidConfig`] if `max_tentative_neighbors` is
    /// zero (no HELLOs could ever be admitted), if `max_waiting_period` is
    /// not strictly less than `round_duration` (a HELLOACK could never be
    /// sent before the next round starts), or if `max_neighbors` is zero.
    pub fn validate(&self) -> Result<(), ApkesError> {
        if self.max_tentative_neighbors == 0 {
            return Err(ApkesError::InvalidConfig(
                "max_tentative_neighbors must be at least 1",
            ));
        }
        if self.max_neighbors == 0 {
            return Err(ApkesError::InvalidConfig("max_neighbors must be at least 1"));
        }
        if self.max_waiting_period >= self.round_duration {
            return Err(ApkesError::InvalidConfig(
                "max_waiting_period must be less than round_duration",
            ));
        }
        if self.ebeap_with_encryption && self.broadcast_key.is_none() {
            return Err(ApkesError::InvalidConfig(
                "ebeap_with_encryption requires a broadcast_key",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ApkesConfig::default();
        assert_eq!(config.rounds, 6);
        assert_eq!(config.round_duration, Duration::from_secs(7));
        assert_eq!(config.max_tentative_neighbors, 2);
        assert_eq!(config.max_waiting_period, Duration::from_secs(5));
        assert_eq!(config.ack_delay, Duration::from_secs(5));
        assert!(!config.ebeap_with_encryption);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides_fields() {
        let config = ApkesConfig::default()
            .with_rounds(3)
            .with_round_duration(Duration::from_secs(1))
            .with_max_tentative_neighbors(4)
            .with_ebeap_with_encryption(true);
        assert_eq!(config.rounds, 3);
        assert_eq!(config.round_duration, Duration::from_secs(1));
        assert_eq!(config.max_tentative_neighbors, 4);
        assert!(config.ebeap_with_encryption);
    }

    #[test]
    fn ebeap_without_broadcast_key_is_rejected() {
        let config = ApkesConfig::default().with_ebeap_with_encryption(true);
        assert!(config.validate().is_err());

        let config = config.with_broadcast_key([0x7A; 16]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_tentative_neighbors() {
        let config = ApkesConfig::default().with_max_tentative_neighbors(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_waiting_period_not_shorter_than_round() {
        let config = ApkesConfig::default()
            .with_round_duration(Duration::from_secs(5))
            .with_max_waiting_period(Duration::from_secs(5));
        assert!(config.validate().is_err());
    }
}
