//! Tip configuration - fixed constants with builder overrides

use std::time::Duration;

use crate::amount::FeeSpec;

/// Maintainers' fee-collection address.
pub const FEE_ADDRESS: &str = "kaspa:qzqp7lkqwe06hnnywhdsem4jap6zqdtlya9jrdkc97294v2xju8rx3jm9tf6m";
/// Memo attached to every fee transfer.
pub const FEE_MEMO: &str = "KaspaTip fee";
/// 0.1% of the transfer amount.
pub const FEE_RATE_BPS: u32 = 10;
/// Fractional digits of one KAS (1 KAS = 100_000_000 sompi).
pub const AMOUNT_PRECISION: u32 = 8;

/// Log filter when none is given: this crate at `info`, everything else at `warn`.
pub const DEFAULT_LOG_FILTER: &str = "warn,kaspatip=info";

pub const ADDRESS_PREFIX: &str = "kaspa:";
pub const ADDRESS_MIN_LEN: usize = 62;
/// Real P2PK addresses are `kaspa:` plus 61 characters, 67 in all, so the
/// cap is 67 rather than the 66 the old widget checked. The fee address
/// itself is 67 characters and would otherwise fail its own check.
pub const ADDRESS_MAX_LEN: usize = 67;

/// How long Success / AmbiguousPending stay on screen.
pub const RESET_DELAY: Duration = Duration::from_secs(5);
/// Detection poll period while the extension has not injected itself yet.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Syntactic address rules. Not a checksum validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRules {
    pub prefix: String,
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for AddressRules {
    fn default() -> Self {
        Self { prefix: ADDRESS_PREFIX.into(), min_len: ADDRESS_MIN_LEN, max_len: ADDRESS_MAX_LEN }
    }
}

/// Configuration shared by the session adapter, the send flow and the drivers.
#[derive(Debug, Clone)]
pub struct TipConfig {
    pub fee: FeeSpec,
    pub address: AddressRules,
    pub reset_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for TipConfig {
    fn default() -> Self {
        Self {
            fee: FeeSpec::default(),
            address: AddressRules::default(),
            reset_delay: RESET_DELAY,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl TipConfig {
    pub fn new() -> Self { Self::default() }
    pub fn with_fee(mut self, fee: FeeSpec) -> Self { self.fee = fee; self }
    pub fn with_address_rules(mut self, rules: AddressRules) -> Self { self.address = rules; self }
    pub fn with_reset_delay(mut self, delay: Duration) -> Self { self.reset_delay = delay; self }
    pub fn with_poll_interval(mut self, interval: Duration) -> Self { self.poll_interval = interval; self }

    /// Short timers for simulations and tests.
    pub fn fast_test() -> Self {
        Self::default()
            .with_reset_delay(Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = TipConfig::default();
        assert_eq!(config.fee.address, FEE_ADDRESS);
        assert_eq!(config.fee.memo, FEE_MEMO);
        assert_eq!(config.fee.rate_bps, FEE_RATE_BPS);
        assert_eq!(config.reset_delay, Duration::from_secs(5));
        assert_eq!(config.address.prefix, "kaspa:");
        assert_eq!((config.address.min_len, config.address.max_len), (62, 67));
    }

    #[test]
    fn fee_address_is_well_formed() {
        assert!(FEE_ADDRESS.starts_with(ADDRESS_PREFIX));
        assert_eq!(FEE_ADDRESS.len(), 67);
    }

    #[test]
    fn builder_overrides() {
        let config = TipConfig::new().with_reset_delay(Duration::from_millis(1));
        assert_eq!(config.reset_delay, Duration::from_millis(1));
        assert_eq!(config.poll_interval, POLL_INTERVAL);
    }
}
