use crate::controller::Direction;
use crate::max_fragment_length::MaxFragmentLength;

/// Largest plaintext payload a TLS record may carry.
pub const MAX_FRAGMENT_LENGTH: usize = 16384;

/// Space reserved per record for the header, explicit IV, MAC and padding.
pub const TLS_RECORD_OVERHEAD: usize = 256;

/// Record buffer size used when neither the config nor the engine says otherwise.
///
/// An engine reporting a record capacity of 0 gets this size.
pub const DEFAULT_RECORD_CAPACITY: usize = MAX_FRAGMENT_LENGTH + TLS_RECORD_OVERHEAD;

/// When an idle record buffer is handed back to the allocator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReleasePolicy {
    /// Release a buffer as soon as the engine reports it idle.
    #[default]
    Eager,
    /// Keep a buffer once allocated until the session is reset or freed.
    Retain,
}

impl ReleasePolicy {
    pub(crate) fn releases_idle(self) -> bool {
        matches!(self, Self::Eager)
    }
}

#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferConfig {
    pub(crate) tx_capacity: Option<usize>,
    pub(crate) rx_capacity: Option<usize>,
    pub(crate) max_fragment_length: Option<MaxFragmentLength>,
    pub(crate) release_policy: ReleasePolicy,
}

impl BufferConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the size of every TX buffer, overriding the engine's record capacity.
    #[must_use]
    pub fn with_tx_capacity(mut self, capacity: usize) -> Self {
        self.tx_capacity = Some(capacity);
        self
    }

    /// Fixes the size of every RX buffer, overriding the engine's record capacity.
    #[must_use]
    pub fn with_rx_capacity(mut self, capacity: usize) -> Self {
        self.rx_capacity = Some(capacity);
        self
    }

    /// Sizes both directions for a negotiated maximum fragment length.
    ///
    /// Explicit capacities set with [`Self::with_tx_capacity`] or
    /// [`Self::with_rx_capacity`] take precedence.
    #[must_use]
    pub fn with_max_fragment_length(mut self, max_fragment_length: MaxFragmentLength) -> Self {
        self.max_fragment_length = Some(max_fragment_length);
        self
    }

    #[must_use]
    pub fn with_release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.release_policy = policy;
        self
    }

    #[must_use]
    pub fn release_policy(&self) -> ReleasePolicy {
        self.release_policy
    }

    /// Buffer size for `direction`, falling back to `engine_capacity` when the
    /// config does not pin one, and to [`DEFAULT_RECORD_CAPACITY`] when the
    /// engine reports 0.
    pub(crate) fn capacity(&self, direction: Direction, engine_capacity: usize) -> usize {
        let explicit = match direction {
            Direction::Tx => self.tx_capacity,
            Direction::Rx => self.rx_capacity,
        };
        explicit
            .or_else(|| {
                self.max_fragment_length
                    .map(|mfl| mfl.payload_len() + TLS_RECORD_OVERHEAD)
            })
            .unwrap_or(match engine_capacity {
                0 => DEFAULT_RECORD_CAPACITY,
                n => n,
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn engine_capacity_is_the_fallback() {
        let config = BufferConfig::new();
        assert_eq!(config.capacity(Direction::Tx, 4096), 4096);
        assert_eq!(config.capacity(Direction::Rx, DEFAULT_RECORD_CAPACITY), 16640);
    }

    #[test]
    fn unsized_engine_gets_full_records() {
        let config = BufferConfig::new();
        assert_eq!(config.capacity(Direction::Tx, 0), MAX_FRAGMENT_LENGTH + 256);
        assert_eq!(config.capacity(Direction::Rx, 0), DEFAULT_RECORD_CAPACITY);

        let config = BufferConfig::new().with_rx_capacity(2048);
        assert_eq!(config.capacity(Direction::Rx, 0), 2048);
    }

    #[test]
    fn explicit_capacity_wins_over_fragment_length() {
        let config = BufferConfig::new()
            .with_max_fragment_length(MaxFragmentLength::Bits10)
            .with_tx_capacity(600);
        assert_eq!(config.capacity(Direction::Tx, 4096), 600);
        assert_eq!(config.capacity(Direction::Rx, 4096), 1024 + TLS_RECORD_OVERHEAD);
    }

    #[test]
    fn default_policy_is_eager() {
        assert_eq!(BufferConfig::new().release_policy(), ReleasePolicy::Eager);
        assert!(ReleasePolicy::Eager.releases_idle());
        assert!(!ReleasePolicy::Retain.releases_idle());
    }
}
