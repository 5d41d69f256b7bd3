//! Tunable parameters shared by every node in the overlay.

use crate::error::ChordError;

pub const MIN_PERIODIC_INTERVAL_MS: u64 = 500;
pub const MAX_PERIODIC_INTERVAL_MS: u64 = 300_000;

#[derive(Clone, Debug)]
pub struct Config {
    pub max_node_init_retries: u32,
    pub max_transport_retries: u32,
    pub max_file_publish_retries: u32,
    pub periodic_interval_ms: u64,
    pub max_successor_number: usize,
    pub rpc_timeout_ms: u64,
    pub dev_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_node_init_retries: 3,
            max_transport_retries: 5,
            max_file_publish_retries: 5,
            periodic_interval_ms: 2_500,
            max_successor_number: 3,
            rpc_timeout_ms: 5_000,
            dev_mode: false,
        }
    }
}

impl Config {
    /// Constructs a `Config`, validating `periodic_interval_ms` against
    /// `[500, 300000]`. This is the only place `InvalidTimeout` is raised.
    pub fn try_new(
        max_node_init_retries: u32,
        max_transport_retries: u32,
        max_file_publish_retries: u32,
        periodic_interval_ms: u64,
        max_successor_number: usize,
        rpc_timeout_ms: u64,
        dev_mode: bool,
    ) -> Result<Self, ChordError> {
        if !(MIN_PERIODIC_INTERVAL_MS..=MAX_PERIODIC_INTERVAL_MS).contains(&periodic_interval_ms) {
            return Err(ChordError::InvalidTimeout {
                value: periodic_interval_ms,
                min: MIN_PERIODIC_INTERVAL_MS,
                max: MAX_PERIODIC_INTERVAL_MS,
            });
        }
        Ok(Config {
            max_node_init_retries,
            max_transport_retries,
            max_file_publish_retries,
            periodic_interval_ms,
            max_successor_number,
            rpc_timeout_ms,
            dev_mode,
        })
    }

    /// Applies a runtime update to `periodic_interval_ms`, re-validating it.
    pub fn set_periodic_interval_ms(&mut self, value: u64) -> Result<(), ChordError> {
        if !(MIN_PERIODIC_INTERVAL_MS..=MAX_PERIODIC_INTERVAL_MS).contains(&value) {
            return Err(ChordError::InvalidTimeout {
                value,
                min: MIN_PERIODIC_INTERVAL_MS,
                max: MAX_PERIODIC_INTERVAL_MS,
            });
        }
        self.periodic_interval_ms = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = Config::default();
        assert_eq!(c.periodic_interval_ms, 2_500);
    }

    #[test]
    fn rejects_interval_below_minimum() {
        let err = Config::try_new(3, 5, 5, 499, 3, 5_000, false).unwrap_err();
        assert!(matches!(err, ChordError::InvalidTimeout { value: 499, .. }));
    }

    #[test]
    fn rejects_interval_above_maximum() {
        let err = Config::try_new(3, 5, 5, 300_001, 3, 5_000, false).unwrap_err();
        assert!(matches!(
            err,
            ChordError::InvalidTimeout { value: 300_001, .. }
        ));
    }

    #[test]
    fn accepts_boundary_values() {
        assert!(Config::try_new(3, 5, 5, 500, 3, 5_000, false).is_ok());
        assert!(Config::try_new(3, 5, 5, 300_000, 3, 5_000, false).is_ok());
    }
}
