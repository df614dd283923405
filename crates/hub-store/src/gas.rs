use std::cell::Cell;

use crate::error::{StoreError, StoreResult};

/// Per-operation gas prices for store access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasConfig {
    pub has_cost: u64,
    pub delete_cost: u64,
    pub read_cost_flat: u64,
    pub read_cost_per_byte: u64,
    pub write_cost_flat: u64,
    pub write_cost_per_byte: u64,
    pub iter_next_cost: u64,
}

impl GasConfig {
    pub const KV: Self = Self {
        has_cost: 10,
        delete_cost: 10,
        read_cost_flat: 10,
        read_cost_per_byte: 1,
        write_cost_flat: 2000,
        write_cost_per_byte: 30,
        iter_next_cost: 30,
    };
}

impl Default for GasConfig {
    fn default() -> Self {
        Self::KV
    }
}

/// Tracks gas consumed by one execution.
///
/// Shared between a context and its branches, so consumption inside a
/// discarded branch still counts.
#[derive(Debug)]
pub struct GasMeter {
    limit: Option<u64>,
    consumed: Cell<u64>,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            consumed: Cell::new(0),
        }
    }

    /// A meter that never runs out. Used for block-level phases.
    pub fn infinite() -> Self {
        Self {
            limit: None,
            consumed: Cell::new(0),
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.get()
    }

    pub fn is_past_limit(&self) -> bool {
        self.limit.is_some_and(|limit| self.consumed.get() > limit)
    }

    pub fn consume(&self, amount: u64, descriptor: &str) -> StoreResult<()> {
        let used = self.consumed.get().saturating_add(amount);
        self.consumed.set(used);
        match self.limit {
            Some(limit) if used > limit => Err(StoreError::OutOfGas {
                descriptor: descriptor.to_string(),
                limit,
                used,
            }),
            _ => Ok(()),
        }
    }

    /// Credit gas back, e.g. after a message refunds work.
    pub fn refund(&self, amount: u64) {
        self.consumed.set(self.consumed.get().saturating_sub(amount));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_meter_errors_past_limit() {
        let meter = GasMeter::new(100);
        meter.consume(60, "read").unwrap();
        let err = meter.consume(50, "write").unwrap_err();
        assert_eq!(
            err,
            StoreError::OutOfGas {
                descriptor: "write".into(),
                limit: 100,
                used: 110
            }
        );
        assert!(meter.is_past_limit());
        assert!(!err.is_fatal());
    }

    #[test]
    fn infinite_meter_never_errors() {
        let meter = GasMeter::infinite();
        meter.consume(u64::MAX, "huge").unwrap();
        meter.consume(1, "more").unwrap();
        assert_eq!(meter.consumed(), u64::MAX);
    }
}
