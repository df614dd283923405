use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one protocol version: which logic set produced a block.
///
/// Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    version: u64,
    reference: String,
    activation_height: u64,
}

impl ProtocolDefinition {
    pub fn new(version: u64, reference: impl Into<String>, activation_height: u64) -> Self {
        Self {
            version,
            reference: reference.into(),
            activation_height,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Release reference (tag URL or name) of the software implementing it.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// First block height this version is responsible for.
    pub fn activation_height(&self) -> u64 {
        self.activation_height
    }
}

impl fmt::Display for ProtocolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{} (from height {}, {})",
            self.version, self.activation_height, self.reference
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_for_status_export() {
        let def = ProtocolDefinition::new(0, "hub/v0.1.0", 1);
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["version"], 0);
        assert_eq!(json["activation_height"], 1);
        let back: ProtocolDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, def);
    }
}
