//! Protocol version selection by block height.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use hub_store::Context;

use crate::error::{FatalError, FatalResult, LoadError};
use crate::protocol::Protocol;

/// Registry of protocol versions keyed by version number.
///
/// The version responsible for height `h` is the one with the greatest
/// activation height not above `h`. Each version is loaded and initialized
/// the first time it becomes current.
#[derive(Default)]
pub struct ProtocolEngine {
    protocols: BTreeMap<u64, Arc<dyn Protocol>>,
    current: Option<u64>,
    initialized: BTreeSet<u64>,
    history: Vec<(u64, u64)>,
}

impl ProtocolEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a version. Versions and activation heights must be unique.
    pub fn add(&mut self, protocol: Arc<dyn Protocol>) -> Result<(), LoadError> {
        let def = protocol.definition();
        let version = def.version();
        if self.protocols.contains_key(&version) {
            return Err(LoadError::DuplicateVersion(version));
        }
        if let Some(existing) = self
            .protocols
            .values()
            .find(|p| p.definition().activation_height() == def.activation_height())
        {
            return Err(LoadError::DuplicateActivation {
                existing: existing.definition().version(),
                incoming: version,
                height: def.activation_height(),
            });
        }
        tracing::debug!(protocol = %def, "protocol registered");
        self.protocols.insert(version, protocol);
        Ok(())
    }

    /// The version responsible for `height`, without activating it.
    pub fn protocol_for(&self, height: u64) -> Option<&Arc<dyn Protocol>> {
        self.protocols
            .values()
            .filter(|p| p.definition().activation_height() <= height)
            .max_by_key(|p| p.definition().activation_height())
    }

    pub fn current(&self) -> Option<&Arc<dyn Protocol>> {
        self.current.and_then(|v| self.protocols.get(&v))
    }

    pub fn is_initialized(&self, version: u64) -> bool {
        self.initialized.contains(&version)
    }

    /// `(height, version)` pairs, one per switch.
    pub fn history(&self) -> &[(u64, u64)] {
        &self.history
    }

    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.protocols.keys().copied()
    }

    /// Make the version responsible for `height` current, loading and
    /// initializing it on first use.
    pub fn activate(&mut self, ctx: &mut Context<'_>, height: u64) -> FatalResult<Arc<dyn Protocol>> {
        let protocol = Arc::clone(self.protocol_for(height).ok_or(FatalError::NoProtocol(height))?);
        let version = protocol.definition().version();
        if self.current == Some(version) {
            return Ok(protocol);
        }

        protocol.load()?;
        if self.initialized.insert(version) {
            protocol.init(ctx)?;
        }
        if let Some(previous) = self.current {
            tracing::info!(from = previous, to = version, height, "protocol switch");
        }
        self.current = Some(version);
        self.history.push((height, version));
        Ok(protocol)
    }
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("versions", &self.protocols.keys().collect::<Vec<_>>())
            .field("current", &self.current)
            .field("history", &self.history)
            .finish()
    }
}
