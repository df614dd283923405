//! Versioned protocol engine for the Hub application.
//!
//! A [`HubApp`] receives the consensus engine's lifecycle calls and hands
//! them to the protocol version responsible for the current height. Each
//! version ([`Protocol`]) wires its own keepers, routers, ante handlers and
//! staking hook chain, and knows how to bootstrap a chain from a genesis
//! document.
//!
//! # Key Types
//!
//! - [`HubApp`]: lifecycle entry points (`init_chain` through `commit`)
//! - [`ProtocolEngine`]: version selection by activation height
//! - [`ProtocolVersion0`]: the first protocol version
//! - [`Router`] / [`QueryRouter`]: route names to handlers and permitted stores
//! - [`StakingHookChain`]: ordered fan-out of staking notifications
//! - [`GenesisCoordinator`]: phased chain bootstrap
//! - [`FatalError`]: errors that halt the node

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod genesis;
pub mod hooks;
pub mod keepers;
pub mod keys;
pub mod protocol;
pub mod router;
pub mod tx;

pub use app::HubApp;
pub use config::AppConfig;
pub use engine::ProtocolEngine;
pub use error::{ConfigError, FatalError, FatalResult, LoadError, RouterError};
pub use genesis::{BootstrapPhase, GenesisCoordinator, GenesisFileState, GenesisState};
pub use hooks::StakingHookChain;
pub use keepers::KeeperSet;
pub use keys::AppKeys;
pub use protocol::{Protocol, ProtocolVersion0};
pub use router::{QueryRouter, Route, Router};
pub use tx::{run_tx, RunMode};
