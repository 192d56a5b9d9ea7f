//! Chainflow engine - dataflow resolution and cross-chain route simulation
//!
//! Resolves values that workflow nodes inherit from upstream nodes, caches
//! unified multi-chain balances, and turns route simulations from the
//! chain-abstraction SDK into a small set of renderable outcomes.

pub mod api;
pub mod balance;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod resolver;
pub mod sdk;
pub mod simulation;

pub use engine::{ExecutionGate, FlowEngine};
pub use error::{EngineError, EngineResult};
