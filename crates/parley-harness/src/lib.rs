//! Deterministic simulation harness for parley.
//!
//! An in-process [`SimEngine`] stands in for the backend engine so the
//! client and application layers can be tested end to end, over the same
//! [`parley_client::Bus`] transport a real deployment uses, without any
//! external process.
//!
//! [`SimWorld`] wires a bus, an engine and a host-side
//! [`parley_client::Backend`] together.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod sim_engine;
pub mod world;

pub use error::EngineError;
pub use sim_engine::SimEngine;
pub use world::SimWorld;
