//! A bus, an engine and a host backend wired together.

use parley_app::{Session, SessionConfig};
use parley_client::{Backend, Bus, ClientConfig};

use crate::SimEngine;

/// Simulated deployment: one shared bus with a [`SimEngine`] on the peer
/// side and a [`Backend`] on the host side.
pub struct SimWorld {
    /// Shared bus both endpoints are attached to.
    pub bus: Bus,
    /// Simulated engine.
    pub engine: SimEngine,
    /// Host-side facade.
    pub backend: Backend,
}

impl SimWorld {
    /// World with default client configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, ClientConfig::default())
    }

    /// World with a custom client configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_config(seed: u64, config: ClientConfig) -> Self {
        let bus = Bus::new(config.bus_capacity, config.channel_capacity);
        let engine = SimEngine::attach(&bus, seed);
        let backend = Backend::connect(bus.attach(), config);
        Self { bus, engine, backend }
    }

    /// Session over this world's backend.
    pub fn session(&self, config: SessionConfig) -> Session {
        Session::new(self.backend.clone(), config)
    }

    /// Stop the engine and the backend.
    pub fn shutdown(&self) {
        self.backend.shutdown();
        self.engine.shutdown();
    }
}
