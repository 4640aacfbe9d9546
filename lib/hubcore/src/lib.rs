//! The hub engine: sockets and shared write buffers, the readiness reactor,
//! the roster and routing machinery, the client and inter-hub session state
//! machines, plugin dispatch and the configuration model.

pub mod config;
pub mod hub;
pub mod net;
pub mod support;
