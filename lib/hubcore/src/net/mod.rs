//! Non-blocking networking: shared write buffers, the line-framing socket,
//! listeners and the readiness reactor driving it all.

pub mod buffer;
pub mod listener;
pub mod reactor;
pub mod socket;
