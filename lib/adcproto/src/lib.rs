//! Protocol-level building blocks for the ADC hub: the wire codec, session
//! and client identifiers, the user-info descriptor and the Tiger password
//! challenge. Nothing in this crate performs I/O.

pub mod auth;
pub mod base32;
pub mod cid;
pub mod command;
pub mod error;
pub mod logging;
pub mod sid;
pub mod userinfo;

/// Version string advertised in the hub `IINF`.
pub const VERSION: &str = "hubd0.1";
