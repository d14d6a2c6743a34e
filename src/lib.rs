//! Ruster Resolver - IPv4 address resolution
//!
//! The ARP cache, gateway table, route cache and ICMP redirect handling of a
//! small single-interface IPv4 stack. Frame I/O is supplied by the caller
//! through [`dataplane::Link`].

pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
