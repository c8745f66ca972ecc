//! Access to the Cisco Intersight REST API.

pub mod client;
pub mod discovery;
pub mod query;
pub mod signing;

pub use client::IntersightClient;
pub use signing::{RequestSigner, SigningScheme};
