//! Registry wire protocol support.
//!
//! `TokenManager` exchanges an authentication challenge for a bearer token;
//! `RegistryClient` drives the v2 manifest and blob endpoints, handling the
//! 401 challenge dance and blob-storage redirects.

mod client;
mod token;

pub use client::RegistryClient;
pub use token::{Claims, Token, TokenManager};
