//! Google REST access
//!
//! - [`client`] - [`GoogleClient`]: session-aware wrapper, base URLs
//! - [`http`] - [`GoogleHttpClient`]: request plumbing, error classification

pub mod client;
pub mod http;

pub use client::{GoogleClient, GoogleEndpoints};
pub use http::{Download, GoogleHttpClient};
