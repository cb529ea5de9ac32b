//! Talking to an OMERO.web server with the BIOMERO plugin installed.
//!
//! [`client::BiomeroClient`] wraps the JSON endpoints, [`adapter`] turns
//! tree payloads into [`ChildRecord`](biomero_core::store::ChildRecord)s
//! for the node store, and [`executor::ApiExecutor`] runs all of it on a
//! background thread so the UI never blocks.

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod payload;
pub mod workflows;

#[cfg(test)]
mod fake_server;

pub use client::BiomeroClient;
pub use config::ClientConfig;
pub use error::ApiError;
