//! # diffpack-server
//!
//! HTTP surface wrapping the diffpack pipeline: `POST /diff` runs it,
//! `GET /health` and `GET /version` report service metadata.

pub mod api;
pub mod server;

pub use server::DiffServer;
