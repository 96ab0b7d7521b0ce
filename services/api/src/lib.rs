//! services/api/src/lib.rs
//!
//! The Marginalia HTTP service: adapters for the core ports, configuration, and
//! the axum web layer. The binaries in `src/bin` wire these together.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
