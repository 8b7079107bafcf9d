//! Hybrid resource broker daemon
//!
//! Hosts the allocator behind an HTTP API together with health and
//! Prometheus endpoints.

pub mod api;
pub mod config;
