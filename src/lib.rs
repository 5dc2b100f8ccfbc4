//! Tollgate - Request Rate Governance
//!
//! This crate guards an HTTP API with tiered fixed-window rate limiters and a
//! graduated abuse detector that escalates from warnings to temporary blocks.
//! Counters live in a shared Redis store when one is configured, with a
//! per-process in-memory fallback for the limiters.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
