//! # beacon-core
//!
//! Shared domain layer for the beacon observability hub:
//!
//! - **Config**: typed runtime configuration resolved from the environment
//!   with `BEACON_` / `BEACON_DESKTOP_` precedence
//! - **Contract**: validation and normalization of inbound event payloads,
//!   double-encoded JSON recovery, byte-capped metadata truncation
//! - **Pricing**: embedded per-model-family pricing tables and cost math

#![deny(unsafe_code)]

pub mod config;
pub mod contract;
pub mod pricing;
