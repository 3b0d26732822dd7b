//! # PAN Test Suite
//!
//! Unified test crate for behaviour that spans crates.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── properties.rs      # Core bus guarantees
//!     ├── routing_flows.rs   # Bus + routing engine
//!     └── inspector_flows.rs # Bus + inspector, snapshots
//!
//! tests/benches/
//! └── bus_benchmarks.rs      # criterion benchmarks
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p pan-tests
//!
//! # By category
//! cargo test -p pan-tests integration::properties::
//! cargo test -p pan-tests integration::routing_flows::
//!
//! # Benchmarks
//! cargo bench -p pan-tests
//! ```

#![allow(dead_code)]

pub mod integration;
