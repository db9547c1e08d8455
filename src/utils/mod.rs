//! # Utility Modules
//!
//! Supporting utilities for compression, logging, and observability.
//!
//! ## Components
//! - **Compression**: LZ4 and Zstd raw-block codecs with inflate-size caps
//! - **Logging**: structured logging configuration
//! - **Metrics**: thread-safe observability counters

pub mod compression;
pub mod logging;
pub mod metrics;

pub use metrics::Metrics;
