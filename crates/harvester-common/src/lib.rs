//! Shared building blocks for the harvester agent and server.
//!
//! [`metric`] holds the Gauge/Counter value model and its merge rules,
//! [`codec`] the layered body encoding used on the wire (JSON, AES-GCM,
//! gzip, HMAC-SHA256) and [`handshake`] the RSA-OAEP exchange that
//! establishes the symmetric key.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod metric;

pub use metric::{Metric, MetricKind, MetricValue};
