//! # jasus-observability
//!
//! Observability-Crate fuer Jasus:
//! - Prometheus-kompatible Metriken des Voice-Mesh (Textexport)
//! - Structured Logging (Text oder JSON) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
pub use metrics::MeshMetrics;
