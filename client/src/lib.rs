//! jasus-client – Bibliotheks-Root
//!
//! Konfiguration und lokale Mesh-Demo. Die eigentliche Voice-Logik liegt in
//! `jasus-voice`; hier wird sie nur zusammengesteckt.

pub mod config;
pub mod demo;

pub use config::ClientConfig;
pub use demo::{demo_ausfuehren, DemoBericht};
