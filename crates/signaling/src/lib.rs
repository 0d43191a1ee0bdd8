//! jasus-signaling – Signal-Log eines Raums
//!
//! Das Voice-Mesh hat keinen Verhandlungsserver. Alle Teilnehmer eines
//! Raums haengen ihre Signalnachrichten an ein gemeinsames Append-only-Log
//! an und lesen neue Eintraege ab dem Zeitpunkt des Abonnements mit.
//!
//! ## Architektur
//!
//! ```text
//! MeshCoordinator
//!     |                      ^
//!     v                      |
//! SignalSender          EingangsFilter (eigene / veraltete / fremd adressierte)
//!     |  geordnet            ^
//!     v                      |
//! SignalingChannel::append   SignalingChannel::subscribe
//!     \______ Raum-Log ______/
//! ```
//!
//! `InMemorySignaling` ist eine prozesslokale Implementierung fuer Tests
//! und die lokale Demo.

pub mod channel;
pub mod error;
pub mod filter;
pub mod memory;
pub mod sender;

// Bequeme Re-Exporte
pub use channel::{SignalStream, SignalingChannel};
pub use error::{SignalingError, SignalingResult};
pub use filter::{EingangsFilter, Verworfen, STALENESS_FENSTER_MS};
pub use memory::InMemorySignaling;
pub use sender::SignalSender;
