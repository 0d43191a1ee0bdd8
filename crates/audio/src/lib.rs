//! jasus-audio – Lokales Mikrofon fuer den Voice-Chat
//!
//! - Vertrag der plattformseitigen Mikrofon-Faehigkeit (`Microphone`,
//!   `LocalAudioHandle`) inklusive Aufnahme-Constraints
//! - Energie-basierte Sprachaktivitaetserkennung (`SprachDetektor`)
//! - Periodischer `VoiceActivityMonitor`, der nur Zustandswechsel meldet
//! - Simuliertes Mikrofon fuer Tests und die lokale Demo

pub mod error;
pub mod microphone;
pub mod monitor;
pub mod sim;
pub mod vad;

// Bequeme Re-Exporte der wichtigsten Typen
pub use error::{AudioError, AudioResult};
pub use microphone::{AudioConstraints, LocalAudioHandle, Microphone};
pub use monitor::VoiceActivityMonitor;
pub use sim::{SimVerhalten, SimulatedAudioHandle, SimulatedMicrophone};
pub use vad::{durchschnittliche_energie, SprachDetektor, VadConfig};
