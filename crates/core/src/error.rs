//! Fehlertypen fuer Jasus
//!
//! Zentraler Fehler-Enum fuer crate-uebergreifende Fehlerzustaende
//! (Nachrichtenformat, Konfiguration). Untermodule mit eigenem Fachbereich
//! (Signaling, Audio, Voice) definieren eigene Fehler.

use thiserror::Error;

/// Globaler Result-Alias fuer Jasus
pub type Result<T> = std::result::Result<T, JasusError>;

/// Crate-uebergreifende Fehler
#[derive(Debug, Error)]
pub enum JasusError {
    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl JasusError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}
