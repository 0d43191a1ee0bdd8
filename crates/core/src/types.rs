//! Gemeinsame Identifikationstypen
//!
//! Teilnehmer- und Raum-IDs verwenden das Newtype-Pattern, damit sie zur
//! Compilezeit nicht verwechselt werden koennen. Beide sind Strings, weil
//! sie vom Spiel-Backend (Benutzer-UID, Raumcode) vergeben werden.

use serde::{Deserialize, Serialize};

/// Eindeutige Teilnehmer-ID (UID aus dem Spiel-Backend)
///
/// `Ord` ist bewusst lexikographisch: die Glare-Aufloesung vergleicht IDs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Erstellt eine PeerId aus einem beliebigen String
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Gibt die ID als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Raumcode eines Spielraums
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Erstellt einen Raumcode; Kleinbuchstaben werden normalisiert
    pub fn neu(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Gibt den Code als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "raum:{}", self.0)
    }
}
