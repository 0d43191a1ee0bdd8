//! Sitzungsbeschreibungen und Netzwerk-Kandidaten
//!
//! Die Inhalte sind fuer den Kern opak: sie werden von der Medien-Plattform
//! erzeugt und unveraendert an die Gegenseite weitergereicht.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kennung einer einzelnen Offer/Answer-Verhandlung
///
/// Wird vom Anbieter erzeugt; Answer und alle Kandidaten derselben
/// Verhandlung wiederholen sie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NegotiationId(pub Uuid);

impl NegotiationId {
    /// Erstellt eine neue zufaellige Verhandlungs-ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NegotiationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NegotiationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "verhandlung:{}", self.0)
    }
}

/// Art einer Sitzungsbeschreibung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Sitzungsbeschreibung (Offer oder Answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Netzwerk-Kandidat (ICE)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    /// Erstellt einen Kandidaten fuer die erste Audio-Spur
    pub fn neu(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    /// Grobe Formpruefung. Kaputte Kandidaten werden verworfen, die
    /// Verbindung hat dann nur einen Netzwerkpfad weniger.
    pub fn ist_gueltig(&self) -> bool {
        let c = self.candidate.trim();
        c.starts_with("candidate:")
            && c.split_whitespace().count() >= 8
            && (self.sdp_mid.is_some() || self.sdp_m_line_index.is_some())
    }
}
