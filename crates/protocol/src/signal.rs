//! Signalnachrichten des Raum-Logs
//!
//! Jede Nachricht ist ein unveraenderlicher Datensatz, der an das
//! Append-only-Log eines Raums angehaengt wird. Das Log kennt keine
//! Empfaenger: Offer, Answer und Candidate tragen deshalb den
//! adressierten Teilnehmer im Payload, alle anderen ignorieren sie.
//!
//! ## JSON-Form
//! ```text
//! {
//!   "sender_id": "uid-a",
//!   "sender_display_name": "Aylin",
//!   "sent_at_millis": 1700000000000,
//!   "payload": { "kind": "offer", "an": "uid-b", "verhandlung": "...", "beschreibung": {...} }
//! }
//! ```

use jasus_core::{JasusError, PeerId};
use serde::{Deserialize, Serialize};

use crate::session::{IceCandidate, NegotiationId, SessionDescription};

// ---------------------------------------------------------------------------
// Nachrichtenart
// ---------------------------------------------------------------------------

/// Art einer Signalnachricht (ohne Inhalt, fuer Logging und Metriken)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Joined,
    Offer,
    Answer,
    Candidate,
    Left,
    SpeakingChanged,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Left => "left",
            Self::SpeakingChanged => "speaking_changed",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Inhalt einer Signalnachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalPayload {
    /// Teilnehmer ist dem Voice-Chat beigetreten (Anzeigename im Umschlag)
    Joined,
    /// Verbindungsangebot an genau einen Teilnehmer
    Offer {
        an: PeerId,
        verhandlung: NegotiationId,
        beschreibung: SessionDescription,
    },
    /// Antwort auf ein Angebot
    Answer {
        an: PeerId,
        verhandlung: NegotiationId,
        beschreibung: SessionDescription,
    },
    /// Netzwerk-Kandidat einer laufenden Verhandlung
    Candidate {
        an: PeerId,
        verhandlung: NegotiationId,
        kandidat: IceCandidate,
    },
    /// Teilnehmer hat den Voice-Chat verlassen
    Left,
    /// Sprechanzeige hat umgeschaltet
    SpeakingChanged { speaking: bool },
}

impl SignalPayload {
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Joined => SignalKind::Joined,
            Self::Offer { .. } => SignalKind::Offer,
            Self::Answer { .. } => SignalKind::Answer,
            Self::Candidate { .. } => SignalKind::Candidate,
            Self::Left => SignalKind::Left,
            Self::SpeakingChanged { .. } => SignalKind::SpeakingChanged,
        }
    }

    /// Adressierter Empfaenger (None = an alle im Raum)
    pub fn empfaenger(&self) -> Option<&PeerId> {
        match self {
            Self::Offer { an, .. } | Self::Answer { an, .. } | Self::Candidate { an, .. } => {
                Some(an)
            }
            Self::Joined | Self::Left | Self::SpeakingChanged { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SignalingMessage
// ---------------------------------------------------------------------------

/// Unveraenderlicher Datensatz im Signal-Log eines Raums
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingMessage {
    pub sender_id: PeerId,
    pub sender_display_name: String,
    /// Absendezeit in ms seit Unix-Epoche (Uhr des Absenders)
    pub sent_at_millis: i64,
    pub payload: SignalPayload,
}

impl SignalingMessage {
    pub fn neu(
        sender_id: PeerId,
        sender_display_name: impl Into<String>,
        sent_at_millis: i64,
        payload: SignalPayload,
    ) -> Self {
        Self {
            sender_id,
            sender_display_name: sender_display_name.into(),
            sent_at_millis,
            payload,
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.payload.kind()
    }

    /// Alter der Nachricht relativ zu `jetzt_millis` (negativ bei Uhrenversatz
    /// des Absenders in die Zukunft)
    pub fn alter_millis(&self, jetzt_millis: i64) -> i64 {
        jetzt_millis - self.sent_at_millis
    }

    /// Prueft ob die Nachricht an `peer` gerichtet ist oder an alle geht
    pub fn betrifft(&self, peer: &PeerId) -> bool {
        match self.payload.empfaenger() {
            Some(an) => an == peer,
            None => true,
        }
    }

    /// Serialisiert die Nachricht als JSON-Text
    pub fn to_json(&self) -> jasus_core::Result<String> {
        serde_json::to_string(self).map_err(|e| JasusError::UngueltigeNachricht(e.to_string()))
    }

    /// Deserialisiert eine Nachricht aus JSON-Text
    pub fn from_json(json: &str) -> jasus_core::Result<Self> {
        serde_json::from_str(json).map_err(|e| JasusError::UngueltigeNachricht(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
