//! Ausgehende Schnittstellen zur Oberflaeche
//!
//! Der Koordinator ruft diese Traits nur aus seinem eigenen Task auf
//! (fire-and-forget). Implementierungen duerfen nicht blockieren; Fehler
//! bei Toenen oder Toasts werden ignoriert.

use jasus_core::PeerId;
use serde::Serialize;

use crate::media::{ConnectionState, RemoteStreamHandle};
use crate::session::SessionState;

/// Verbindungsqualitaet fuer die Statusanzeige
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    Verbindet,
    Verbunden,
    Instabil,
    Getrennt,
}

impl ConnectionQuality {
    pub fn aus_zustand(zustand: ConnectionState) -> Self {
        match zustand {
            ConnectionState::New | ConnectionState::Connecting => Self::Verbindet,
            ConnectionState::Connected => Self::Verbunden,
            ConnectionState::Disconnected => Self::Instabil,
            ConnectionState::Failed | ConnectionState::Closed => Self::Getrennt,
        }
    }
}

/// Lokaler Zustand fuer Beitritts- und Mute-Schaltflaechen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LocalState {
    pub active: bool,
    pub muted: bool,
}

/// Ein Eintrag der Teilnehmerliste
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerListEntry {
    pub id: PeerId,
    pub anzeigename: String,
    pub ist_lokal: bool,
    /// Zustand der Peer-Sitzung, falls eine existiert
    #[serde(skip)]
    pub sitzung: Option<SessionState>,
}

/// Benachrichtigungston
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ton {
    Beitritt,
    Klick,
}

impl Ton {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Beitritt => "join",
            Self::Klick => "click",
        }
    }
}

pub trait UiBridge: Send + Sync + 'static {
    fn on_peer_list_changed(&self, liste: &[PeerListEntry]);

    fn on_speaking_changed(&self, id: &PeerId, spricht: bool);

    fn on_connection_quality_changed(&self, id: &PeerId, qualitaet: ConnectionQuality);

    fn on_local_state_changed(&self, zustand: LocalState);

    fn play_remote_audio(&self, id: &PeerId, stream: RemoteStreamHandle);

    fn stop_remote_audio(&self, id: &PeerId);
}

pub trait Notifier: Send + Sync + 'static {
    fn play_tone(&self, ton: Ton);

    fn show_toast(&self, text: &str);
}

// ---------------------------------------------------------------------------
// TracingUi
// ---------------------------------------------------------------------------

/// Oberflaeche ohne Fenster: schreibt alle Aufrufe ins Log
///
/// Wird von der Konsolen-Demo genutzt.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUi;

impl UiBridge for TracingUi {
    fn on_peer_list_changed(&self, liste: &[PeerListEntry]) {
        let namen: Vec<&str> = liste.iter().map(|e| e.anzeigename.as_str()).collect();
        tracing::info!(teilnehmer = ?namen, "Teilnehmerliste geaendert");
    }

    fn on_speaking_changed(&self, id: &PeerId, spricht: bool) {
        tracing::info!(peer = %id, spricht, "Sprechstatus");
    }

    fn on_connection_quality_changed(&self, id: &PeerId, qualitaet: ConnectionQuality) {
        tracing::info!(peer = %id, ?qualitaet, "Verbindungsqualitaet");
    }

    fn on_local_state_changed(&self, zustand: LocalState) {
        tracing::info!(aktiv = zustand.active, stumm = zustand.muted, "Lokaler Voice-Zustand");
    }

    fn play_remote_audio(&self, id: &PeerId, stream: RemoteStreamHandle) {
        tracing::info!(peer = %id, stream = %stream.stream_id, "Wiedergabe gestartet");
    }

    fn stop_remote_audio(&self, id: &PeerId) {
        tracing::info!(peer = %id, "Wiedergabe beendet");
    }
}

impl Notifier for TracingUi {
    fn play_tone(&self, ton: Ton) {
        tracing::debug!(ton = ton.name(), "Ton abgespielt");
    }

    fn show_toast(&self, text: &str) {
        tracing::info!(text, "Hinweis");
    }
}
