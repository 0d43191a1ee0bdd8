//! Echtzeit-Media-Primitive der Plattform
//!
//! Abstraktion ueber die Peer-Verbindung der Plattform (Angebot/Antwort,
//! Netzwerk-Kandidaten, Verbindungszustand, entfernte Audiospur).
//! Benachrichtigungen der Plattform laufen ueber eine `ConnectionEventSink`,
//! die der Koordinator beim Erzeugen der Verbindung uebergibt.

use async_trait::async_trait;
use jasus_audio::LocalAudioHandle;
use jasus_protocol::{IceCandidate, SessionDescription};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Beschreibung ungueltig: {0}")]
    Beschreibung(String),

    #[error("Kandidat abgelehnt: {0}")]
    Kandidat(String),

    #[error("Verbindung ist geschlossen")]
    Geschlossen,

    #[error("Plattformfehler: {0}")]
    Plattform(String),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Verbindungszustand, wie ihn die Plattform meldet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Opaker Handle auf den entfernten Audiostrom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStreamHandle {
    pub stream_id: String,
}

/// Benachrichtigung einer Peer-Verbindung
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Lokal ermittelter Netzwerk-Kandidat
    Kandidat(IceCandidate),
    Zustand(ConnectionState),
    RemoteTrack(RemoteStreamHandle),
}

pub type ConnectionEventSink = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Parameter fuer eine neue Peer-Verbindung
pub struct ConnectionSetup {
    pub ice_server: Vec<String>,
    /// Ausgehende Spur (geteilt mit allen anderen Verbindungen)
    pub lokale_spur: Arc<dyn LocalAudioHandle>,
    pub ereignisse: ConnectionEventSink,
}

/// Erzeugt Peer-Verbindungen
pub trait MediaEngine: Send + Sync + 'static {
    fn create_connection(&self, setup: ConnectionSetup) -> MediaResult<Arc<dyn MediaConnection>>;
}

/// Eine einzelne Peer-Verbindung
#[async_trait]
pub trait MediaConnection: Send + Sync + 'static {
    async fn create_offer(&self) -> MediaResult<SessionDescription>;

    async fn create_answer(&self) -> MediaResult<SessionDescription>;

    async fn set_local_description(&self, beschreibung: SessionDescription) -> MediaResult<()>;

    async fn set_remote_description(&self, beschreibung: SessionDescription) -> MediaResult<()>;

    async fn add_ice_candidate(&self, kandidat: IceCandidate) -> MediaResult<()>;

    /// Gibt alle Ressourcen frei; weitere Operationen schlagen fehl
    fn close(&self);
}
