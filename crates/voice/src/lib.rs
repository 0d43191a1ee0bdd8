//! jasus-voice – Peer-Mesh Voice-Session
//!
//! Jeder Teilnehmer eines Raums haelt eine direkte Peer-Verbindung zu jedem
//! anderen aktiven Teilnehmer. Ausgehandelt wird ueber das Signal-Log des
//! Raums (`jasus-signaling`), ohne zentralen Server.
//!
//! ## Module
//! - [`coordinator`] – Single-Writer-Task mit dem gesamten Mesh-Zustand
//! - [`session`] – Lebenszyklus einer Peer-Verbindung
//! - [`buffer`] – Puffer fuer verfruehte Netzwerk-Kandidaten
//! - [`media`] – Abstraktion der Peer-Verbindungs-Plattform
//! - [`loopback`] – Prozesslokale Plattform fuer Tests und Demo
//! - [`bridge`] – Ausgehende Aufrufe an die Oberflaeche
//! - [`config`] – Zeitlimits, ICE-Server, VAD-Parameter

pub mod bridge;
pub mod buffer;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod loopback;
pub mod media;
pub mod session;

pub use bridge::{ConnectionQuality, LocalState, Notifier, PeerListEntry, Ton, TracingUi, UiBridge};
pub use buffer::CandidateBuffer;
pub use config::VoiceConfig;
pub use coordinator::{
    LokalerTeilnehmer, MeshCollaborators, MeshCoordinator, MeshHandle, MeshSnapshot,
    SessionSnapshot,
};
pub use error::{VoiceError, VoiceResult};
pub use loopback::{FehlerSchritt, LoopbackMedia};
pub use media::{
    ConnectionEvent, ConnectionSetup, ConnectionState, MediaConnection, MediaEngine, MediaError,
    RemoteStreamHandle,
};
pub use session::{PeerSession, SessionId, SessionState};
