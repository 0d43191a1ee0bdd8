//! jasus-protocol – Signalnachrichten fuer das Voice-Mesh
//!
//! Dieses Crate definiert den Datensatz, der ueber das Signal-Log eines
//! Raums ausgetauscht wird, sowie die Sitzungsbeschreibungen und
//! Netzwerk-Kandidaten, die darin transportiert werden.

pub mod session;
pub mod signal;

pub use session::{IceCandidate, NegotiationId, SdpKind, SessionDescription};
pub use signal::{SignalKind, SignalPayload, SignalingMessage};
