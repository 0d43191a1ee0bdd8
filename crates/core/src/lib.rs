//! jasus-core – Gemeinsame Typen, Uhr und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! Jasus-Crates gemeinsam genutzt werden: Teilnehmer- und Raum-IDs,
//! die Wanduhr fuer Signal-Zeitstempel und den zentralen Fehler-Enum.

pub mod clock;
pub mod dauer;
pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{JasusError, Result};
pub use types::{PeerId, RoomCode};
