//! Fehlertypen fuer das Signal-Log

use thiserror::Error;

/// Fehlertyp fuer das Signal-Log
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Das Log des Raums wurde geschlossen
    #[error("Raum-Log geschlossen")]
    Geschlossen,
}

/// Result-Typ fuer das Signal-Log
pub type SignalingResult<T> = Result<T, SignalingError>;
