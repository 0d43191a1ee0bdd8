//! Fehlertypen fuer das lokale Mikrofon

use thiserror::Error;

/// Alle Gruende, warum das Mikrofon nicht verfuegbar ist
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Zugriff auf das Mikrofon verweigert")]
    ZugriffVerweigert,

    #[error("Kein Eingabegeraet verfuegbar")]
    KeinEingabegeraet,

    #[error("Geraetefehler: {0}")]
    GeraetFehler(String),
}

impl AudioError {
    /// Meldung fuer den Benutzer (blockierender Dialog beim Beitritt)
    pub fn nutzer_meldung(&self) -> String {
        match self {
            Self::ZugriffVerweigert => {
                "Bitte erlaube den Zugriff auf das Mikrofon, um den Voice-Chat zu nutzen".into()
            }
            andere => format!("Fehler im Voice-Chat: {andere}"),
        }
    }
}

pub type AudioResult<T> = Result<T, AudioError>;
