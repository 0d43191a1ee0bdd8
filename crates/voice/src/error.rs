//! Fehlertypen der Voice-Session

use jasus_audio::AudioError;
use thiserror::Error;

use crate::media::MediaError;

#[derive(Debug, Error)]
pub enum VoiceError {
    /// Mikrofon verweigert oder nicht vorhanden (blockierende Meldung beim Beitritt)
    #[error("Mikrofon nicht verfuegbar: {0}")]
    MediaUnavailable(#[from] AudioError),

    /// Angebot/Antwort konnte nicht erstellt oder angewendet werden
    #[error("Verhandlung fehlgeschlagen: {0}")]
    Negotiation(#[from] MediaError),

    #[error("Voice-Chat ist nicht aktiv")]
    NichtAktiv,

    #[error("Beitritt laeuft bereits")]
    BeitrittLaeuft,

    /// Beitritt wurde durch `leave()` abgebrochen
    #[error("Beitritt abgebrochen")]
    Abgebrochen,

    #[error("Voice-Session wurde beendet")]
    Beendet,

    #[error("Signalisierung fehlgeschlagen: {0}")]
    Signaling(#[from] jasus_signaling::SignalingError),
}

impl VoiceError {
    /// Meldung fuer den Benutzer, falls der Fehler angezeigt werden soll
    pub fn nutzer_meldung(&self) -> String {
        match self {
            Self::MediaUnavailable(audio) => audio.nutzer_meldung(),
            andere => format!("Fehler im Voice-Chat: {andere}"),
        }
    }
}

pub type VoiceResult<T> = Result<T, VoiceError>;
