//! Mikrofon-Faehigkeit der Plattform
//!
//! Das Mikrofon ist eine exklusiv besessene Ressource der lokalen
//! Voice-Session. Alle Peer-Verbindungen teilen sich die ausgehende Spur
//! nur lesend; Mute schaltet genau ein gemeinsames Enabled-Flag um.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AudioResult;

/// Aufnahme-Constraints beim Anfordern des Mikrofons
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Nur Audio – Video wird nie angefordert
    pub video: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            video: false,
        }
    }
}

/// Handle auf die lokale Audiospur
pub trait LocalAudioHandle: Send + Sync + 'static {
    /// Kennung der Spur (wird an Peer-Verbindungen angehaengt)
    fn spur_id(&self) -> &str;

    /// Schaltet die ausgehende Spur ein/aus, ohne Verbindungen anzufassen
    fn set_enabled(&self, aktiv: bool);

    fn is_enabled(&self) -> bool;

    /// Liest die normalisierten Energiewerte (0.0..1.0) des aktuellen
    /// Analyse-Frames und gibt die Anzahl geschriebener Werte zurueck
    fn energie_lesen(&self, puffer: &mut [f32]) -> usize;

    /// Gibt das Geraet frei; weitere Aufrufe sind wirkungslos
    fn release(&self);
}

/// Plattformseitiger Mikrofonzugriff
#[async_trait]
pub trait Microphone: Send + Sync + 'static {
    /// Fordert das Mikrofon an
    ///
    /// Schlaegt mit `ZugriffVerweigert` oder `KeinEingabegeraet` fehl, wenn
    /// die Plattform den Zugriff ablehnt oder kein Geraet vorhanden ist.
    async fn acquire(&self, constraints: &AudioConstraints)
        -> AudioResult<Arc<dyn LocalAudioHandle>>;
}
