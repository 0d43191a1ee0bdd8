//! Konfiguration der Voice-Session
//!
//! Alle Werte haben sinnvolle Standardwerte; fehlende Felder in der
//! Konfigurationsdatei werden ueber `#[serde(default)]` aufgefuellt.

use jasus_audio::{AudioConstraints, VadConfig};
use jasus_signaling::STALENESS_FENSTER_MS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// STUN/TURN-Endpunkte fuer die Verbindungs-Erkennung
    pub ice_server: Vec<String>,
    /// Maximales Alter einer Signalnachricht
    pub staleness_ms: i64,
    /// Wie lange `disconnected`/`failed` toleriert wird, bevor die Sitzung
    /// als fehlgeschlagen gilt
    #[serde(with = "jasus_core::dauer")]
    pub gnadenfrist: Duration,
    /// Maximale Dauer einer Verhandlung bis Connected
    #[serde(with = "jasus_core::dauer")]
    pub verhandlungs_timeout: Duration,
    /// Takt der Sitzungsueberwachung
    #[serde(with = "jasus_core::dauer")]
    pub watchdog_intervall: Duration,
    pub audio: AudioConstraints,
    pub vad: VadConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            ice_server: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
            staleness_ms: STALENESS_FENSTER_MS,
            gnadenfrist: Duration::from_secs(5),
            verhandlungs_timeout: Duration::from_secs(20),
            watchdog_intervall: Duration::from_secs(1),
            audio: AudioConstraints::default(),
            vad: VadConfig::default(),
        }
    }
}
