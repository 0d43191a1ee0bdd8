//! Voice Activity Detection (VAD)
//!
//! Energie-basierte Erkennung auf den Analyse-Frames des Mikrofons
//! (128 Frequenz-Bins, Werte normalisiert auf 0.0..1.0). Die
//! Durchschnittsenergie wird mit einer festen Schwelle verglichen;
//! gemeldet wird nur das Ueberschreiten der Schwelle in eine Richtung,
//! nicht jeder einzelne Frame.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Konfiguration fuer die VAD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Schwelle der Durchschnittsenergie (normalisiert, 0.0..1.0)
    pub energie_schwelle: f32,
    /// Anzahl Werte pro Analyse-Frame
    pub frame_groesse: usize,
    /// Abtastintervall (ungefaehr Bildwiederholrate)
    #[serde(with = "jasus_core::dauer")]
    pub intervall: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            // Byte-Spektrum > 20 von 255
            energie_schwelle: 20.0 / 255.0,
            frame_groesse: 128,
            intervall: Duration::from_millis(16),
        }
    }
}

/// Sprachdetektor mit Schwellwert-Vergleich
pub struct SprachDetektor {
    config: VadConfig,
    spricht: bool,
}

impl SprachDetektor {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            spricht: false,
        }
    }

    /// Analysiert einen Frame und gibt nur bei einem Wechsel den neuen
    /// Zustand zurueck
    pub fn detect(&mut self, energie: &[f32]) -> Option<bool> {
        let aktiv = durchschnittliche_energie(energie) > self.config.energie_schwelle;
        if aktiv == self.spricht {
            return None;
        }
        self.spricht = aktiv;
        Some(aktiv)
    }
}

/// Berechnet die Durchschnittsenergie eines Frames
pub fn durchschnittliche_energie(energie: &[f32]) -> f32 {
    if energie.is_empty() {
        return 0.0;
    }
    energie.iter().sum::<f32>() / energie.len() as f32
}
