//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! lauffaehig ist.

use jasus_core::JasusError;
use jasus_observability::{log_format_gueltig, log_level_gueltig};
use jasus_voice::VoiceConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Lokaler Spieler
    pub spieler: SpielerEinstellungen,
    /// Raum, dessen Signal-Log benutzt wird
    pub raum: RaumEinstellungen,
    /// Voice-Session (Zeitlimits, ICE-Server, VAD)
    pub voice: VoiceConfig,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Lokale Mesh-Demo
    pub demo: DemoEinstellungen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpielerEinstellungen {
    /// Stabile Spieler-ID (leer = zufaellig beim Start)
    pub id: String,
    pub anzeigename: String,
}

impl Default for SpielerEinstellungen {
    fn default() -> Self {
        Self {
            id: String::new(),
            anzeigename: "Spieler".into(),
        }
    }
}

impl SpielerEinstellungen {
    /// Konfigurierte ID oder eine neue zufaellige
    pub fn id_oder_zufall(&self) -> String {
        if self.id.trim().is_empty() {
            format!("spieler-{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id.trim().to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaumEinstellungen {
    pub code: String,
}

impl Default for RaumEinstellungen {
    fn default() -> Self {
        Self {
            code: "lobby".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Einstellungen der Konsolen-Demo
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoEinstellungen {
    /// Anzahl Teilnehmer inklusive des lokalen Spielers
    pub teilnehmer: usize,
    /// Wie lange das Mesh nach dem Aufbau laufen soll
    pub dauer_sekunden: u64,
    /// Der lokale Spieler "spricht" waehrend der Demo
    pub sprechen: bool,
}

impl Default for DemoEinstellungen {
    fn default() -> Self {
        Self {
            teilnehmer: 3,
            dauer_sekunden: 5,
            sprechen: true,
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> jasus_core::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            return Err(JasusError::konfiguration(format!(
                "Unbekanntes Log-Level '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(JasusError::konfiguration(format!(
                "Unbekanntes Log-Format '{}'",
                self.logging.format
            )));
        }
        if self.raum.code.trim().is_empty() {
            return Err(JasusError::konfiguration("Raumcode darf nicht leer sein"));
        }
        if self.voice.staleness_ms <= 0 {
            return Err(JasusError::konfiguration("staleness_ms muss positiv sein"));
        }
        if self.voice.watchdog_intervall.is_zero() {
            return Err(JasusError::konfiguration(
                "watchdog_intervall muss groesser als 0 sein",
            ));
        }
        if self.demo.teilnehmer == 0 {
            return Err(JasusError::konfiguration(
                "Demo braucht mindestens einen Teilnehmer",
            ));
        }
        Ok(())
    }
}
