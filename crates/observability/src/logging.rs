//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `JASUS_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard: info
//! - `JASUS_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Die Umgebung hat Vorrang vor den Werten aus der Konfigurationsdatei.

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "JASUS_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "JASUS_LOG_FORMAT";

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Unbekannte Werte fallen auf `Text` zurueck
    pub fn parsen(wert: &str) -> Self {
        match wert {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Aufgeloeste Logging-Einstellungen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEinstellungen {
    pub level: String,
    pub format: LogFormat,
}

impl LogEinstellungen {
    /// Loest Level und Format auf: Umgebung vor Konfiguration
    pub fn aufloesen(
        level: &str,
        format: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let level = env(ENV_LOG_LEVEL)
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| level.to_string());
        let format = env(ENV_LOG_FORMAT).unwrap_or_else(|| format.to_string());
        Self {
            level,
            format: LogFormat::parsen(&format),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// Liest `JASUS_LOG_LEVEL` und `JASUS_LOG_FORMAT` aus der Umgebung und
/// faellt auf die uebergebenen Werte zurueck. Ein ungueltiger Filter wird
/// durch `info` ersetzt. Ein zweiter Aufruf (z.B. aus Tests) ist wirkungslos.
pub fn logging_initialisieren(level: &str, format: &str) {
    let einstellungen = LogEinstellungen::aufloesen(level, format, |name| std::env::var(name).ok());

    let filter =
        EnvFilter::try_new(&einstellungen.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let ergebnis = match einstellungen.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_ok() {
        tracing::debug!(level = %einstellungen.level, format = ?einstellungen.format, "Logging initialisiert");
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
