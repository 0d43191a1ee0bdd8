//! El Jasus Voice-Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und fuehrt die lokale
//! Mesh-Demo aus.

use anyhow::Result;
use jasus_client::{demo_ausfuehren, ClientConfig};
use jasus_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("JASUS_CONFIG").unwrap_or_else(|_| "jasus.toml".into());

    let config = ClientConfig::laden(&config_pfad)?;
    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        raum = %config.raum.code,
        "El Jasus Voice-Client wird initialisiert"
    );

    let bericht = demo_ausfuehren(&config).await?;
    for (peer, verbunden) in &bericht.verbindungen {
        tracing::info!(peer = %peer, verbunden = verbunden.len(), "Mesh-Status");
    }
    if !bericht.vollstaendig {
        tracing::warn!("Nicht alle Teilnehmer waren verbunden");
    }

    println!("{}", bericht.metriken);
    Ok(())
}
