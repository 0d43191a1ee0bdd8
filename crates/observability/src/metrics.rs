//! Prometheus-kompatible Metriken fuer das Voice-Mesh
//!
//! Registrierte Metriken:
//! - `jasus_signale_empfangen_total` – Counter: Verarbeitete Signale (art)
//! - `jasus_signale_verworfen_total` – Counter: Verworfene Signale (grund)
//! - `jasus_signale_gesendet_total` – Counter: Gesendete Signale (art)
//! - `jasus_sitzungen_aktiv` – Gauge: Nicht geschlossene Peer-Sitzungen
//! - `jasus_verbindungen_hergestellt_total` – Counter: Uebergaenge nach Connected
//! - `jasus_verbindungsaufbau_sekunden` – Histogram: Dauer bis Connected
//! - `jasus_sitzungen_fehlgeschlagen_total` – Counter: Fehlgeschlagene Sitzungen (grund)
//! - `jasus_wiederanlaeufe_total` – Counter: Erneute Joined-Echos nach Fehlern

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Mesh-Metriken eines Clients
#[derive(Clone)]
pub struct MeshMetrics {
    pub registry: Arc<Registry>,

    // Signal-Metriken
    pub signale_empfangen: IntCounterVec,
    pub signale_verworfen: IntCounterVec,
    pub signale_gesendet: IntCounterVec,

    // Sitzungs-Metriken
    pub sitzungen_aktiv: IntGauge,
    pub verbindungen_hergestellt: IntCounter,
    pub verbindungsaufbau_sekunden: Histogram,
    pub sitzungen_fehlgeschlagen: IntCounterVec,
    pub wiederanlaeufe: IntCounter,
}

impl MeshMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Signal-Metriken ---
        let signale_empfangen = IntCounterVec::new(
            Opts::new(
                "jasus_signale_empfangen_total",
                "Anzahl verarbeiteter Signalnachrichten",
            ),
            &["art"],
        )?;
        registry.register(Box::new(signale_empfangen.clone()))?;

        let signale_verworfen = IntCounterVec::new(
            Opts::new(
                "jasus_signale_verworfen_total",
                "Anzahl verworfener Signalnachrichten",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(signale_verworfen.clone()))?;

        let signale_gesendet = IntCounterVec::new(
            Opts::new(
                "jasus_signale_gesendet_total",
                "Anzahl gesendeter Signalnachrichten",
            ),
            &["art"],
        )?;
        registry.register(Box::new(signale_gesendet.clone()))?;

        // --- Sitzungs-Metriken ---
        let sitzungen_aktiv = IntGauge::with_opts(Opts::new(
            "jasus_sitzungen_aktiv",
            "Anzahl nicht geschlossener Peer-Sitzungen",
        ))?;
        registry.register(Box::new(sitzungen_aktiv.clone()))?;

        let verbindungen_hergestellt = IntCounter::with_opts(Opts::new(
            "jasus_verbindungen_hergestellt_total",
            "Anzahl Sitzungen, die Connected erreicht haben",
        ))?;
        registry.register(Box::new(verbindungen_hergestellt.clone()))?;

        let verbindungsaufbau_sekunden = Histogram::with_opts(
            HistogramOpts::new(
                "jasus_verbindungsaufbau_sekunden",
                "Dauer von der Sitzungserstellung bis Connected in Sekunden",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(verbindungsaufbau_sekunden.clone()))?;

        let sitzungen_fehlgeschlagen = IntCounterVec::new(
            Opts::new(
                "jasus_sitzungen_fehlgeschlagen_total",
                "Anzahl fehlgeschlagener Peer-Sitzungen",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(sitzungen_fehlgeschlagen.clone()))?;

        let wiederanlaeufe = IntCounter::with_opts(Opts::new(
            "jasus_wiederanlaeufe_total",
            "Anzahl erneut gesendeter Joined-Echos nach Verbindungsfehlern",
        ))?;
        registry.register(Box::new(wiederanlaeufe.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            signale_empfangen,
            signale_verworfen,
            signale_gesendet,
            sitzungen_aktiv,
            verbindungen_hergestellt,
            verbindungsaufbau_sekunden,
            sitzungen_fehlgeschlagen,
            wiederanlaeufe,
        })
    }

    pub fn signal_empfangen(&self, art: &str) {
        self.signale_empfangen.with_label_values(&[art]).inc();
    }

    pub fn signal_verworfen(&self, grund: &str) {
        self.signale_verworfen.with_label_values(&[grund]).inc();
    }

    pub fn signal_gesendet(&self, art: &str) {
        self.signale_gesendet.with_label_values(&[art]).inc();
    }

    pub fn sitzung_fehlgeschlagen(&self, grund: &str) {
        self.sitzungen_fehlgeschlagen.with_label_values(&[grund]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
