//! Lokale Mesh-Demo
//!
//! Startet mehrere Teilnehmer in einem Prozess: gemeinsames
//! `InMemorySignaling`-Log, gemeinsame `LoopbackMedia`, je ein simuliertes
//! Mikrofon. Die Oberflaeche ist `TracingUi`, alle Aufrufe landen im Log.

use anyhow::Context;
use jasus_audio::SimulatedMicrophone;
use jasus_core::{Clock, PeerId, RoomCode, SystemClock};
use jasus_observability::MeshMetrics;
use jasus_signaling::InMemorySignaling;
use jasus_voice::{
    LokalerTeilnehmer, LoopbackMedia, MeshCollaborators, MeshCoordinator, MeshHandle,
    TracingUi,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ClientConfig;

const ABFRAGE_INTERVALL: Duration = Duration::from_millis(50);

/// Ergebnis eines Demo-Laufs
#[derive(Debug, Clone)]
pub struct DemoBericht {
    /// Verbundene Peers pro Teilnehmer, gemessen vor dem Verlassen
    pub verbindungen: Vec<(PeerId, Vec<PeerId>)>,
    /// Ob alle Teilnehmer vollstaendig vermascht waren
    pub vollstaendig: bool,
    /// Prometheus-Textexport aller Teilnehmer
    pub metriken: String,
}

struct DemoTeilnehmer {
    handle: MeshHandle,
    task: JoinHandle<()>,
    mikrofon: Arc<SimulatedMicrophone>,
}

/// Fuehrt die Demo mit der Uhr des Systems aus
pub async fn demo_ausfuehren(config: &ClientConfig) -> anyhow::Result<DemoBericht> {
    demo_ausfuehren_mit(config, Arc::new(SystemClock)).await
}

pub async fn demo_ausfuehren_mit(
    config: &ClientConfig,
    uhr: Arc<dyn Clock>,
) -> anyhow::Result<DemoBericht> {
    let signal = InMemorySignaling::neu();
    let medien = LoopbackMedia::neu();
    let metriken = Arc::new(MeshMetrics::neu().context("Metriken konnten nicht registriert werden")?);
    let raum = RoomCode::neu(config.raum.code.trim());
    let ui = Arc::new(TracingUi);

    let mut teilnehmer = Vec::with_capacity(config.demo.teilnehmer);
    for nr in 0..config.demo.teilnehmer {
        let lokal = if nr == 0 {
            LokalerTeilnehmer::neu(config.spieler.id_oder_zufall(), config.spieler.anzeigename.clone())
        } else {
            LokalerTeilnehmer::neu(format!("bot-{nr}"), format!("Bot {nr}"))
        };
        let mikrofon = Arc::new(SimulatedMicrophone::neu());
        let mit = MeshCollaborators {
            signaling: Arc::new(signal.clone()),
            mikrofon: mikrofon.clone(),
            medien: Arc::new(medien.clone()),
            ui: ui.clone(),
            notifier: ui.clone(),
            uhr: uhr.clone(),
            metriken: metriken.clone(),
        };
        let (handle, task) = MeshCoordinator::starten(lokal, raum.clone(), config.voice.clone(), mit)
            .await
            .context("Koordinator konnte nicht gestartet werden")?;
        teilnehmer.push(DemoTeilnehmer {
            handle,
            task,
            mikrofon,
        });
    }

    tracing::info!(raum = %raum, teilnehmer = teilnehmer.len(), "Demo startet");
    for t in &teilnehmer {
        t.handle
            .join()
            .await
            .with_context(|| format!("{} konnte nicht beitreten", t.handle.lokale_id()))?;
    }

    let erwartet = teilnehmer.len().saturating_sub(1);
    let vollstaendig = vermascht_warten(&teilnehmer, erwartet, config.voice.verhandlungs_timeout).await?;
    if !vollstaendig {
        tracing::warn!("Mesh nicht vollstaendig aufgebaut");
    }

    let dauer = Duration::from_secs(config.demo.dauer_sekunden);
    let sprecher = teilnehmer
        .first()
        .and_then(|t| t.mikrofon.letzter_handle())
        .filter(|_| config.demo.sprechen);
    if let Some(spur) = &sprecher {
        spur.pegel_setzen(0.5);
    }
    tokio::time::sleep(dauer / 2).await;
    if let Some(spur) = &sprecher {
        spur.pegel_setzen(0.0);
    }
    tokio::time::sleep(dauer / 2).await;

    let mut verbindungen = Vec::with_capacity(teilnehmer.len());
    for t in &teilnehmer {
        let snapshot = t.handle.snapshot().await?;
        verbindungen.push((t.handle.lokale_id().clone(), snapshot.verbundene_peers()));
    }

    for t in teilnehmer {
        t.handle.beenden().await?;
        t.task.await.context("Koordinator-Task abgebrochen")?;
    }
    tracing::info!(offen = medien.offene_verbindungen(), "Demo beendet");

    Ok(DemoBericht {
        verbindungen,
        vollstaendig,
        metriken: metriken.exportieren()?,
    })
}

/// Wartet bis jeder Teilnehmer mit allen anderen verbunden ist
async fn vermascht_warten(
    teilnehmer: &[DemoTeilnehmer],
    erwartet: usize,
    timeout: Duration,
) -> anyhow::Result<bool> {
    let ende = Instant::now() + timeout;
    loop {
        let mut fertig = true;
        for t in teilnehmer {
            if t.handle.snapshot().await?.verbundene_peers().len() < erwartet {
                fertig = false;
                break;
            }
        }
        if fertig {
            return Ok(true);
        }
        if Instant::now() >= ende {
            return Ok(false);
        }
        tokio::time::sleep(ABFRAGE_INTERVALL).await;
    }
}
