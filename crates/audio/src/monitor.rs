//! VoiceActivityMonitor – periodische Sprachaktivitaetserkennung
//!
//! Tastet die Energie der lokalen Spur im festen Intervall ab und meldet nur
//! Wechsel zwischen "spricht" und "spricht nicht". Der Task lebt solange
//! das `CancellationToken` der aktiven Voice-Session nicht ausgeloest ist.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::microphone::LocalAudioHandle;
use crate::vad::{SprachDetektor, VadConfig};

/// Startet und beschreibt den Abtast-Task
pub struct VoiceActivityMonitor;

impl VoiceActivityMonitor {
    /// Startet die Abtastung
    ///
    /// `melden` wird bei jedem Wechsel mit dem neuen Zustand aufgerufen.
    /// Eine deaktivierte (stummgeschaltete) Spur zaehlt als Stille.
    pub fn starten<F>(
        handle: Arc<dyn LocalAudioHandle>,
        config: VadConfig,
        abbruch: CancellationToken,
        melden: F,
    ) -> JoinHandle<()>
    where
        F: Fn(bool) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(config.intervall);
            takt.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut frame = vec![0.0f32; config.frame_groesse];
            let mut detektor = SprachDetektor::new(config);

            tracing::debug!(spur = handle.spur_id(), "Sprachaktivitaets-Monitor gestartet");

            loop {
                tokio::select! {
                    biased;
                    _ = abbruch.cancelled() => break,
                    _ = takt.tick() => {}
                }

                let gelesen = if handle.is_enabled() {
                    handle.energie_lesen(&mut frame)
                } else {
                    0
                };

                if let Some(spricht) = detektor.detect(&frame[..gelesen.min(frame.len())]) {
                    tracing::trace!(spricht, "Sprachaktivitaet gewechselt");
                    melden(spricht);
                }
            }

            tracing::debug!(spur = handle.spur_id(), "Sprachaktivitaets-Monitor beendet");
        })
    }
}
