//! In-Memory Raum-Log
//!
//! Prozesslokale Implementierung von `SignalingChannel` auf Basis von
//! tokio-Broadcast-Kanaelen, ein Kanal pro Raum. Dient der lokalen Demo
//! und den Mesh-Tests.
//!
//! ## Stoerungen
//! Fuer Tests kann das Log jede Nachricht doppelt zustellen
//! (`mit_duplikaten`), um die At-least-once-Semantik realer Transporte
//! nachzustellen. Laeuft ein Abonnent hinterher, verliert er Nachrichten
//! (`Lagged`) – das entspricht einem Transportausfall.
//!
//! `schliessen` beendet das Log eines Raums: laufende Abonnements enden,
//! weitere Aufrufe liefern `SignalingError::Geschlossen`.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use jasus_core::RoomCode;
use jasus_protocol::SignalingMessage;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::channel::{SignalStream, SignalingChannel};
use crate::error::{SignalingError, SignalingResult};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Puffergroesse des Broadcast-Kanals pro Raum
const RAUM_KANAL_GROESSE: usize = 1024;

// ---------------------------------------------------------------------------
// InMemorySignaling
// ---------------------------------------------------------------------------

/// Prozesslokales Signal-Log fuer beliebig viele Raeume
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct InMemorySignaling {
    inner: Arc<InMemoryInner>,
}

struct InMemoryInner {
    /// Broadcast-Sender, indiziert nach Raumcode
    raeume: DashMap<RoomCode, broadcast::Sender<SignalingMessage>>,
    /// Vollstaendiger Verlauf pro Raum (nur zur Inspektion)
    verlauf: DashMap<RoomCode, Vec<SignalingMessage>>,
    /// Geschlossene Raeume
    geschlossen: DashMap<RoomCode, ()>,
    /// Jede Nachricht doppelt zustellen
    duplikate: Mutex<bool>,
}

impl InMemorySignaling {
    /// Erstellt ein neues leeres Log
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(InMemoryInner {
                raeume: DashMap::new(),
                verlauf: DashMap::new(),
                geschlossen: DashMap::new(),
                duplikate: Mutex::new(false),
            }),
        }
    }

    /// Erstellt ein Log, das jede Nachricht zweimal zustellt
    pub fn mit_duplikaten() -> Self {
        let log = Self::neu();
        log.duplikate_setzen(true);
        log
    }

    /// Schaltet die doppelte Zustellung um
    pub fn duplikate_setzen(&self, aktiv: bool) {
        *self.inner.duplikate.lock() = aktiv;
    }

    /// Gibt alle bisher angehaengten Nachrichten eines Raums zurueck
    pub fn verlauf(&self, raum: &RoomCode) -> Vec<SignalingMessage> {
        self.inner
            .verlauf
            .get(raum)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Anzahl der aktuellen Abonnenten eines Raums
    pub fn abonnenten(&self, raum: &RoomCode) -> usize {
        self.inner
            .raeume
            .get(raum)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Schliesst das Log eines Raums endgueltig
    ///
    /// Abonnenten erhalten das Ende ihres Stroms, sobald alle bereits
    /// zugestellten Nachrichten gelesen sind.
    pub fn schliessen(&self, raum: &RoomCode) {
        self.inner.geschlossen.insert(raum.clone(), ());
        if self.inner.raeume.remove(raum).is_some() {
            tracing::debug!(raum = %raum, "Raum-Log geschlossen");
        }
    }

    fn raum_sender(&self, raum: &RoomCode) -> SignalingResult<broadcast::Sender<SignalingMessage>> {
        if self.inner.geschlossen.contains_key(raum) {
            return Err(SignalingError::Geschlossen);
        }
        Ok(self.inner
            .raeume
            .entry(raum.clone())
            .or_insert_with(|| broadcast::channel(RAUM_KANAL_GROESSE).0)
            .clone())
    }
}

impl Default for InMemorySignaling {
    fn default() -> Self {
        Self::neu()
    }
}

#[async_trait]
impl SignalingChannel for InMemorySignaling {
    async fn append(&self, raum: &RoomCode, nachricht: SignalingMessage) -> SignalingResult<()> {
        let tx = self.raum_sender(raum)?;
        self.inner
            .verlauf
            .entry(raum.clone())
            .or_default()
            .push(nachricht.clone());

        let kopien = if *self.inner.duplikate.lock() { 2 } else { 1 };
        for _ in 0..kopien {
            // Ohne Abonnenten geht die Nachricht verloren (kein Replay)
            if tx.send(nachricht.clone()).is_err() {
                tracing::trace!(raum = %raum, "Keine Abonnenten – Nachricht verworfen");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, raum: &RoomCode) -> SignalingResult<SignalStream> {
        let rx = self.raum_sender(raum)?.subscribe();
        let raum_log = raum.clone();
        tracing::debug!(raum = %raum, "Raum-Log abonniert");

        let strom = futures_util::stream::unfold(rx, move |mut rx| {
            let raum = raum_log.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(nachricht) => return Some((nachricht, rx)),
                        Err(broadcast::error::RecvError::Lagged(verloren)) => {
                            tracing::warn!(raum = %raum, verloren, "Abonnent zu langsam – Nachrichten verloren");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(strom.boxed())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
