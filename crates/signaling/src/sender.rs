//! SignalSender – geordneter Versand an das Raum-Log
//!
//! Der Koordinator darf beim Senden nie blockieren, die Nachrichten eines
//! Absenders muessen aber in Sendereihenfolge im Log landen. Der Sender
//! legt deshalb alle Nachrichten in eine Queue, die ein einzelner Task
//! nacheinander an `SignalingChannel::append` uebergibt.
//!
//! Fehler beim Anhaengen werden nur geloggt (fire-and-forget): das Protokoll
//! heilt verlorene Nachrichten selbst.

use jasus_core::{Clock, PeerId, RoomCode};
use jasus_protocol::{SignalPayload, SignalingMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::SignalingChannel;

/// Handle zum Senden von Signalnachrichten eines lokalen Teilnehmers
#[derive(Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<SignalingMessage>,
    absender: PeerId,
    anzeigename: Arc<str>,
    uhr: Arc<dyn Clock>,
}

impl SignalSender {
    /// Startet den Versand-Task fuer einen Raum
    ///
    /// Der Task endet, sobald alle Handles gedroppt wurden und die Queue
    /// geleert ist.
    pub fn starten(
        kanal: Arc<dyn SignalingChannel>,
        raum: RoomCode,
        absender: PeerId,
        anzeigename: impl Into<String>,
        uhr: Arc<dyn Clock>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<SignalingMessage>();

        let task = tokio::spawn(async move {
            while let Some(nachricht) = rx.recv().await {
                let art = nachricht.kind();
                if let Err(e) = kanal.append(&raum, nachricht).await {
                    tracing::warn!(raum = %raum, art = %art, fehler = %e, "Signal konnte nicht angehaengt werden");
                }
            }
            tracing::debug!(raum = %raum, "Signal-Versand beendet");
        });

        let sender = Self {
            tx,
            absender,
            anzeigename: Arc::from(anzeigename.into()),
            uhr,
        };
        (sender, task)
    }

    /// Baut den Umschlag (Absender, Zeitstempel) und reiht die Nachricht ein
    ///
    /// Gibt `false` zurueck wenn der Versand-Task nicht mehr laeuft.
    pub fn senden(&self, payload: SignalPayload) -> bool {
        let nachricht = SignalingMessage::neu(
            self.absender.clone(),
            self.anzeigename.as_ref(),
            self.uhr.jetzt_millis(),
            payload,
        );
        tracing::trace!(art = %nachricht.kind(), "Signal eingereiht");
        self.tx.send(nachricht).is_ok()
    }
}
