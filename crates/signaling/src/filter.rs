//! Eingangsfilter fuer Signalnachrichten
//!
//! Verworfen werden, bevor der Koordinator sie sieht:
//! - eigene Nachrichten (das Log stellt auch an den Absender zu)
//! - Nachrichten, die aelter als das Staleness-Fenster sind
//! - Offer/Answer/Candidate, die an einen anderen Teilnehmer gerichtet sind
//!
//! Verworfene Nachrichten sind kein Fehler, sondern der Normalfall bei
//! mindestens-einmaliger, absenderuebergreifend ungeordneter Zustellung.

use jasus_core::{Clock, PeerId};
use jasus_protocol::SignalingMessage;
use std::sync::Arc;

/// Maximales Alter einer Signalnachricht in Millisekunden
pub const STALENESS_FENSTER_MS: i64 = 30_000;

/// Grund fuer das Verwerfen einer Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verworfen {
    /// Vom lokalen Teilnehmer selbst gesendet
    EigeneNachricht,
    /// Aelter als das Staleness-Fenster
    Veraltet { alter_ms: i64 },
    /// An einen anderen Teilnehmer adressiert
    AnAndere,
}

impl Verworfen {
    /// Kurzname fuer Logs und Metrik-Labels
    pub fn grund(&self) -> &'static str {
        match self {
            Self::EigeneNachricht => "eigene",
            Self::Veraltet { .. } => "veraltet",
            Self::AnAndere => "an_andere",
        }
    }
}

/// Prueft eingehende Nachrichten gegen lokale ID und Wanduhr
pub struct EingangsFilter {
    lokal: PeerId,
    fenster_ms: i64,
    uhr: Arc<dyn Clock>,
}

impl EingangsFilter {
    /// Erstellt einen Filter mit dem Standard-Fenster von 30 s
    pub fn neu(lokal: PeerId, uhr: Arc<dyn Clock>) -> Self {
        Self::mit_fenster(lokal, STALENESS_FENSTER_MS, uhr)
    }

    pub fn mit_fenster(lokal: PeerId, fenster_ms: i64, uhr: Arc<dyn Clock>) -> Self {
        Self {
            lokal,
            fenster_ms,
            uhr,
        }
    }

    /// Gibt `Ok(())` zurueck wenn die Nachricht verarbeitet werden soll
    pub fn pruefen(&self, nachricht: &SignalingMessage) -> Result<(), Verworfen> {
        if nachricht.sender_id == self.lokal {
            return Err(Verworfen::EigeneNachricht);
        }

        let alter_ms = nachricht.alter_millis(self.uhr.jetzt_millis());
        if alter_ms > self.fenster_ms {
            return Err(Verworfen::Veraltet { alter_ms });
        }

        if !nachricht.betrifft(&self.lokal) {
            return Err(Verworfen::AnAndere);
        }

        Ok(())
    }

    /// Aktuelle Wanduhrzeit des Filters
    pub fn jetzt_millis(&self) -> i64 {
        self.uhr.jetzt_millis()
    }
}
