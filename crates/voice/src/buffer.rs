//! CandidateBuffer – Zwischenspeicher fuer verfruehte Netzwerk-Kandidaten
//!
//! Kandidaten koennen vor dem Angebot bzw. der Antwort ankommen, zu der sie
//! gehoeren (absenderuebergreifend ungeordnete Zustellung, Glare). Sie
//! werden pro Peer und Verhandlung gepuffert und genau einmal entnommen,
//! sobald die passende entfernte Beschreibung angewendet wird.
//!
//! Der Puffer gehoert exklusiv dem Koordinator und braucht keine Sperren.

use jasus_core::PeerId;
use jasus_protocol::{IceCandidate, NegotiationId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Gepuffert {
    verhandlung: NegotiationId,
    kandidat: IceCandidate,
    empfangen_ms: i64,
}

#[derive(Debug, Default)]
pub struct CandidateBuffer {
    eintraege: HashMap<PeerId, Vec<Gepuffert>>,
}

impl CandidateBuffer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haengt einen Kandidaten an (Reihenfolge bleibt erhalten)
    pub fn puffern(
        &mut self,
        peer: &PeerId,
        verhandlung: NegotiationId,
        kandidat: IceCandidate,
        empfangen_ms: i64,
    ) {
        self.eintraege
            .entry(peer.clone())
            .or_default()
            .push(Gepuffert {
                verhandlung,
                kandidat,
                empfangen_ms,
            });
    }

    /// Entnimmt alle Kandidaten einer Verhandlung in Empfangsreihenfolge
    ///
    /// Kandidaten anderer Verhandlungen desselben Peers bleiben liegen.
    pub fn entnehmen(&mut self, peer: &PeerId, verhandlung: NegotiationId) -> Vec<IceCandidate> {
        let Some(liste) = self.eintraege.get_mut(peer) else {
            return Vec::new();
        };

        let (passend, rest): (Vec<_>, Vec<_>) = liste
            .drain(..)
            .partition(|g| g.verhandlung == verhandlung);
        *liste = rest;
        if liste.is_empty() {
            self.eintraege.remove(peer);
        }

        passend.into_iter().map(|g| g.kandidat).collect()
    }

    /// Verwirft alle Kandidaten eines Peers (Left, Sitzungsende)
    pub fn verwerfen(&mut self, peer: &PeerId) -> usize {
        self.eintraege.remove(peer).map(|l| l.len()).unwrap_or(0)
    }

    /// Entfernt Kandidaten, die aelter als das Fenster sind
    pub fn bereinigen(&mut self, jetzt_ms: i64, fenster_ms: i64) -> usize {
        let mut entfernt = 0;
        self.eintraege.retain(|_, liste| {
            let vorher = liste.len();
            liste.retain(|g| jetzt_ms - g.empfangen_ms <= fenster_ms);
            entfernt += vorher - liste.len();
            !liste.is_empty()
        });
        entfernt
    }

    pub fn leeren(&mut self) {
        self.eintraege.clear();
    }

    /// Anzahl gepufferter Kandidaten eines Peers
    pub fn anzahl(&self, peer: &PeerId) -> usize {
        self.eintraege.get(peer).map(|l| l.len()).unwrap_or(0)
    }

    pub fn gesamt(&self) -> usize {
        self.eintraege.values().map(Vec::len).sum()
    }
}
