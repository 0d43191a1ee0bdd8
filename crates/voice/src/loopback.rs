//! Loopback-Media-Engine
//!
//! Prozesslokale Nachbildung der Peer-Verbindungen, ohne Netzwerk und ohne
//! Audio. Alle Teilnehmer eines Tests (oder der Konsolen-Demo) teilen sich
//! eine `LoopbackMedia`-Instanz; die Beschreibungen enthalten die
//! Verbindungs-ID, ueber die sich zwei Verbindungen gegenseitig finden.
//!
//! Eine Verbindung meldet `Connected`, sobald beide Seiten ihre lokale und
//! entfernte Beschreibung gesetzt und mindestens einen Kandidaten der
//! Gegenseite erhalten haben.
//!
//! ## Stoerungen
//! - `verzoegerung_setzen`: jede Operation wartet vorher
//! - `fehler_setzen`: ein bestimmter Schritt schlaegt fehl
//! - `stoeren`: meldet einen beliebigen Zustand auf einer Verbindung

use async_trait::async_trait;
use dashmap::DashMap;
use jasus_protocol::{IceCandidate, SessionDescription};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::media::{
    ConnectionEvent, ConnectionEventSink, ConnectionSetup, ConnectionState, MediaConnection,
    MediaEngine, MediaError, MediaResult, RemoteStreamHandle,
};

/// Schritt, der kuenstlich fehlschlagen soll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FehlerSchritt {
    Verbindung,
    Angebot,
    Antwort,
    RemoteBeschreibung,
}

/// Beobachtbarer Zustand einer Loopback-Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackInfo {
    pub id: u64,
    pub spur_id: String,
    pub partner: Option<u64>,
    pub verbunden: bool,
}

// ---------------------------------------------------------------------------
// LoopbackMedia
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LoopbackMedia {
    inner: Arc<LoopbackInner>,
}

struct LoopbackInner {
    /// Offene Verbindungen, indiziert nach ID
    verbindungen: DashMap<u64, Arc<LoopbackConnection>>,
    naechste_id: AtomicU64,
    verzoegerung: Mutex<Option<Duration>>,
    fehler: Mutex<Option<FehlerSchritt>>,
}

impl LoopbackMedia {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(LoopbackInner {
                verbindungen: DashMap::new(),
                naechste_id: AtomicU64::new(1),
                verzoegerung: Mutex::new(None),
                fehler: Mutex::new(None),
            }),
        }
    }

    pub fn verzoegerung_setzen(&self, verzoegerung: Option<Duration>) {
        *self.inner.verzoegerung.lock() = verzoegerung;
    }

    pub fn fehler_setzen(&self, schritt: Option<FehlerSchritt>) {
        *self.inner.fehler.lock() = schritt;
    }

    /// Anzahl noch nicht geschlossener Verbindungen
    pub fn offene_verbindungen(&self) -> usize {
        self.inner.verbindungen.len()
    }

    /// Anzahl bisher erzeugter Verbindungen
    pub fn erzeugt(&self) -> u64 {
        self.inner.naechste_id.load(Ordering::SeqCst) - 1
    }

    pub fn verbindungen(&self) -> Vec<LoopbackInfo> {
        let mut liste: Vec<LoopbackInfo> = self
            .inner
            .verbindungen
            .iter()
            .map(|v| v.info())
            .collect();
        liste.sort_by_key(|i| i.id);
        liste
    }

    /// Meldet einen Plattform-Zustand auf einer Verbindung
    pub fn stoeren(&self, id: u64, zustand: ConnectionState) -> bool {
        let Some(verbindung) = self.inner.verbindungen.get(&id).map(|v| v.clone()) else {
            return false;
        };
        if zustand != ConnectionState::Connected {
            verbindung.verbunden.store(false, Ordering::SeqCst);
        }
        (verbindung.ereignisse)(ConnectionEvent::Zustand(zustand));
        true
    }
}

impl Default for LoopbackMedia {
    fn default() -> Self {
        Self::neu()
    }
}

impl MediaEngine for LoopbackMedia {
    fn create_connection(&self, setup: ConnectionSetup) -> MediaResult<Arc<dyn MediaConnection>> {
        if *self.inner.fehler.lock() == Some(FehlerSchritt::Verbindung) {
            return Err(MediaError::Plattform("Verbindung abgelehnt".into()));
        }

        let id = self.inner.naechste_id.fetch_add(1, Ordering::SeqCst);
        let verbindung = Arc::new(LoopbackConnection {
            id,
            spur_id: setup.lokale_spur.spur_id().to_string(),
            ereignisse: setup.ereignisse,
            zustand: Mutex::new(LoopZustand::default()),
            verbunden: AtomicBool::new(false),
            geschlossen: AtomicBool::new(false),
            engine: Arc::downgrade(&self.inner),
        });
        self.inner.verbindungen.insert(id, verbindung.clone());
        tracing::trace!(verbindung = id, ice = setup.ice_server.len(), "Loopback-Verbindung erzeugt");
        Ok(verbindung)
    }
}

// ---------------------------------------------------------------------------
// LoopbackConnection
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LoopZustand {
    lokal_gesetzt: bool,
    partner: Option<u64>,
    remote_kandidaten: usize,
    kandidaten_gemeldet: bool,
}

pub struct LoopbackConnection {
    id: u64,
    spur_id: String,
    ereignisse: ConnectionEventSink,
    zustand: Mutex<LoopZustand>,
    verbunden: AtomicBool,
    geschlossen: AtomicBool,
    engine: Weak<LoopbackInner>,
}

const SDP_PRAEFIX: &str = "o=loopback ";

fn sdp_erzeugen(id: u64, spur_id: &str) -> String {
    format!("v=0\r\n{SDP_PRAEFIX}{id}\r\na=msid:{spur_id}\r\n")
}

fn partner_aus_sdp(sdp: &str) -> Option<u64> {
    sdp.lines()
        .find_map(|zeile| zeile.strip_prefix(SDP_PRAEFIX))
        .and_then(|id| id.trim().parse().ok())
}

impl LoopbackConnection {
    fn info(&self) -> LoopbackInfo {
        LoopbackInfo {
            id: self.id,
            spur_id: self.spur_id.clone(),
            partner: self.zustand.lock().partner,
            verbunden: self.verbunden.load(Ordering::SeqCst),
        }
    }

    async fn vorbereiten(&self, schritt: Option<FehlerSchritt>) -> MediaResult<()> {
        let (verzoegerung, fehler) = match self.engine.upgrade() {
            Some(engine) => (*engine.verzoegerung.lock(), *engine.fehler.lock()),
            None => (None, None),
        };
        if let Some(dauer) = verzoegerung {
            tokio::time::sleep(dauer).await;
        }
        if self.geschlossen.load(Ordering::SeqCst) {
            return Err(MediaError::Geschlossen);
        }
        if schritt.is_some() && schritt == fehler {
            return Err(MediaError::Plattform(format!("{schritt:?} simuliert fehlgeschlagen")));
        }
        Ok(())
    }

    /// Partner-ID, falls diese Seite bereit fuer Connected ist
    fn bereit_fuer(&self) -> Option<u64> {
        if self.geschlossen.load(Ordering::SeqCst) {
            return None;
        }
        let z = self.zustand.lock();
        if z.lokal_gesetzt && z.remote_kandidaten > 0 {
            z.partner
        } else {
            None
        }
    }

    fn verbindung_pruefen(&self) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let Some(partner_id) = self.bereit_fuer() else {
            return;
        };
        let Some(partner) = engine.verbindungen.get(&partner_id).map(|p| p.clone()) else {
            return;
        };
        if partner.bereit_fuer() != Some(self.id) {
            return;
        }

        for seite in [self, partner.as_ref()] {
            if !seite.verbunden.swap(true, Ordering::SeqCst) {
                (seite.ereignisse)(ConnectionEvent::Zustand(ConnectionState::Connected));
            }
        }
    }
}

#[async_trait]
impl MediaConnection for LoopbackConnection {
    async fn create_offer(&self) -> MediaResult<SessionDescription> {
        self.vorbereiten(Some(FehlerSchritt::Angebot)).await?;
        Ok(SessionDescription::offer(sdp_erzeugen(self.id, &self.spur_id)))
    }

    async fn create_answer(&self) -> MediaResult<SessionDescription> {
        self.vorbereiten(Some(FehlerSchritt::Antwort)).await?;
        if self.zustand.lock().partner.is_none() {
            return Err(MediaError::Beschreibung("Antwort ohne entferntes Angebot".into()));
        }
        Ok(SessionDescription::answer(sdp_erzeugen(self.id, &self.spur_id)))
    }

    async fn set_local_description(&self, _beschreibung: SessionDescription) -> MediaResult<()> {
        self.vorbereiten(None).await?;
        let kandidaten_melden = {
            let mut z = self.zustand.lock();
            z.lokal_gesetzt = true;
            !std::mem::replace(&mut z.kandidaten_gemeldet, true)
        };

        if kandidaten_melden {
            for komponente in 1..=2u64 {
                let kandidat = IceCandidate::neu(format!(
                    "candidate:{} {komponente} udp 2122260223 127.0.0.1 {} typ host",
                    self.id,
                    40_000 + self.id * 10 + komponente
                ));
                (self.ereignisse)(ConnectionEvent::Kandidat(kandidat));
            }
        }
        self.verbindung_pruefen();
        Ok(())
    }

    async fn set_remote_description(&self, beschreibung: SessionDescription) -> MediaResult<()> {
        self.vorbereiten(Some(FehlerSchritt::RemoteBeschreibung)).await?;
        let partner = partner_aus_sdp(&beschreibung.sdp)
            .ok_or_else(|| MediaError::Beschreibung("keine Loopback-Beschreibung".into()))?;
        self.zustand.lock().partner = Some(partner);

        (self.ereignisse)(ConnectionEvent::Zustand(ConnectionState::Connecting));
        (self.ereignisse)(ConnectionEvent::RemoteTrack(RemoteStreamHandle {
            stream_id: format!("loopback-{partner}"),
        }));
        self.verbindung_pruefen();
        Ok(())
    }

    async fn add_ice_candidate(&self, kandidat: IceCandidate) -> MediaResult<()> {
        self.vorbereiten(None).await?;
        if !kandidat.ist_gueltig() {
            return Err(MediaError::Kandidat(kandidat.candidate));
        }
        {
            let mut z = self.zustand.lock();
            if z.partner.is_none() {
                return Err(MediaError::Kandidat("keine entfernte Beschreibung".into()));
            }
            z.remote_kandidaten += 1;
        }
        self.verbindung_pruefen();
        Ok(())
    }

    fn close(&self) {
        if self.geschlossen.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        engine.verbindungen.remove(&self.id);

        // Die Gegenseite bemerkt den Abbruch als Unterbrechung
        let partner = self.zustand.lock().partner;
        if let Some(partner) = partner.and_then(|id| engine.verbindungen.get(&id).map(|p| p.clone()))
        {
            let gekoppelt = partner.zustand.lock().partner == Some(self.id);
            if gekoppelt && partner.verbunden.swap(false, Ordering::SeqCst) {
                (partner.ereignisse)(ConnectionEvent::Zustand(ConnectionState::Disconnected));
            }
        }
        tracing::trace!(verbindung = self.id, "Loopback-Verbindung geschlossen");
    }
}
