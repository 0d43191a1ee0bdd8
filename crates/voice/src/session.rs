//! PeerSession – Verbindung zu genau einem entfernten Teilnehmer
//!
//! Zustandsautomat:
//! ```text
//! Idle -> Offering | Answering -> Connecting -> Connected -> Closed
//!   \___________________\______________\___________\-> Failed -> Closed
//! ```
//! `Closed` ist endgueltig, eine geschlossene Sitzung wird nie wieder
//! verwendet. Jede neue Verhandlung mit demselben Peer bekommt eine neue
//! Sitzung mit neuer `SessionId`.
//!
//! ## Operations-Spur
//! Alle Media-Operationen einer Sitzung (Angebot, Antwort, Kandidaten)
//! laufen der Reihe nach auf einem eigenen Task. Dadurch wird ein Kandidat
//! nie vor der entfernten Beschreibung angewendet, zu der er gehoert, und
//! der Koordinator blockiert nie auf die Plattform. Ergebnisse gehen ueber
//! den `melden`-Callback zurueck an den Koordinator. Nach dem Schliessen
//! wird die Spur abgebrochen und meldet nichts mehr.

use jasus_core::PeerId;
use jasus_protocol::{IceCandidate, NegotiationId, SessionDescription};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bridge::{ConnectionQuality, UiBridge};
use crate::media::{ConnectionState, MediaConnection, MediaError, MediaResult, RemoteStreamHandle};

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Generation einer Sitzung; Ereignisse alter Generationen werden ignoriert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sitzung#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Offering,
    Answering,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl SessionState {
    /// `Failed` oder `Closed`
    pub fn ist_beendet(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    /// Prueft ob der Uebergang erlaubt ist
    pub fn darf_wechseln(self, ziel: SessionState) -> bool {
        use SessionState::*;
        match (self, ziel) {
            (Idle, Offering | Answering) => true,
            (Offering | Answering, Connecting) => true,
            (Connecting, Connected) => true,
            (Failed, Closed) => true,
            (von, Failed | Closed) => !von.ist_beendet(),
            _ => false,
        }
    }
}

/// Rolle der lokalen Seite in dieser Verhandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rolle {
    Initiator,
    Antwortender,
}

/// Warum eine Sitzung aufgegeben wurde
#[derive(Debug)]
pub enum Fehlergrund {
    /// Angebot/Antwort konnte nicht erstellt oder angewendet werden
    Verhandlung {
        schritt: &'static str,
        fehler: MediaError,
    },
    /// Verbindung laenger als die Gnadenfrist gestoert
    Verbindung,
    /// Connected nicht innerhalb des Verhandlungs-Timeouts erreicht
    Zeitueberschreitung,
    /// Plattform hat die Verbindung geschlossen
    Geschlossen,
}

impl Fehlergrund {
    /// Kurzname fuer Logs und Metrik-Labels
    pub fn label(&self) -> &'static str {
        match self {
            Self::Verhandlung { .. } => "verhandlung",
            Self::Verbindung => "verbindung",
            Self::Zeitueberschreitung => "zeitueberschreitung",
            Self::Geschlossen => "geschlossen",
        }
    }
}

impl fmt::Display for Fehlergrund {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verhandlung { schritt, fehler } => write!(f, "{schritt}: {fehler}"),
            Self::Verbindung => write!(f, "Verbindung gestoert"),
            Self::Zeitueberschreitung => write!(f, "Verhandlung zu langsam"),
            Self::Geschlossen => write!(f, "Verbindung geschlossen"),
        }
    }
}

/// Auftrag an die Operations-Spur
#[derive(Debug)]
pub enum MediaOp {
    AngebotErstellen,
    AngebotBeantworten { angebot: SessionDescription },
    AntwortAnwenden { antwort: SessionDescription },
    KandidatHinzufuegen { kandidat: IceCandidate },
}

/// Ergebnis einer abgeschlossenen Operation
#[derive(Debug)]
pub enum OpErgebnis {
    /// Lokale Beschreibung erstellt und gesetzt, bereit zum Versand
    BeschreibungBereit(SessionDescription),
    AntwortAngewendet,
    KandidatAngewendet(MediaResult<()>),
    Fehlgeschlagen {
        schritt: &'static str,
        fehler: MediaError,
    },
}

/// Folgen einer Zustandsmeldung der Plattform
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ZustandsFolge {
    pub qualitaet: Option<ConnectionQuality>,
    pub verbunden: bool,
    pub geschlossen: bool,
}

// ---------------------------------------------------------------------------
// PeerSession
// ---------------------------------------------------------------------------

pub struct PeerSession {
    id: SessionId,
    remote_id: PeerId,
    zustand: SessionState,
    rolle: Rolle,
    verhandlung: NegotiationId,
    verbindung: Arc<dyn MediaConnection>,
    lane: mpsc::UnboundedSender<MediaOp>,
    lane_abbruch: CancellationToken,
    qualitaet: Option<ConnectionQuality>,
    /// Entfernte Beschreibung steht in der Spur (Kandidaten duerfen folgen)
    remote_eingereiht: bool,
    /// Eigene Beschreibung wurde versendet
    beschreibung_gesendet: bool,
    zurueckgehaltene_kandidaten: Vec<IceCandidate>,
    offene_kandidaten: usize,
    verbunden_vorgemerkt: bool,
    remote_stream: Option<RemoteStreamHandle>,
    wiedergabe_aktiv: bool,
    erstellt: Instant,
    gestoert_seit: Option<Instant>,
}

impl PeerSession {
    /// Erstellt die Sitzung im Zustand `Idle` und startet die Operations-Spur
    pub fn neu<F>(
        id: SessionId,
        remote_id: PeerId,
        rolle: Rolle,
        verhandlung: NegotiationId,
        verbindung: Arc<dyn MediaConnection>,
        melden: F,
    ) -> Self
    where
        F: Fn(OpErgebnis) + Send + 'static,
    {
        let lane_abbruch = CancellationToken::new();
        let lane = lane_starten(verbindung.clone(), lane_abbruch.clone(), melden);

        Self {
            id,
            remote_id,
            zustand: SessionState::Idle,
            rolle,
            verhandlung,
            verbindung,
            lane,
            lane_abbruch,
            qualitaet: None,
            remote_eingereiht: false,
            beschreibung_gesendet: false,
            zurueckgehaltene_kandidaten: Vec::new(),
            offene_kandidaten: 0,
            verbunden_vorgemerkt: false,
            remote_stream: None,
            wiedergabe_aktiv: false,
            erstellt: Instant::now(),
            gestoert_seit: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn remote_id(&self) -> &PeerId {
        &self.remote_id
    }

    pub fn zustand(&self) -> SessionState {
        self.zustand
    }

    pub fn rolle(&self) -> Rolle {
        self.rolle
    }

    pub fn verhandlung(&self) -> NegotiationId {
        self.verhandlung
    }

    pub fn qualitaet(&self) -> Option<ConnectionQuality> {
        self.qualitaet
    }

    pub fn erstellt(&self) -> Instant {
        self.erstellt
    }

    /// Wartet die Sitzung noch auf eine Antwort auf das eigene Angebot?
    pub fn wartet_auf_antwort(&self) -> bool {
        self.zustand == SessionState::Offering && !self.remote_eingereiht
    }

    fn uebergang(&mut self, ziel: SessionState) -> bool {
        if !self.zustand.darf_wechseln(ziel) {
            tracing::trace!(peer = %self.remote_id, sitzung = %self.id, von = ?self.zustand, nach = ?ziel, "Uebergang ignoriert");
            return false;
        }
        tracing::debug!(peer = %self.remote_id, sitzung = %self.id, von = ?self.zustand, nach = ?ziel, "Sitzungszustand");
        self.zustand = ziel;
        true
    }

    fn einreihen(&self, op: MediaOp) {
        if self.lane.send(op).is_err() {
            tracing::trace!(peer = %self.remote_id, sitzung = %self.id, "Operations-Spur beendet");
        }
    }

    // -----------------------------------------------------------------------
    // Verhandlung
    // -----------------------------------------------------------------------

    /// Initiator: Angebot erstellen (`Idle -> Offering`)
    pub fn angebot_starten(&mut self) -> bool {
        if !self.uebergang(SessionState::Offering) {
            return false;
        }
        self.einreihen(MediaOp::AngebotErstellen);
        true
    }

    /// Antwortender: Angebot anwenden und Antwort erstellen (`Idle -> Answering`)
    pub fn angebot_beantworten(&mut self, angebot: SessionDescription) -> bool {
        if !self.uebergang(SessionState::Answering) {
            return false;
        }
        self.remote_eingereiht = true;
        self.einreihen(MediaOp::AngebotBeantworten { angebot });
        true
    }

    /// Initiator: Antwort anwenden (`Offering -> Connecting`)
    pub fn antwort_anwenden(&mut self, antwort: SessionDescription) -> bool {
        if self.zustand != SessionState::Offering || self.remote_eingereiht {
            return false;
        }
        self.remote_eingereiht = true;
        self.einreihen(MediaOp::AntwortAnwenden { antwort });
        self.uebergang(SessionState::Connecting)
    }

    /// Darf ein eingehender Kandidat dieser Verhandlung direkt angewendet werden?
    pub fn nimmt_kandidaten_an(&self, verhandlung: NegotiationId) -> bool {
        self.verhandlung == verhandlung && self.remote_eingereiht && !self.zustand.ist_beendet()
    }

    /// Reiht einen entfernten Kandidaten hinter die entfernte Beschreibung ein
    pub fn kandidat_einreihen(&mut self, kandidat: IceCandidate) {
        self.offene_kandidaten += 1;
        self.einreihen(MediaOp::KandidatHinzufuegen { kandidat });
    }

    /// Eine Kandidaten-Operation ist abgeschlossen
    ///
    /// Gibt `true` zurueck wenn die Sitzung dadurch `Connected` erreicht.
    pub fn kandidat_abgeschlossen(&mut self) -> bool {
        self.offene_kandidaten = self.offene_kandidaten.saturating_sub(1);
        self.verbunden_pruefen()
    }

    /// Die eigene Beschreibung wurde versendet
    ///
    /// Der Antwortende wechselt nach `Connecting`. Zurueckgegeben werden die
    /// bis dahin zurueckgehaltenen lokalen Kandidaten in Reihenfolge.
    pub fn beschreibung_versendet(&mut self) -> Vec<IceCandidate> {
        self.beschreibung_gesendet = true;
        if self.zustand == SessionState::Answering {
            self.uebergang(SessionState::Connecting);
        }
        std::mem::take(&mut self.zurueckgehaltene_kandidaten)
    }

    /// Lokaler Kandidat der Plattform
    ///
    /// Vor dem Versand der eigenen Beschreibung wird er zurueckgehalten,
    /// danach kommt er direkt zurueck und kann gesendet werden.
    pub fn lokaler_kandidat(&mut self, kandidat: IceCandidate) -> Option<IceCandidate> {
        if self.beschreibung_gesendet {
            Some(kandidat)
        } else {
            self.zurueckgehaltene_kandidaten.push(kandidat);
            None
        }
    }

    // -----------------------------------------------------------------------
    // Plattform-Ereignisse
    // -----------------------------------------------------------------------

    /// Verarbeitet eine Zustandsmeldung der Plattform
    pub fn verbindungszustand(&mut self, zustand: ConnectionState, jetzt: Instant) -> ZustandsFolge {
        let mut folge = ZustandsFolge::default();
        if self.zustand.ist_beendet() {
            return folge;
        }

        let qualitaet = ConnectionQuality::aus_zustand(zustand);
        if self.qualitaet != Some(qualitaet) {
            self.qualitaet = Some(qualitaet);
            folge.qualitaet = Some(qualitaet);
        }

        match zustand {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.gestoert_seit.get_or_insert(jetzt);
            }
            ConnectionState::Closed => folge.geschlossen = true,
            ConnectionState::Connected => {
                self.gestoert_seit = None;
                self.verbunden_vorgemerkt = true;
                folge.verbunden = self.verbunden_pruefen();
            }
            ConnectionState::New | ConnectionState::Connecting => self.gestoert_seit = None,
        }
        folge
    }

    /// Wechselt nach `Connected`, sobald die Plattform verbunden meldet und
    /// alle eingereihten Kandidaten angewendet sind
    pub fn verbunden_pruefen(&mut self) -> bool {
        self.verbunden_vorgemerkt
            && self.offene_kandidaten == 0
            && self.zustand == SessionState::Connecting
            && self.uebergang(SessionState::Connected)
    }

    /// Merkt sich den entfernten Audiostrom
    ///
    /// Ist die Sitzung bereits verbunden, wird der Strom zum Abspielen
    /// zurueckgegeben.
    pub fn remote_track(&mut self, stream: RemoteStreamHandle) -> Option<RemoteStreamHandle> {
        self.remote_stream = Some(stream);
        self.wiedergabe_starten()
    }

    /// Gibt den Strom einmalig zur Wiedergabe frei (nur in `Connected`)
    pub fn wiedergabe_starten(&mut self) -> Option<RemoteStreamHandle> {
        if self.zustand != SessionState::Connected || self.wiedergabe_aktiv {
            return None;
        }
        let stream = self.remote_stream.clone()?;
        self.wiedergabe_aktiv = true;
        Some(stream)
    }

    /// Prueft Gnadenfrist und Verhandlungs-Timeout
    pub fn ueberwachen(
        &self,
        jetzt: Instant,
        gnadenfrist: Duration,
        timeout: Duration,
    ) -> Option<Fehlergrund> {
        if self.zustand.ist_beendet() {
            return None;
        }
        if let Some(seit) = self.gestoert_seit {
            if jetzt.saturating_duration_since(seit) >= gnadenfrist {
                return Some(Fehlergrund::Verbindung);
            }
        }
        if self.zustand != SessionState::Connected
            && jetzt.saturating_duration_since(self.erstellt) >= timeout
        {
            return Some(Fehlergrund::Zeitueberschreitung);
        }
        None
    }

    // -----------------------------------------------------------------------
    // Ende
    // -----------------------------------------------------------------------

    pub fn fehlschlagen(&mut self) -> bool {
        self.uebergang(SessionState::Failed)
    }

    /// Gibt Verbindung, Operations-Spur und Wiedergabe frei
    ///
    /// Wirkt genau einmal, egal ueber welchen Weg die Sitzung endet.
    pub fn schliessen(&mut self, ui: &dyn UiBridge) -> bool {
        if !self.uebergang(SessionState::Closed) {
            return false;
        }
        self.lane_abbruch.cancel();
        self.verbindung.close();
        if self.wiedergabe_aktiv {
            self.wiedergabe_aktiv = false;
            ui.stop_remote_audio(&self.remote_id);
        }
        self.zurueckgehaltene_kandidaten.clear();
        true
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        if self.zustand != SessionState::Closed {
            self.lane_abbruch.cancel();
            self.verbindung.close();
        }
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("remote_id", &self.remote_id)
            .field("zustand", &self.zustand)
            .field("rolle", &self.rolle)
            .field("verhandlung", &self.verhandlung)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Operations-Spur
// ---------------------------------------------------------------------------

fn lane_starten<F>(
    verbindung: Arc<dyn MediaConnection>,
    abbruch: CancellationToken,
    melden: F,
) -> mpsc::UnboundedSender<MediaOp>
where
    F: Fn(OpErgebnis) + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<MediaOp>();

    tokio::spawn(async move {
        loop {
            let op = tokio::select! {
                biased;
                _ = abbruch.cancelled() => break,
                op = rx.recv() => match op {
                    Some(op) => op,
                    None => break,
                },
            };

            let ergebnis = tokio::select! {
                biased;
                _ = abbruch.cancelled() => break,
                ergebnis = ausfuehren(verbindung.as_ref(), op) => ergebnis,
            };

            // Nach dem Schliessen ist jede Meldung ein No-op
            if abbruch.is_cancelled() {
                break;
            }
            melden(ergebnis);
        }
    });

    tx
}

async fn ausfuehren(verbindung: &dyn MediaConnection, op: MediaOp) -> OpErgebnis {
    match op {
        MediaOp::AngebotErstellen => {
            let erstellt = match verbindung.create_offer().await {
                Ok(b) => b,
                Err(fehler) => return fehlgeschlagen("angebot_erstellen", fehler),
            };
            match verbindung.set_local_description(erstellt.clone()).await {
                Ok(()) => OpErgebnis::BeschreibungBereit(erstellt),
                Err(fehler) => fehlgeschlagen("lokale_beschreibung", fehler),
            }
        }
        MediaOp::AngebotBeantworten { angebot } => {
            if let Err(fehler) = verbindung.set_remote_description(angebot).await {
                return fehlgeschlagen("angebot_anwenden", fehler);
            }
            let antwort = match verbindung.create_answer().await {
                Ok(b) => b,
                Err(fehler) => return fehlgeschlagen("antwort_erstellen", fehler),
            };
            match verbindung.set_local_description(antwort.clone()).await {
                Ok(()) => OpErgebnis::BeschreibungBereit(antwort),
                Err(fehler) => fehlgeschlagen("lokale_beschreibung", fehler),
            }
        }
        MediaOp::AntwortAnwenden { antwort } => {
            match verbindung.set_remote_description(antwort).await {
                Ok(()) => OpErgebnis::AntwortAngewendet,
                Err(fehler) => fehlgeschlagen("antwort_anwenden", fehler),
            }
        }
        MediaOp::KandidatHinzufuegen { kandidat } => {
            OpErgebnis::KandidatAngewendet(verbindung.add_ice_candidate(kandidat).await)
        }
    }
}

fn fehlgeschlagen(schritt: &'static str, fehler: MediaError) -> OpErgebnis {
    OpErgebnis::Fehlgeschlagen { schritt, fehler }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
