//! MeshCoordinator – Voice-Session eines Raums
//!
//! Ein einzelner Task besitzt den gesamten Mesh-Zustand (Peer-Sitzungen,
//! Kandidaten-Puffer, Teilnehmerliste, Sprechstatus). Er verarbeitet
//! nacheinander:
//! - lokale Aktionen ueber den `MeshHandle` (join, leave, mute, snapshot)
//! - eingehende Signalnachrichten aus dem Raum-Log
//! - interne Ereignisse (Mikrofon, Sprachaktivitaet, Plattform-Meldungen,
//!   abgeschlossene Media-Operationen)
//! - den Takt der Sitzungsueberwachung
//!
//! Keine zwei Verarbeitungsschritte ueberlappen sich. Langlaufende Arbeit
//! (Mikrofon anfordern, Angebote/Antworten) laeuft ausserhalb und kommt
//! als Ereignis zurueck. Ereignisse einer Sitzung tragen deren `SessionId`;
//! gehoert die ID nicht mehr zur aktuellen Sitzung des Peers, ist das
//! Ereignis ein No-op.

use futures_util::StreamExt;
use jasus_audio::{AudioResult, LocalAudioHandle, Microphone, VoiceActivityMonitor};
use jasus_core::{Clock, PeerId, RoomCode};
use jasus_observability::MeshMetrics;
use jasus_protocol::{IceCandidate, NegotiationId, SdpKind, SessionDescription, SignalPayload, SignalingMessage};
use jasus_signaling::{EingangsFilter, SignalSender, SignalStream, SignalingChannel, Verworfen};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bridge::{ConnectionQuality, LocalState, Notifier, PeerListEntry, Ton, UiBridge};
use crate::buffer::CandidateBuffer;
use crate::config::VoiceConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::media::{ConnectionEvent, ConnectionEventSink, ConnectionSetup, MediaEngine};
use crate::session::{Fehlergrund, OpErgebnis, PeerSession, Rolle, SessionId, SessionState};

// ---------------------------------------------------------------------------
// Oeffentliche Typen
// ---------------------------------------------------------------------------

/// Plattform-Faehigkeiten, die der Koordinator benutzt
#[derive(Clone)]
pub struct MeshCollaborators {
    pub signaling: Arc<dyn SignalingChannel>,
    pub mikrofon: Arc<dyn Microphone>,
    pub medien: Arc<dyn MediaEngine>,
    pub ui: Arc<dyn UiBridge>,
    pub notifier: Arc<dyn Notifier>,
    pub uhr: Arc<dyn Clock>,
    pub metriken: Arc<MeshMetrics>,
}

/// Identitaet des lokalen Teilnehmers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LokalerTeilnehmer {
    pub id: PeerId,
    pub anzeigename: String,
}

impl LokalerTeilnehmer {
    pub fn neu(id: impl Into<String>, anzeigename: impl Into<String>) -> Self {
        Self {
            id: PeerId::neu(id),
            anzeigename: anzeigename.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub peer: PeerId,
    pub sitzung: SessionId,
    pub zustand: SessionState,
    pub rolle: Rolle,
    pub qualitaet: Option<ConnectionQuality>,
}

/// Nur-Lese-Kopie des Mesh-Zustands
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSnapshot {
    pub lokal: LocalState,
    pub beitritt_laeuft: bool,
    pub teilnehmer: Vec<PeerListEntry>,
    pub sitzungen: Vec<SessionSnapshot>,
    pub sprechend: BTreeMap<PeerId, bool>,
    pub gepufferte_kandidaten: usize,
}

impl MeshSnapshot {
    pub fn sitzung(&self, peer: &PeerId) -> Option<&SessionSnapshot> {
        self.sitzungen.iter().find(|s| &s.peer == peer)
    }

    /// Peers mit Sitzung im Zustand `Connected`, sortiert
    pub fn verbundene_peers(&self) -> Vec<PeerId> {
        self.sitzungen
            .iter()
            .filter(|s| s.zustand == SessionState::Connected)
            .map(|s| s.peer.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// MeshHandle
// ---------------------------------------------------------------------------

enum Befehl {
    Beitreten(oneshot::Sender<VoiceResult<()>>),
    Verlassen(oneshot::Sender<VoiceResult<()>>),
    StummUmschalten(oneshot::Sender<VoiceResult<bool>>),
    Snapshot(oneshot::Sender<MeshSnapshot>),
    Beenden(oneshot::Sender<()>),
}

/// Clonebarer Zugriff auf den Koordinator-Task
#[derive(Clone)]
pub struct MeshHandle {
    befehle: mpsc::UnboundedSender<Befehl>,
    lokal: PeerId,
}

impl MeshHandle {
    /// Tritt dem Voice-Chat bei
    ///
    /// Kehrt erst zurueck, wenn das Mikrofon zugeteilt und `Joined` gesendet
    /// wurde. Ist der Chat bereits aktiv, passiert nichts.
    pub async fn join(&self) -> VoiceResult<()> {
        self.anfragen(Befehl::Beitreten).await?
    }

    /// Verlaesst den Voice-Chat
    ///
    /// Nach der Rueckkehr sind alle Sitzungen geschlossen und das Mikrofon
    /// freigegeben. Ein laufender Beitritt wird abgebrochen.
    pub async fn leave(&self) -> VoiceResult<()> {
        self.anfragen(Befehl::Verlassen).await?
    }

    /// Schaltet das Mikrofon stumm bzw. wieder ein; liefert den neuen Zustand
    pub async fn toggle_mute(&self) -> VoiceResult<bool> {
        self.anfragen(Befehl::StummUmschalten).await?
    }

    pub async fn snapshot(&self) -> VoiceResult<MeshSnapshot> {
        self.anfragen(Befehl::Snapshot).await
    }

    /// Verlaesst den Chat und beendet den Koordinator-Task
    pub async fn beenden(&self) -> VoiceResult<()> {
        self.anfragen(Befehl::Beenden).await
    }

    pub fn lokale_id(&self) -> &PeerId {
        &self.lokal
    }

    async fn anfragen<T>(&self, befehl: impl FnOnce(oneshot::Sender<T>) -> Befehl) -> VoiceResult<T> {
        let (tx, rx) = oneshot::channel();
        self.befehle
            .send(befehl(tx))
            .map_err(|_| VoiceError::Beendet)?;
        rx.await.map_err(|_| VoiceError::Beendet)
    }
}

// ---------------------------------------------------------------------------
// Interne Ereignisse
// ---------------------------------------------------------------------------

enum Ereignis {
    Mikrofon {
        versuch: u64,
        ergebnis: AudioResult<Arc<dyn LocalAudioHandle>>,
    },
    Sprache {
        versuch: u64,
        spricht: bool,
    },
    Verbindung {
        peer: PeerId,
        sitzung: SessionId,
        ereignis: ConnectionEvent,
    },
    Operation {
        peer: PeerId,
        sitzung: SessionId,
        ergebnis: OpErgebnis,
    },
}

struct AusstehenderBeitritt {
    versuch: u64,
    antwort: oneshot::Sender<VoiceResult<()>>,
}

// ---------------------------------------------------------------------------
// MeshCoordinator
// ---------------------------------------------------------------------------

pub struct MeshCoordinator {
    lokal: LokalerTeilnehmer,
    config: VoiceConfig,

    mikrofon: Arc<dyn Microphone>,
    medien: Arc<dyn MediaEngine>,
    ui: Arc<dyn UiBridge>,
    notifier: Arc<dyn Notifier>,
    metriken: Arc<MeshMetrics>,

    filter: EingangsFilter,
    sender: SignalSender,
    intern_tx: mpsc::UnboundedSender<Ereignis>,

    // Lokaler Zustand
    aktiv: bool,
    stumm: bool,
    spur: Option<Arc<dyn LocalAudioHandle>>,
    beitritt: Option<AusstehenderBeitritt>,
    versuch: u64,
    vad_abbruch: Option<CancellationToken>,

    // Mesh-Zustand
    sitzungen: HashMap<PeerId, PeerSession>,
    naechste_sitzung: u64,
    puffer: CandidateBuffer,
    /// Entfernte Teilnehmer mit Anzeigenamen
    roster: BTreeMap<PeerId, String>,
    sprechend: BTreeMap<PeerId, bool>,
    /// Peers, fuer die seit dem letzten Connected bereits ein Joined-Echo lief
    wiederanlaeufe: HashSet<PeerId>,
    letzte_liste: Vec<PeerListEntry>,
}

impl MeshCoordinator {
    /// Abonniert das Raum-Log und startet den Koordinator-Task
    ///
    /// Das Abonnement beginnt sofort, damit Teilnehmerliste und Sprechstatus
    /// schon vor `join()` gepflegt werden.
    pub async fn starten(
        lokal: LokalerTeilnehmer,
        raum: RoomCode,
        config: VoiceConfig,
        mit: MeshCollaborators,
    ) -> VoiceResult<(MeshHandle, JoinHandle<()>)> {
        let strom = mit.signaling.subscribe(&raum).await?;

        let (sender, sende_task) = SignalSender::starten(
            mit.signaling.clone(),
            raum.clone(),
            lokal.id.clone(),
            lokal.anzeigename.clone(),
            mit.uhr.clone(),
        );
        let filter = EingangsFilter::mit_fenster(lokal.id.clone(), config.staleness_ms, mit.uhr.clone());

        let (befehle_tx, befehle_rx) = mpsc::unbounded_channel();
        let (intern_tx, intern_rx) = mpsc::unbounded_channel();

        let handle = MeshHandle {
            befehle: befehle_tx,
            lokal: lokal.id.clone(),
        };

        let span = tracing::info_span!("mesh", raum = %raum, lokal = %lokal.id);
        let koordinator = Self {
            lokal,
            config,
            mikrofon: mit.mikrofon,
            medien: mit.medien,
            ui: mit.ui,
            notifier: mit.notifier,
            metriken: mit.metriken,
            filter,
            sender,
            intern_tx,
            aktiv: false,
            stumm: false,
            spur: None,
            beitritt: None,
            versuch: 0,
            vad_abbruch: None,
            sitzungen: HashMap::new(),
            naechste_sitzung: 0,
            puffer: CandidateBuffer::neu(),
            roster: BTreeMap::new(),
            sprechend: BTreeMap::new(),
            wiederanlaeufe: HashSet::new(),
            letzte_liste: Vec::new(),
        };

        let task = tokio::spawn(
            koordinator
                .laufen(befehle_rx, intern_rx, strom, sende_task)
                .instrument(span),
        );
        Ok((handle, task))
    }

    async fn laufen(
        mut self,
        mut befehle: mpsc::UnboundedReceiver<Befehl>,
        mut intern: mpsc::UnboundedReceiver<Ereignis>,
        mut strom: SignalStream,
        sende_task: JoinHandle<()>,
    ) {
        let mut takt = tokio::time::interval(self.config.watchdog_intervall);
        takt.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut strom_offen = true;

        tracing::info!("Mesh-Koordinator gestartet");

        loop {
            tokio::select! {
                biased;
                befehl = befehle.recv() => match befehl {
                    Some(befehl) => {
                        if !self.befehl(befehl) {
                            break;
                        }
                    }
                    None => {
                        // Alle Handles gedroppt
                        self.verlassen_intern();
                        break;
                    }
                },
                Some(ereignis) = intern.recv() => self.ereignis(ereignis),
                nachricht = strom.next(), if strom_offen => match nachricht {
                    Some(nachricht) => self.nachricht(nachricht),
                    None => {
                        tracing::warn!("Raum-Log beendet, keine weiteren Signale");
                        strom_offen = false;
                    }
                },
                _ = takt.tick() => self.watchdog(),
            }
        }

        // Sender droppen, damit der Versand-Task die Queue (Left) leert und endet
        drop(self);
        if sende_task.await.is_err() {
            tracing::warn!("Signal-Versand-Task abgebrochen");
        }
        tracing::info!("Mesh-Koordinator beendet");
    }

    // -----------------------------------------------------------------------
    // Lokale Aktionen
    // -----------------------------------------------------------------------

    /// Gibt `false` zurueck wenn der Koordinator enden soll
    fn befehl(&mut self, befehl: Befehl) -> bool {
        match befehl {
            Befehl::Beitreten(antwort) => self.beitreten(antwort),
            Befehl::Verlassen(antwort) => {
                self.verlassen_intern();
                let _ = antwort.send(Ok(()));
            }
            Befehl::StummUmschalten(antwort) => {
                let _ = antwort.send(self.stumm_umschalten());
            }
            Befehl::Snapshot(antwort) => {
                let _ = antwort.send(self.snapshot());
            }
            Befehl::Beenden(antwort) => {
                self.verlassen_intern();
                let _ = antwort.send(());
                return false;
            }
        }
        true
    }

    fn beitreten(&mut self, antwort: oneshot::Sender<VoiceResult<()>>) {
        if self.aktiv {
            let _ = antwort.send(Ok(()));
            return;
        }
        if self.beitritt.is_some() {
            let _ = antwort.send(Err(VoiceError::BeitrittLaeuft));
            return;
        }

        self.versuch += 1;
        let versuch = self.versuch;
        self.beitritt = Some(AusstehenderBeitritt { versuch, antwort });

        let mikrofon = self.mikrofon.clone();
        let constraints = self.config.audio.clone();
        let tx = self.intern_tx.clone();
        tokio::spawn(async move {
            let ergebnis = mikrofon.acquire(&constraints).await;
            let _ = tx.send(Ereignis::Mikrofon { versuch, ergebnis });
        });

        tracing::debug!(versuch, "Mikrofon angefordert");
    }

    fn mikrofon_erhalten(&mut self, versuch: u64, ergebnis: AudioResult<Arc<dyn LocalAudioHandle>>) {
        let passend = self.beitritt.as_ref().is_some_and(|b| b.versuch == versuch);
        let beitritt = match self.beitritt.take() {
            Some(b) if passend => b,
            andere => {
                // Beitritt wurde abgebrochen: Geraet sofort wieder freigeben
                self.beitritt = andere;
                if let Ok(spur) = ergebnis {
                    spur.release();
                    tracing::debug!(versuch, "Verspaetetes Mikrofon freigegeben");
                }
                return;
            }
        };

        let spur = match ergebnis {
            Ok(spur) => spur,
            Err(fehler) => {
                tracing::warn!(fehler = %fehler, "Mikrofon nicht verfuegbar");
                let _ = beitritt.antwort.send(Err(VoiceError::MediaUnavailable(fehler)));
                return;
            }
        };

        spur.set_enabled(true);
        self.spur = Some(spur.clone());
        self.aktiv = true;
        self.stumm = false;
        self.vad_starten(spur, versuch);

        self.senden(SignalPayload::Joined);
        self.ui.on_local_state_changed(self.lokaler_zustand());
        self.peer_liste_melden();
        self.notifier.play_tone(Ton::Beitritt);
        self.notifier.show_toast("Du bist dem Voice-Chat beigetreten");

        tracing::info!(teilnehmer = self.roster.len(), "Voice-Chat beigetreten");
        let _ = beitritt.antwort.send(Ok(()));
    }

    fn vad_starten(&mut self, spur: Arc<dyn LocalAudioHandle>, versuch: u64) {
        let abbruch = CancellationToken::new();
        let tx = self.intern_tx.clone();
        VoiceActivityMonitor::starten(spur, self.config.vad.clone(), abbruch.clone(), move |spricht| {
            let _ = tx.send(Ereignis::Sprache { versuch, spricht });
        });
        self.vad_abbruch = Some(abbruch);
    }

    fn verlassen_intern(&mut self) {
        if let Some(beitritt) = self.beitritt.take() {
            tracing::info!(versuch = beitritt.versuch, "Laufender Beitritt abgebrochen");
            let _ = beitritt.antwort.send(Err(VoiceError::Abgebrochen));
        }
        if !self.aktiv {
            return;
        }

        if let Some(abbruch) = self.vad_abbruch.take() {
            abbruch.cancel();
        }

        let peers: Vec<PeerId> = self.sitzungen.keys().cloned().collect();
        for peer in &peers {
            self.sitzung_schliessen(peer);
        }
        self.puffer.leeren();
        self.wiederanlaeufe.clear();

        self.senden(SignalPayload::Left);
        if let Some(spur) = self.spur.take() {
            spur.release();
        }
        self.aktiv = false;
        self.stumm = false;

        if self.sprechend.remove(&self.lokal.id).is_some() {
            self.ui.on_speaking_changed(&self.lokal.id, false);
        }
        self.ui.on_local_state_changed(self.lokaler_zustand());
        self.peer_liste_melden();
        self.notifier.show_toast("Du hast den Voice-Chat verlassen");

        tracing::info!(geschlossen = peers.len(), "Voice-Chat verlassen");
    }

    fn stumm_umschalten(&mut self) -> VoiceResult<bool> {
        let Some(spur) = self.spur.as_ref().filter(|_| self.aktiv) else {
            return Err(VoiceError::NichtAktiv);
        };

        self.stumm = !self.stumm;
        spur.set_enabled(!self.stumm);

        self.ui.on_local_state_changed(self.lokaler_zustand());
        self.notifier.play_tone(Ton::Klick);
        tracing::debug!(stumm = self.stumm, "Mikrofon umgeschaltet");
        Ok(self.stumm)
    }

    fn sprache(&mut self, versuch: u64, spricht: bool) {
        if !self.aktiv || versuch != self.versuch {
            return;
        }
        self.sprechend.insert(self.lokal.id.clone(), spricht);
        self.senden(SignalPayload::SpeakingChanged { speaking: spricht });
        self.ui.on_speaking_changed(&self.lokal.id, spricht);
    }

    // -----------------------------------------------------------------------
    // Eingehende Signale
    // -----------------------------------------------------------------------

    fn nachricht(&mut self, nachricht: SignalingMessage) {
        if let Err(grund) = self.filter.pruefen(&nachricht) {
            self.metriken.signal_verworfen(grund.grund());
            match grund {
                Verworfen::Veraltet { alter_ms } => {
                    tracing::debug!(von = %nachricht.sender_id, art = %nachricht.kind(), alter_ms, "Veraltete Nachricht verworfen")
                }
                _ => {
                    tracing::trace!(von = %nachricht.sender_id, art = %nachricht.kind(), grund = grund.grund(), "Nachricht verworfen")
                }
            }
            return;
        }

        let art = nachricht.kind();
        self.metriken.signal_empfangen(art.as_str());
        tracing::trace!(von = %nachricht.sender_id, art = %art, "Signal empfangen");

        let SignalingMessage {
            sender_id: von,
            sender_display_name: name,
            payload,
            ..
        } = nachricht;

        if !matches!(payload, SignalPayload::Left) {
            self.teilnehmer_merken(&von, &name);
        }

        match payload {
            SignalPayload::Joined => self.beitritt_empfangen(&von),
            SignalPayload::Offer {
                verhandlung,
                beschreibung,
                ..
            } => self.angebot_empfangen(&von, verhandlung, beschreibung),
            SignalPayload::Answer {
                verhandlung,
                beschreibung,
                ..
            } => self.antwort_empfangen(&von, verhandlung, beschreibung),
            SignalPayload::Candidate {
                verhandlung,
                kandidat,
                ..
            } => self.kandidat_empfangen(&von, verhandlung, kandidat),
            SignalPayload::Left => self.abschied_empfangen(&von),
            SignalPayload::SpeakingChanged { speaking } => self.sprechstatus_empfangen(&von, speaking),
        }

        self.peer_liste_melden();
    }

    fn teilnehmer_merken(&mut self, von: &PeerId, name: &str) {
        if self.roster.get(von).map(String::as_str) != Some(name) {
            self.roster.insert(von.clone(), name.to_string());
        }
    }

    /// Ohne lokales Mikrofon gibt es nichts auszuhandeln
    fn inaktiv_verwerfen(&self, von: &PeerId, art: &'static str) -> bool {
        if self.aktiv {
            return false;
        }
        self.metriken.signal_verworfen("inaktiv");
        tracing::trace!(von = %von, art, "Nicht aktiv, Verhandlung ignoriert");
        true
    }

    fn beitritt_empfangen(&mut self, von: &PeerId) {
        if !self.aktiv {
            return;
        }
        if self.sitzungen.contains_key(von) {
            tracing::debug!(peer = %von, "Doppeltes Joined ignoriert");
            return;
        }

        if let Some(sitzung) = self.sitzung_erstellen(von, Rolle::Initiator, NegotiationId::new()) {
            sitzung.angebot_starten();
            tracing::debug!(peer = %von, "Neuer Teilnehmer, sende Angebot");
        }
    }

    fn angebot_empfangen(
        &mut self,
        von: &PeerId,
        verhandlung: NegotiationId,
        angebot: SessionDescription,
    ) {
        if self.inaktiv_verwerfen(von, "offer") {
            return;
        }

        if let Some(bestehend) = self.sitzungen.get(von) {
            if bestehend.verhandlung() == verhandlung {
                self.metriken.signal_verworfen("duplikat");
                tracing::debug!(peer = %von, "Doppeltes Angebot ignoriert");
                return;
            }
            if bestehend.wartet_auf_antwort() && eigenes_angebot_gewinnt(&self.lokal.id, von) {
                self.metriken.signal_verworfen("glare");
                tracing::debug!(peer = %von, "Glare: eigenes Angebot bleibt bestehen");
                return;
            }
            tracing::debug!(peer = %von, alt = ?bestehend.zustand(), "Bestehende Sitzung wird durch Angebot ersetzt");
            self.sitzung_schliessen(von);
        }

        let Some(sitzung) = self.sitzung_erstellen(von, Rolle::Antwortender, verhandlung) else {
            return;
        };
        sitzung.angebot_beantworten(angebot);
        self.gepufferte_einreihen(von, verhandlung);
    }

    fn antwort_empfangen(&mut self, von: &PeerId, verhandlung: NegotiationId, antwort: SessionDescription) {
        if self.inaktiv_verwerfen(von, "answer") {
            return;
        }

        let angewendet = match self.sitzungen.get_mut(von) {
            Some(s) if s.verhandlung() == verhandlung => s.antwort_anwenden(antwort),
            _ => false,
        };
        if !angewendet {
            self.metriken.signal_verworfen("unpassend");
            tracing::debug!(peer = %von, "Antwort ohne passendes Angebot ignoriert");
            return;
        }
        self.gepufferte_einreihen(von, verhandlung);
    }

    fn kandidat_empfangen(&mut self, von: &PeerId, verhandlung: NegotiationId, kandidat: IceCandidate) {
        if self.inaktiv_verwerfen(von, "candidate") {
            return;
        }
        if !kandidat.ist_gueltig() {
            self.metriken.signal_verworfen("ungueltig");
            tracing::debug!(peer = %von, "Ungueltiger Kandidat ignoriert");
            return;
        }

        match self.sitzungen.get_mut(von) {
            Some(s) if s.nimmt_kandidaten_an(verhandlung) => s.kandidat_einreihen(kandidat),
            _ => {
                let jetzt = self.filter.jetzt_millis();
                self.puffer.puffern(von, verhandlung, kandidat, jetzt);
                tracing::trace!(peer = %von, gepuffert = self.puffer.anzahl(von), "Kandidat gepuffert");
            }
        }
    }

    fn abschied_empfangen(&mut self, von: &PeerId) {
        let bekannt = self.roster.remove(von).is_some();
        let hatte_sitzung = self.sitzung_schliessen(von);
        self.puffer.verwerfen(von);
        self.wiederanlaeufe.remove(von);
        if self.sprechend.remove(von).is_some() {
            self.ui.on_speaking_changed(von, false);
        }
        if bekannt || hatte_sitzung {
            tracing::info!(peer = %von, "Teilnehmer hat den Voice-Chat verlassen");
        }
    }

    fn sprechstatus_empfangen(&mut self, von: &PeerId, spricht: bool) {
        if self.sprechend.insert(von.clone(), spricht) != Some(spricht) {
            self.ui.on_speaking_changed(von, spricht);
        }
    }

    /// Reiht die gepufferten Kandidaten einer Verhandlung hinter die
    /// entfernte Beschreibung ein
    fn gepufferte_einreihen(&mut self, von: &PeerId, verhandlung: NegotiationId) {
        let kandidaten = self.puffer.entnehmen(von, verhandlung);
        if kandidaten.is_empty() {
            return;
        }
        if let Some(sitzung) = self.sitzungen.get_mut(von) {
            tracing::debug!(peer = %von, anzahl = kandidaten.len(), "Gepufferte Kandidaten eingereiht");
            for kandidat in kandidaten {
                sitzung.kandidat_einreihen(kandidat);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Interne Ereignisse
    // -----------------------------------------------------------------------

    fn ereignis(&mut self, ereignis: Ereignis) {
        match ereignis {
            Ereignis::Mikrofon { versuch, ergebnis } => self.mikrofon_erhalten(versuch, ergebnis),
            Ereignis::Sprache { versuch, spricht } => self.sprache(versuch, spricht),
            Ereignis::Verbindung {
                peer,
                sitzung,
                ereignis,
            } => self.verbindungs_ereignis(&peer, sitzung, ereignis),
            Ereignis::Operation {
                peer,
                sitzung,
                ergebnis,
            } => self.operation_abgeschlossen(&peer, sitzung, ergebnis),
        }
    }

    /// Aktuelle, nicht beendete Sitzung eines Peers mit passender ID
    fn aktuelle_sitzung(&mut self, peer: &PeerId, sitzung: SessionId) -> Option<&mut PeerSession> {
        self.sitzungen
            .get_mut(peer)
            .filter(|s| s.id() == sitzung && !s.zustand().ist_beendet())
    }

    fn operation_abgeschlossen(&mut self, peer: &PeerId, sitzung: SessionId, ergebnis: OpErgebnis) {
        let Some(s) = self.aktuelle_sitzung(peer, sitzung) else {
            tracing::trace!(peer = %peer, sitzung = %sitzung, "Verspaetetes Operationsergebnis ignoriert");
            return;
        };

        match ergebnis {
            OpErgebnis::BeschreibungBereit(beschreibung) => {
                let verhandlung = s.verhandlung();
                let zurueckgehalten = s.beschreibung_versendet();
                let verbunden = s.verbunden_pruefen();

                let an = peer.clone();
                let payload = match beschreibung.kind {
                    SdpKind::Offer => SignalPayload::Offer {
                        an,
                        verhandlung,
                        beschreibung,
                    },
                    SdpKind::Answer => SignalPayload::Answer {
                        an,
                        verhandlung,
                        beschreibung,
                    },
                };
                self.senden(payload);
                for kandidat in zurueckgehalten {
                    self.senden(SignalPayload::Candidate {
                        an: peer.clone(),
                        verhandlung,
                        kandidat,
                    });
                }
                if verbunden {
                    self.verbunden_melden(peer);
                }
                self.peer_liste_melden();
            }
            OpErgebnis::AntwortAngewendet => {
                if s.verbunden_pruefen() {
                    self.verbunden_melden(peer);
                }
            }
            OpErgebnis::KandidatAngewendet(ergebnis) => {
                if let Err(fehler) = ergebnis {
                    tracing::debug!(peer = %peer, fehler = %fehler, "Kandidat nicht anwendbar");
                }
                if s.kandidat_abgeschlossen() {
                    self.verbunden_melden(peer);
                }
            }
            OpErgebnis::Fehlgeschlagen { schritt, fehler } => {
                self.sitzung_fehlgeschlagen(peer, Fehlergrund::Verhandlung { schritt, fehler });
            }
        }
    }

    fn verbindungs_ereignis(&mut self, peer: &PeerId, sitzung: SessionId, ereignis: ConnectionEvent) {
        let Some(s) = self.aktuelle_sitzung(peer, sitzung) else {
            tracing::trace!(peer = %peer, sitzung = %sitzung, "Ereignis alter Sitzung ignoriert");
            return;
        };

        match ereignis {
            ConnectionEvent::Kandidat(kandidat) => {
                let verhandlung = s.verhandlung();
                if let Some(kandidat) = s.lokaler_kandidat(kandidat) {
                    self.senden(SignalPayload::Candidate {
                        an: peer.clone(),
                        verhandlung,
                        kandidat,
                    });
                }
            }
            ConnectionEvent::Zustand(zustand) => {
                let folge = s.verbindungszustand(zustand, Instant::now());
                tracing::debug!(peer = %peer, sitzung = %sitzung, ?zustand, "Verbindungszustand");
                if let Some(qualitaet) = folge.qualitaet {
                    self.ui.on_connection_quality_changed(peer, qualitaet);
                }
                if folge.geschlossen {
                    self.sitzung_fehlgeschlagen(peer, Fehlergrund::Geschlossen);
                } else if folge.verbunden {
                    self.verbunden_melden(peer);
                }
            }
            ConnectionEvent::RemoteTrack(stream) => {
                if let Some(stream) = s.remote_track(stream) {
                    self.ui.play_remote_audio(peer, stream);
                }
            }
        }
    }

    /// Sitzung hat `Connected` erreicht
    fn verbunden_melden(&mut self, peer: &PeerId) {
        let Some(s) = self.sitzungen.get_mut(peer) else {
            return;
        };
        let dauer = s.erstellt().elapsed();
        let sitzung = s.id();
        let stream = s.wiedergabe_starten();

        self.wiederanlaeufe.remove(peer);
        self.metriken.verbindungen_hergestellt.inc();
        self.metriken
            .verbindungsaufbau_sekunden
            .observe(dauer.as_secs_f64());
        tracing::info!(peer = %peer, sitzung = %sitzung, dauer_ms = dauer.as_millis() as u64, "Verbindung hergestellt");

        if let Some(stream) = stream {
            self.ui.play_remote_audio(peer, stream);
        }
        self.peer_liste_melden();
    }

    // -----------------------------------------------------------------------
    // Sitzungsverwaltung
    // -----------------------------------------------------------------------

    fn sitzung_erstellen(
        &mut self,
        peer: &PeerId,
        rolle: Rolle,
        verhandlung: NegotiationId,
    ) -> Option<&mut PeerSession> {
        let spur = self.spur.clone()?;
        self.naechste_sitzung += 1;
        let id = SessionId(self.naechste_sitzung);

        let tx = self.intern_tx.clone();
        let p = peer.clone();
        let ereignisse: ConnectionEventSink = Arc::new(move |ereignis: ConnectionEvent| {
            let _ = tx.send(Ereignis::Verbindung {
                peer: p.clone(),
                sitzung: id,
                ereignis,
            });
        });

        let verbindung = match self.medien.create_connection(ConnectionSetup {
            ice_server: self.config.ice_server.clone(),
            lokale_spur: spur,
            ereignisse,
        }) {
            Ok(v) => v,
            Err(fehler) => {
                self.metriken.sitzung_fehlgeschlagen("verbindung_erstellen");
                tracing::warn!(peer = %peer, fehler = %fehler, "Peer-Verbindung konnte nicht erstellt werden");
                return None;
            }
        };

        let tx = self.intern_tx.clone();
        let p = peer.clone();
        let sitzung = PeerSession::neu(id, peer.clone(), rolle, verhandlung, verbindung, move |ergebnis| {
            let _ = tx.send(Ereignis::Operation {
                peer: p.clone(),
                sitzung: id,
                ergebnis,
            });
        });
        tracing::debug!(peer = %peer, sitzung = %id, ?rolle, "Peer-Sitzung erstellt");

        // Hoechstens eine nicht geschlossene Verbindung pro Peer
        if let Some(mut alt) = self.sitzungen.insert(peer.clone(), sitzung) {
            alt.schliessen(self.ui.as_ref());
        }
        self.metriken.sitzungen_aktiv.set(self.sitzungen.len() as i64);
        self.sitzungen.get_mut(peer)
    }

    /// Entfernt und schliesst die Sitzung eines Peers
    fn sitzung_schliessen(&mut self, peer: &PeerId) -> bool {
        let Some(mut sitzung) = self.sitzungen.remove(peer) else {
            return false;
        };
        sitzung.schliessen(self.ui.as_ref());
        self.metriken.sitzungen_aktiv.set(self.sitzungen.len() as i64);
        tracing::debug!(peer = %peer, sitzung = %sitzung.id(), "Peer-Sitzung geschlossen");
        true
    }

    fn sitzung_fehlgeschlagen(&mut self, peer: &PeerId, grund: Fehlergrund) {
        let Some(mut sitzung) = self.sitzungen.remove(peer) else {
            return;
        };
        sitzung.fehlschlagen();
        sitzung.schliessen(self.ui.as_ref());
        self.metriken.sitzungen_aktiv.set(self.sitzungen.len() as i64);
        self.metriken.sitzung_fehlgeschlagen(grund.label());
        tracing::warn!(peer = %peer, sitzung = %sitzung.id(), grund = %grund, "Peer-Sitzung fehlgeschlagen");

        // Ein Joined-Echo pro Fehler, solange der Peer noch als anwesend gilt
        if self.aktiv && self.roster.contains_key(peer) && self.wiederanlaeufe.insert(peer.clone()) {
            self.metriken.wiederanlaeufe.inc();
            tracing::info!(peer = %peer, "Erneuter Verbindungsversuch");
            self.senden(SignalPayload::Joined);
        }

        if let Fehlergrund::Verhandlung { fehler, .. } = grund {
            if self.roster.len() == 1 {
                self.notifier
                    .show_toast(&VoiceError::Negotiation(fehler).nutzer_meldung());
            }
        }
        self.peer_liste_melden();
    }

    fn watchdog(&mut self) {
        let jetzt = Instant::now();
        let faellig: Vec<(PeerId, Fehlergrund)> = self
            .sitzungen
            .iter()
            .filter_map(|(peer, s)| {
                s.ueberwachen(jetzt, self.config.gnadenfrist, self.config.verhandlungs_timeout)
                    .map(|grund| (peer.clone(), grund))
            })
            .collect();
        for (peer, grund) in faellig {
            self.sitzung_fehlgeschlagen(&peer, grund);
        }

        let entfernt = self
            .puffer
            .bereinigen(self.filter.jetzt_millis(), self.config.staleness_ms);
        if entfernt > 0 {
            tracing::debug!(entfernt, "Veraltete Kandidaten verworfen");
        }
    }

    // -----------------------------------------------------------------------
    // Ausgaben
    // -----------------------------------------------------------------------

    fn senden(&self, payload: SignalPayload) {
        let art = payload.kind();
        if self.sender.senden(payload) {
            self.metriken.signal_gesendet(art.as_str());
        } else {
            tracing::warn!(art = %art, "Signal-Versand nicht mehr verfuegbar");
        }
    }

    fn lokaler_zustand(&self) -> LocalState {
        LocalState {
            active: self.aktiv,
            muted: self.stumm,
        }
    }

    fn peer_liste(&self) -> Vec<PeerListEntry> {
        let mut liste = Vec::with_capacity(self.roster.len() + 1);
        if self.aktiv {
            liste.push(PeerListEntry {
                id: self.lokal.id.clone(),
                anzeigename: self.lokal.anzeigename.clone(),
                ist_lokal: true,
                sitzung: None,
            });
        }
        for (id, name) in &self.roster {
            liste.push(PeerListEntry {
                id: id.clone(),
                anzeigename: name.clone(),
                ist_lokal: false,
                sitzung: self.sitzungen.get(id).map(PeerSession::zustand),
            });
        }
        liste
    }

    /// Meldet die Teilnehmerliste nur, wenn sie sich geaendert hat
    fn peer_liste_melden(&mut self) {
        let liste = self.peer_liste();
        if liste != self.letzte_liste {
            self.ui.on_peer_list_changed(&liste);
            self.letzte_liste = liste;
        }
    }

    fn snapshot(&self) -> MeshSnapshot {
        let mut sitzungen: Vec<SessionSnapshot> = self
            .sitzungen
            .values()
            .map(|s| SessionSnapshot {
                peer: s.remote_id().clone(),
                sitzung: s.id(),
                zustand: s.zustand(),
                rolle: s.rolle(),
                qualitaet: s.qualitaet(),
            })
            .collect();
        sitzungen.sort_by(|a, b| a.peer.cmp(&b.peer));

        MeshSnapshot {
            lokal: self.lokaler_zustand(),
            beitritt_laeuft: self.beitritt.is_some(),
            teilnehmer: self.peer_liste(),
            sitzungen,
            sprechend: self.sprechend.clone(),
            gepufferte_kandidaten: self.puffer.gesamt(),
        }
    }
}

/// Glare: kreuzen sich zwei Angebote, behaelt die kleinere ID ihr Angebot
/// und die groessere beantwortet es
fn eigenes_angebot_gewinnt(lokal: &PeerId, entfernt: &PeerId) -> bool {
    lokal < entfernt
}

impl Drop for MeshCoordinator {
    fn drop(&mut self) {
        if let Some(abbruch) = self.vad_abbruch.take() {
            abbruch.cancel();
        }
        if let Some(spur) = self.spur.take() {
            spur.release();
        }
    }
}
