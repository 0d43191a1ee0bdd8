//! Gemeinsame Hilfen fuer die Mesh-Integrationstests
//!
//! Alle Teilnehmer eines Tests teilen sich ein `InMemorySignaling`-Log und
//! eine `LoopbackMedia`-Instanz. Die Wanduhr ist eine `ManualClock`, die
//! tokio-Zeit ist pausiert (`start_paused`).

#![allow(dead_code)]

use jasus_audio::SimulatedMicrophone;
use jasus_core::{Clock, ManualClock, PeerId, RoomCode};
use jasus_observability::MeshMetrics;
use jasus_protocol::{SignalKind, SignalingMessage};
use jasus_signaling::InMemorySignaling;
use jasus_voice::{
    ConnectionQuality, LocalState, LokalerTeilnehmer, LoopbackMedia, MeshCollaborators,
    MeshCoordinator, MeshHandle, MeshSnapshot, Notifier, PeerListEntry, RemoteStreamHandle, Ton,
    UiBridge, VoiceConfig, VoiceResult,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const START_MS: i64 = 1_700_000_000_000;

// ---------------------------------------------------------------------------
// Aufzeichnende Oberflaeche
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum UiAufruf {
    PeerListe(Vec<PeerId>),
    Sprechen(PeerId, bool),
    Qualitaet(PeerId, ConnectionQuality),
    Lokal(LocalState),
    Wiedergabe(PeerId, String),
    WiedergabeStopp(PeerId),
    Ton(Ton),
    Toast(String),
}

#[derive(Default)]
pub struct Aufzeichnung {
    aufrufe: Mutex<Vec<UiAufruf>>,
}

impl Aufzeichnung {
    pub fn aufrufe(&self) -> Vec<UiAufruf> {
        self.aufrufe.lock().clone()
    }

    pub fn toasts(&self) -> Vec<String> {
        self.aufrufe()
            .into_iter()
            .filter_map(|a| match a {
                UiAufruf::Toast(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn wiedergaben(&self, peer: &PeerId) -> usize {
        self.aufrufe()
            .iter()
            .filter(|a| matches!(a, UiAufruf::Wiedergabe(p, _) if p == peer))
            .count()
    }

    pub fn stopps(&self, peer: &PeerId) -> usize {
        self.aufrufe()
            .iter()
            .filter(|a| matches!(a, UiAufruf::WiedergabeStopp(p) if p == peer))
            .count()
    }

    pub fn sprechen(&self, peer: &PeerId) -> Vec<bool> {
        self.aufrufe()
            .into_iter()
            .filter_map(|a| match a {
                UiAufruf::Sprechen(p, s) if &p == peer => Some(s),
                _ => None,
            })
            .collect()
    }

    fn merken(&self, aufruf: UiAufruf) {
        self.aufrufe.lock().push(aufruf);
    }
}

impl UiBridge for Aufzeichnung {
    fn on_peer_list_changed(&self, liste: &[PeerListEntry]) {
        self.merken(UiAufruf::PeerListe(liste.iter().map(|e| e.id.clone()).collect()));
    }

    fn on_speaking_changed(&self, id: &PeerId, spricht: bool) {
        self.merken(UiAufruf::Sprechen(id.clone(), spricht));
    }

    fn on_connection_quality_changed(&self, id: &PeerId, qualitaet: ConnectionQuality) {
        self.merken(UiAufruf::Qualitaet(id.clone(), qualitaet));
    }

    fn on_local_state_changed(&self, zustand: LocalState) {
        self.merken(UiAufruf::Lokal(zustand));
    }

    fn play_remote_audio(&self, id: &PeerId, stream: RemoteStreamHandle) {
        self.merken(UiAufruf::Wiedergabe(id.clone(), stream.stream_id));
    }

    fn stop_remote_audio(&self, id: &PeerId) {
        self.merken(UiAufruf::WiedergabeStopp(id.clone()));
    }
}

impl Notifier for Aufzeichnung {
    fn play_tone(&self, ton: Ton) {
        self.merken(UiAufruf::Ton(ton));
    }

    fn show_toast(&self, text: &str) {
        self.merken(UiAufruf::Toast(text.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Testumgebung
// ---------------------------------------------------------------------------

pub struct Umgebung {
    pub signal: InMemorySignaling,
    pub medien: LoopbackMedia,
    pub uhr: ManualClock,
    pub raum: RoomCode,
}

pub struct TestPeer {
    pub id: PeerId,
    pub handle: MeshHandle,
    pub task: JoinHandle<()>,
    pub ui: Arc<Aufzeichnung>,
    pub mikrofon: Arc<SimulatedMicrophone>,
    pub metriken: Arc<MeshMetrics>,
}

impl Umgebung {
    pub fn neu() -> Self {
        Self::mit_signal(InMemorySignaling::neu())
    }

    pub fn mit_signal(signal: InMemorySignaling) -> Self {
        Self {
            signal,
            medien: LoopbackMedia::neu(),
            uhr: ManualClock::neu(START_MS),
            raum: RoomCode::neu("raum-1"),
        }
    }

    pub async fn teilnehmer(&self, id: &str) -> TestPeer {
        self.teilnehmer_mit(id, VoiceConfig::default(), Arc::new(self.uhr.clone()))
            .await
    }

    pub async fn teilnehmer_mit(
        &self,
        id: &str,
        config: VoiceConfig,
        uhr: Arc<dyn Clock>,
    ) -> TestPeer {
        let ui = Arc::new(Aufzeichnung::default());
        let mikrofon = Arc::new(SimulatedMicrophone::neu());
        let metriken = Arc::new(MeshMetrics::neu().expect("Metriken"));

        let mit = MeshCollaborators {
            signaling: Arc::new(self.signal.clone()),
            mikrofon: mikrofon.clone(),
            medien: Arc::new(self.medien.clone()),
            ui: ui.clone(),
            notifier: ui.clone(),
            uhr,
            metriken: metriken.clone(),
        };
        let lokal = LokalerTeilnehmer::neu(id, id.to_uppercase());
        let (handle, task) = MeshCoordinator::starten(lokal, self.raum.clone(), config, mit)
            .await
            .expect("Koordinator starten");

        TestPeer {
            id: PeerId::neu(id),
            handle,
            task,
            ui,
            mikrofon,
            metriken,
        }
    }

    /// Startet einen Koordinator ohne Testhuelle, Fehler bleiben sichtbar
    pub async fn koordinator_starten(&self, id: &str) -> VoiceResult<(MeshHandle, JoinHandle<()>)> {
        let ui = Arc::new(Aufzeichnung::default());
        let mit = MeshCollaborators {
            signaling: Arc::new(self.signal.clone()),
            mikrofon: Arc::new(SimulatedMicrophone::neu()),
            medien: Arc::new(self.medien.clone()),
            ui: ui.clone(),
            notifier: ui,
            uhr: Arc::new(self.uhr.clone()),
            metriken: Arc::new(MeshMetrics::neu().expect("Metriken")),
        };
        let lokal = LokalerTeilnehmer::neu(id, id.to_uppercase());
        MeshCoordinator::starten(lokal, self.raum.clone(), VoiceConfig::default(), mit).await
    }

    /// Nachrichten eines Absenders und einer Art im Raum-Log
    pub fn gesendet(&self, von: &str, art: SignalKind) -> Vec<SignalingMessage> {
        self.signal
            .verlauf(&self.raum)
            .into_iter()
            .filter(|n| n.sender_id.as_str() == von && n.kind() == art)
            .collect()
    }
}

impl TestPeer {
    pub async fn snapshot(&self) -> MeshSnapshot {
        self.handle.snapshot().await.expect("Snapshot")
    }

    pub fn verworfen(&self, grund: &str) -> u64 {
        self.metriken
            .signale_verworfen
            .with_label_values(&[grund])
            .get()
    }
}

/// Wartet (in pausierter tokio-Zeit) bis die Bedingung auf dem Snapshot gilt
pub async fn warten_bis<F>(peer: &TestPeer, mut bedingung: F) -> MeshSnapshot
where
    F: FnMut(&MeshSnapshot) -> bool,
{
    let ende = Instant::now() + Duration::from_secs(60);
    loop {
        let snapshot = peer.snapshot().await;
        if bedingung(&snapshot) {
            return snapshot;
        }
        assert!(
            Instant::now() < ende,
            "Bedingung fuer {} nicht erreicht: {snapshot:#?}",
            peer.id
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wartet bis der Peer genau mit den angegebenen Peers verbunden ist
pub async fn warten_verbunden(peer: &TestPeer, erwartet: &[&str]) -> MeshSnapshot {
    let mut erwartet: Vec<PeerId> = erwartet.iter().map(|id| PeerId::neu(*id)).collect();
    erwartet.sort();
    warten_bis(peer, |s| s.verbundene_peers() == erwartet).await
}

/// Laesst die pausierte Zeit laufen, damit alle Tasks weiterkommen
pub async fn laufen_lassen(dauer: Duration) {
    tokio::time::sleep(dauer).await;
}
