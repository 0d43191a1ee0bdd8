//! Integration-Tests fuer den Mesh-Aufbau (InMemorySignaling + Loopback)

mod common;

use common::*;
use jasus_audio::LocalAudioHandle;
use jasus_core::PeerId;
use jasus_protocol::SignalKind;
use jasus_signaling::{InMemorySignaling, SignalingError};
use jasus_voice::{LocalState, SessionState, VoiceError};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn zwei_teilnehmer_verbinden_sich() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    laufen_lassen(Duration::from_millis(100)).await;
    b.handle.join().await.unwrap();

    let sa = warten_verbunden(&a, &["b"]).await;
    let sb = warten_verbunden(&b, &["a"]).await;

    // a war schon aktiv und hat auf das Joined von b hin angeboten
    assert_eq!(env.gesendet("a", SignalKind::Offer).len(), 1);
    assert_eq!(env.gesendet("b", SignalKind::Answer).len(), 1);
    assert!(env.gesendet("b", SignalKind::Offer).is_empty());

    assert_eq!(sa.lokal, LocalState { active: true, muted: false });
    assert_eq!(sa.teilnehmer[0].id, a.id);
    assert!(sa.teilnehmer[0].ist_lokal);
    assert_eq!(sb.teilnehmer.len(), 2);

    assert_eq!(a.ui.wiedergaben(&b.id), 1);
    assert_eq!(b.ui.wiedergaben(&a.id), 1);
    assert_eq!(env.medien.offene_verbindungen(), 2);
    assert_eq!(a.metriken.verbindungen_hergestellt.get(), 1);
    assert_eq!(a.metriken.sitzungen_aktiv.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn drei_teilnehmer_bilden_volles_mesh() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;
    let c = env.teilnehmer("c").await;

    a.handle.join().await.unwrap();
    b.handle.join().await.unwrap();
    warten_verbunden(&a, &["b"]).await;
    c.handle.join().await.unwrap();

    warten_verbunden(&a, &["b", "c"]).await;
    warten_verbunden(&b, &["a", "c"]).await;
    let sc = warten_verbunden(&c, &["a", "b"]).await;

    // Genau eine Verbindung pro Paar und Seite
    assert_eq!(env.medien.offene_verbindungen(), 6);
    assert_eq!(sc.teilnehmer.len(), 3);
    for peer in [&a, &b, &c] {
        assert_eq!(peer.metriken.verbindungen_hergestellt.get(), 2);
    }
}

#[tokio::test(start_paused = true)]
async fn verbundene_menge_entspricht_aktiven_teilnehmern() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;
    let c = env.teilnehmer("c").await;

    for peer in [&a, &b, &c] {
        peer.handle.join().await.unwrap();
    }
    warten_verbunden(&a, &["b", "c"]).await;
    warten_verbunden(&c, &["a", "b"]).await;

    b.handle.leave().await.unwrap();

    warten_verbunden(&a, &["c"]).await;
    let sc = warten_verbunden(&c, &["a"]).await;
    assert!(sc.teilnehmer.iter().all(|e| e.id != b.id));
    assert!(b.snapshot().await.sitzungen.is_empty());

    b.handle.join().await.unwrap();
    warten_verbunden(&a, &["b", "c"]).await;
    warten_verbunden(&b, &["a", "c"]).await;
    warten_verbunden(&c, &["a", "b"]).await;
}

#[tokio::test(start_paused = true)]
async fn doppelte_zustellung_erzeugt_keine_zweite_sitzung() {
    let env = Umgebung::mit_signal(InMemorySignaling::mit_duplikaten());
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    b.handle.join().await.unwrap();

    let sa = warten_verbunden(&a, &["b"]).await;
    warten_verbunden(&b, &["a"]).await;
    laufen_lassen(Duration::from_secs(2)).await;

    assert_eq!(env.gesendet("a", SignalKind::Offer).len(), 1);
    assert_eq!(env.gesendet("b", SignalKind::Answer).len(), 1);
    assert_eq!(env.gesendet("a", SignalKind::Joined).len(), 1);
    assert_eq!(env.medien.erzeugt(), 2);

    let sa_spaeter = a.snapshot().await;
    assert_eq!(sa_spaeter.sitzungen, sa.sitzungen);
    assert_eq!(sa_spaeter.teilnehmer.len(), 2);
    assert!(a.verworfen("duplikat") >= 1 || b.verworfen("duplikat") >= 1);
    assert_eq!(a.ui.wiedergaben(&b.id), 1);
}

#[tokio::test(start_paused = true)]
async fn gleichzeitiger_beitritt_ergibt_eine_verbindung() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    let (ra, rb) = tokio::join!(a.handle.join(), b.handle.join());
    ra.unwrap();
    rb.unwrap();

    warten_verbunden(&a, &["b"]).await;
    warten_verbunden(&b, &["a"]).await;
    laufen_lassen(Duration::from_secs(1)).await;

    // Beide Angebote haben sich gekreuzt: a behaelt seins, b antwortet
    assert_eq!(env.gesendet("a", SignalKind::Offer).len(), 1);
    assert_eq!(env.gesendet("b", SignalKind::Offer).len(), 1);
    assert_eq!(a.verworfen("glare"), 1);
    assert_eq!(b.verworfen("glare"), 0);
    assert_eq!(env.gesendet("b", SignalKind::Answer).len(), 1);
    assert!(env.gesendet("a", SignalKind::Answer).is_empty());
    assert_eq!(env.medien.erzeugt(), 3);
    assert_eq!(a.verworfen("unpassend"), 0);

    // Kein Wiederanlauf noetig
    laufen_lassen(Duration::from_secs(30)).await;
    assert_eq!(env.gesendet("a", SignalKind::Joined).len(), 1);
    assert_eq!(env.gesendet("b", SignalKind::Joined).len(), 1);
    assert_eq!(a.metriken.verbindungen_hergestellt.get(), 1);
    assert_eq!(b.metriken.verbindungen_hergestellt.get(), 1);
    assert_eq!(env.medien.offene_verbindungen(), 2);
    assert_eq!(a.snapshot().await.sitzungen.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stummschalten_aendert_nur_die_spur() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    b.handle.join().await.unwrap();
    let vorher = warten_verbunden(&a, &["b"]).await;
    warten_verbunden(&b, &["a"]).await;
    let nachrichten_vorher = env.signal.verlauf(&env.raum).len();

    let spur = a.mikrofon.letzter_handle().unwrap();
    assert!(spur.is_enabled());

    assert!(a.handle.toggle_mute().await.unwrap());
    assert!(!spur.is_enabled());

    laufen_lassen(Duration::from_millis(500)).await;
    let nachher = a.snapshot().await;
    assert_eq!(nachher.sitzungen, vorher.sitzungen);
    assert!(nachher.lokal.muted);
    assert_eq!(env.signal.verlauf(&env.raum).len(), nachrichten_vorher);
    assert_eq!(env.medien.erzeugt(), 2);

    assert!(!a.handle.toggle_mute().await.unwrap());
    assert!(spur.is_enabled());
    assert!(a
        .ui
        .aufrufe()
        .contains(&UiAufruf::Lokal(LocalState { active: true, muted: true })));
}

#[tokio::test(start_paused = true)]
async fn sprechanzeige_wird_weitergegeben() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    b.handle.join().await.unwrap();
    warten_verbunden(&b, &["a"]).await;

    let spur = a.mikrofon.letzter_handle().unwrap();
    spur.pegel_setzen(0.5);
    warten_bis(&b, |s| s.sprechend.get(&a.id) == Some(&true)).await;
    assert_eq!(a.ui.sprechen(&a.id), vec![true]);

    // Stumm geschaltete Spur liest sich als Stille
    a.handle.toggle_mute().await.unwrap();
    warten_bis(&b, |s| s.sprechend.get(&a.id) == Some(&false)).await;

    assert_eq!(b.ui.sprechen(&a.id), vec![true, false]);
    assert_eq!(env.gesendet("a", SignalKind::SpeakingChanged).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn teilnehmerliste_auch_ohne_beitritt() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let zuschauer = env.teilnehmer("z").await;

    a.handle.join().await.unwrap();
    let sz = warten_bis(&zuschauer, |s| s.teilnehmer.len() == 1).await;
    assert_eq!(sz.teilnehmer[0].id, a.id);
    assert_eq!(sz.teilnehmer[0].anzeigename, "A");
    assert!(!sz.lokal.active);
    assert!(sz.sitzungen.is_empty());

    a.handle.leave().await.unwrap();
    warten_bis(&zuschauer, |s| s.teilnehmer.is_empty()).await;

    assert_eq!(env.medien.erzeugt(), 0);
    assert!(zuschauer.ui.aufrufe().contains(&UiAufruf::PeerListe(vec![PeerId::neu("a")])));
}

#[tokio::test(start_paused = true)]
async fn verlassen_schliesst_alles() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    b.handle.join().await.unwrap();
    warten_verbunden(&a, &["b"]).await;
    warten_verbunden(&b, &["a"]).await;

    a.handle.leave().await.unwrap();
    let sa = a.snapshot().await;
    assert!(!sa.lokal.active);
    assert!(sa.sitzungen.is_empty());
    assert!(a.mikrofon.letzter_handle().unwrap().ist_freigegeben());
    assert_eq!(a.ui.stopps(&b.id), 1);

    let sb = warten_bis(&b, |s| s.sitzungen.is_empty()).await;
    assert_eq!(env.gesendet("a", SignalKind::Left).len(), 1);
    assert_eq!(sb.teilnehmer.len(), 1);
    assert_eq!(b.ui.stopps(&a.id), 1);
    assert_eq!(env.medien.offene_verbindungen(), 0);

    // Zweites leave ist ein No-op
    a.handle.leave().await.unwrap();
    laufen_lassen(Duration::from_millis(100)).await;
    assert_eq!(env.gesendet("a", SignalKind::Left).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn beenden_verlaesst_und_stoppt_task() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    b.handle.join().await.unwrap();
    warten_verbunden(&b, &["a"]).await;

    a.handle.beenden().await.unwrap();
    a.task.await.unwrap();

    assert_eq!(env.gesendet("a", SignalKind::Left).len(), 1);
    assert!(matches!(
        a.handle.snapshot().await,
        Err(jasus_voice::VoiceError::Beendet)
    ));
    let sb = warten_bis(&b, |s| s.sitzungen.is_empty()).await;
    assert!(sb.sitzung(&a.id).is_none());
    assert!(sb
        .sitzungen
        .iter()
        .all(|s| s.zustand != SessionState::Connected));
}

#[tokio::test(start_paused = true)]
async fn geschlossenes_raum_log() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    a.handle.join().await.unwrap();
    laufen_lassen(Duration::from_millis(100)).await;

    env.signal.schliessen(&env.raum);
    laufen_lassen(Duration::from_millis(100)).await;

    // Ohne Signale laeuft der Koordinator weiter, lokale Aktionen bleiben moeglich
    assert!(a.snapshot().await.lokal.active);
    assert!(a.handle.toggle_mute().await.unwrap());
    a.handle.leave().await.unwrap();
    assert!(!a.snapshot().await.lokal.active);
    assert!(a.mikrofon.letzter_handle().unwrap().ist_freigegeben());

    // Left konnte nicht mehr angehaengt werden
    assert!(env.gesendet("a", SignalKind::Left).is_empty());
    assert_eq!(env.gesendet("a", SignalKind::Joined).len(), 1);

    assert!(matches!(
        env.koordinator_starten("b").await,
        Err(VoiceError::Signaling(SignalingError::Geschlossen))
    ));
}
