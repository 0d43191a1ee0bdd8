//! Integration-Tests fuer Verhandlung, Puffer, Staleness und Wiederanlauf

mod common;

use common::*;
use jasus_audio::{LocalAudioHandle, SimulatedAudioHandle};
use jasus_core::{Clock, ManualClock, PeerId};
use jasus_protocol::{
    IceCandidate, NegotiationId, SignalKind, SignalPayload, SignalingMessage,
};
use jasus_signaling::SignalingChannel;
use jasus_voice::{
    ConnectionEvent, ConnectionSetup, ConnectionState, FehlerSchritt, MediaConnection,
    MediaEngine, SessionState, VoiceConfig,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const KANDIDAT: &str = "candidate:7 1 udp 2122260223 10.0.0.2 5000 typ host";

/// Haengt eine Nachricht im Namen eines simulierten Fremd-Peers an
async fn fremd_senden(env: &Umgebung, von: &str, sent_at_millis: i64, payload: SignalPayload) {
    let nachricht = SignalingMessage::neu(PeerId::neu(von), von.to_uppercase(), sent_at_millis, payload);
    env.signal.append(&env.raum, nachricht).await.unwrap();
}

fn fremde_verbindung(env: &Umgebung) -> Arc<dyn MediaConnection> {
    let ereignisse = Arc::new(Mutex::new(Vec::<ConnectionEvent>::new()));
    env.medien
        .create_connection(ConnectionSetup {
            ice_server: Vec::new(),
            lokale_spur: Arc::new(SimulatedAudioHandle::neu()),
            ereignisse: Arc::new(move |e: ConnectionEvent| ereignisse.lock().push(e)),
        })
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn kandidat_vor_angebot_wird_gepuffert() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    a.handle.join().await.unwrap();
    let b = PeerId::neu("b");

    let fremd = fremde_verbindung(&env);
    let angebot = fremd.create_offer().await.unwrap();
    fremd.set_local_description(angebot.clone()).await.unwrap();
    let verhandlung = NegotiationId::new();

    // Kandidat ueberholt das Angebot
    fremd_senden(
        &env,
        "b",
        env.uhr.jetzt_millis(),
        SignalPayload::Candidate {
            an: a.id.clone(),
            verhandlung,
            kandidat: IceCandidate::neu(KANDIDAT),
        },
    )
    .await;
    let sa = warten_bis(&a, |s| s.gepufferte_kandidaten == 1).await;
    assert!(sa.sitzungen.is_empty());

    fremd_senden(
        &env,
        "b",
        env.uhr.jetzt_millis(),
        SignalPayload::Offer {
            an: a.id.clone(),
            verhandlung,
            beschreibung: angebot,
        },
    )
    .await;
    warten_bis(&a, |s| {
        s.gepufferte_kandidaten == 0
            && s.sitzung(&b).is_some_and(|x| x.zustand == SessionState::Connecting)
    })
    .await;

    // Antwort und Kandidaten von a auf der Fremdseite anwenden
    let antworten = env.gesendet("a", SignalKind::Answer);
    assert_eq!(antworten.len(), 1);
    let SignalPayload::Answer {
        verhandlung: v,
        beschreibung,
        ..
    } = antworten[0].payload.clone()
    else {
        panic!("keine Antwort");
    };
    assert_eq!(v, verhandlung);
    fremd.set_remote_description(beschreibung).await.unwrap();

    let kandidaten = env.gesendet("a", SignalKind::Candidate);
    assert!(!kandidaten.is_empty());
    // Kandidaten folgen immer der eigenen Beschreibung
    let verlauf = env.signal.verlauf(&env.raum);
    let pos_antwort = verlauf.iter().position(|n| n.kind() == SignalKind::Answer).unwrap();
    let pos_kandidat = verlauf
        .iter()
        .position(|n| n.sender_id == a.id && n.kind() == SignalKind::Candidate)
        .unwrap();
    assert!(pos_antwort < pos_kandidat);

    for nachricht in kandidaten {
        if let SignalPayload::Candidate { kandidat, .. } = nachricht.payload {
            fremd.add_ice_candidate(kandidat).await.unwrap();
        }
    }

    warten_verbunden(&a, &["b"]).await;
    assert_eq!(a.ui.wiedergaben(&b), 1);
}

#[tokio::test(start_paused = true)]
async fn adressierung_und_ungueltige_kandidaten() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    a.handle.join().await.unwrap();
    let jetzt = env.uhr.jetzt_millis();

    fremd_senden(
        &env,
        "b",
        jetzt,
        SignalPayload::Candidate {
            an: PeerId::neu("c"),
            verhandlung: NegotiationId::new(),
            kandidat: IceCandidate::neu(KANDIDAT),
        },
    )
    .await;
    fremd_senden(
        &env,
        "b",
        jetzt,
        SignalPayload::Candidate {
            an: a.id.clone(),
            verhandlung: NegotiationId::new(),
            kandidat: IceCandidate::neu("kaputt"),
        },
    )
    .await;
    laufen_lassen(Duration::from_millis(100)).await;

    assert_eq!(a.verworfen("an_andere"), 1);
    assert_eq!(a.verworfen("ungueltig"), 1);
    assert_eq!(a.snapshot().await.gepufferte_kandidaten, 0);
}

#[tokio::test(start_paused = true)]
async fn verhandlung_ohne_beitritt_wird_ignoriert() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;

    let fremd = fremde_verbindung(&env);
    let angebot = fremd.create_offer().await.unwrap();
    fremd_senden(
        &env,
        "b",
        env.uhr.jetzt_millis(),
        SignalPayload::Offer {
            an: a.id.clone(),
            verhandlung: NegotiationId::new(),
            beschreibung: angebot,
        },
    )
    .await;

    // Absender landet trotzdem in der Teilnehmerliste
    let sa = warten_bis(&a, |s| s.teilnehmer.len() == 1).await;
    assert!(sa.sitzungen.is_empty());
    assert_eq!(a.verworfen("inaktiv"), 1);
    assert!(env.gesendet("a", SignalKind::Answer).is_empty());
}

#[tokio::test(start_paused = true)]
async fn veraltete_nachricht_wird_verworfen() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;

    fremd_senden(&env, "z", START_MS - 31_000, SignalPayload::Joined).await;
    fremd_senden(&env, "y", START_MS - 29_000, SignalPayload::Joined).await;
    let sa = warten_bis(&a, |s| !s.teilnehmer.is_empty()).await;
    laufen_lassen(Duration::from_millis(100)).await;

    assert_eq!(a.verworfen("veraltet"), 1);
    assert_eq!(sa.teilnehmer.len(), 1);
    assert_eq!(sa.teilnehmer[0].id, PeerId::neu("y"));
}

#[tokio::test(start_paused = true)]
async fn uhrenversatz_ausserhalb_des_fensters() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    // Uhr von b geht 31 s vor: alles von a ist fuer b veraltet
    let uhr_b = ManualClock::neu(START_MS + 31_000);
    let b = env
        .teilnehmer_mit("b", VoiceConfig::default(), Arc::new(uhr_b))
        .await;

    a.handle.join().await.unwrap();
    laufen_lassen(Duration::from_millis(100)).await;
    b.handle.join().await.unwrap();
    laufen_lassen(Duration::from_secs(3)).await;

    let sb = b.snapshot().await;
    assert!(sb.sitzungen.is_empty());
    assert_eq!(sb.teilnehmer.len(), 1);
    assert!(b.verworfen("veraltet") >= 2);
    assert!(a.snapshot().await.verbundene_peers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn uhrenversatz_innerhalb_des_fensters() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let uhr_b = ManualClock::neu(START_MS + 10_000);
    let b = env
        .teilnehmer_mit("b", VoiceConfig::default(), Arc::new(uhr_b))
        .await;

    a.handle.join().await.unwrap();
    b.handle.join().await.unwrap();

    warten_verbunden(&a, &["b"]).await;
    warten_verbunden(&b, &["a"]).await;
    assert_eq!(b.verworfen("veraltet"), 0);
}

#[tokio::test(start_paused = true)]
async fn verlassen_waehrend_verzoegerter_operationen() {
    let env = Umgebung::neu();
    env.medien.verzoegerung_setzen(Some(Duration::from_millis(200)));
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    b.handle.join().await.unwrap();
    laufen_lassen(Duration::from_millis(300)).await;

    a.handle.leave().await.unwrap();
    laufen_lassen(Duration::from_secs(5)).await;

    let sa = a.snapshot().await;
    assert!(!sa.lokal.active);
    assert!(sa.sitzungen.is_empty());
    assert_eq!(a.ui.wiedergaben(&b.id), 0);
    assert!(a.mikrofon.letzter_handle().unwrap().ist_freigegeben());

    // Nach Left sendet a nichts mehr
    let von_a: Vec<SignalKind> = env
        .signal
        .verlauf(&env.raum)
        .iter()
        .filter(|n| n.sender_id == a.id)
        .map(|n| n.kind())
        .collect();
    assert_eq!(von_a.last(), Some(&SignalKind::Left));

    assert!(b.snapshot().await.sitzungen.is_empty());
    assert_eq!(env.medien.offene_verbindungen(), 0);
}

#[tokio::test(start_paused = true)]
async fn gestoerte_verbindung_wird_einmal_neu_aufgebaut() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    laufen_lassen(Duration::from_millis(100)).await;
    b.handle.join().await.unwrap();
    let vorher = warten_verbunden(&a, &["b"]).await;
    warten_verbunden(&b, &["a"]).await;
    let alte_sitzung = vorher.sitzung(&b.id).unwrap().sitzung;

    let spur_a = a.mikrofon.letzter_handle().unwrap().spur_id().to_string();
    let verbindung_a = env
        .medien
        .verbindungen()
        .into_iter()
        .find(|v| v.spur_id == spur_a)
        .unwrap();
    assert!(env.medien.stoeren(verbindung_a.id, ConnectionState::Failed));

    // Innerhalb der Gnadenfrist bleibt die Sitzung bestehen
    laufen_lassen(Duration::from_secs(2)).await;
    assert_eq!(a.snapshot().await.sitzung(&b.id).unwrap().sitzung, alte_sitzung);

    let nachher = warten_bis(&a, |s| {
        s.sitzung(&b.id)
            .is_some_and(|x| x.sitzung != alte_sitzung && x.zustand == SessionState::Connected)
    })
    .await;
    warten_verbunden(&b, &["a"]).await;

    assert_eq!(nachher.verbundene_peers(), vec![b.id.clone()]);
    assert_eq!(a.metriken.wiederanlaeufe.get(), 1);
    assert_eq!(
        a.metriken
            .sitzungen_fehlgeschlagen
            .with_label_values(&["verbindung"])
            .get(),
        1
    );
    assert!(a.ui.toasts().iter().all(|t| !t.contains("Verhandlung")));
    assert_eq!(env.gesendet("a", SignalKind::Joined).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn fehlgeschlagene_verhandlung_ist_begrenzt() {
    let env = Umgebung::neu();
    env.medien.fehler_setzen(Some(FehlerSchritt::Antwort));
    let a = env.teilnehmer("a").await;
    let b = env.teilnehmer("b").await;

    a.handle.join().await.unwrap();
    laufen_lassen(Duration::from_millis(100)).await;
    b.handle.join().await.unwrap();

    laufen_lassen(Duration::from_secs(90)).await;

    // Einziger entfernter Teilnehmer: Fehler wird angezeigt
    assert!(b.ui.toasts().iter().any(|t| t.contains("Verhandlung")));
    assert_eq!(a.metriken.wiederanlaeufe.get(), 1);
    assert_eq!(b.metriken.wiederanlaeufe.get(), 1);
    assert!(a.snapshot().await.verbundene_peers().is_empty());

    let joined_a = env.gesendet("a", SignalKind::Joined).len();
    let joined_b = env.gesendet("b", SignalKind::Joined).len();
    assert_eq!((joined_a, joined_b), (2, 2));

    // Keine weiteren Versuche
    laufen_lassen(Duration::from_secs(90)).await;
    assert_eq!(env.gesendet("a", SignalKind::Joined).len(), joined_a);
    assert_eq!(env.gesendet("b", SignalKind::Joined).len(), joined_b);
    assert!(a.snapshot().await.sitzungen.is_empty());
    assert!(b.snapshot().await.sitzungen.is_empty());
}

/// Beginnt im Namen von `von` eine Verhandlung mit einer Fremdverbindung
async fn fremd_anbieten(
    env: &Umgebung,
    an: &PeerId,
    von: &str,
    fremd: &Arc<dyn MediaConnection>,
) -> NegotiationId {
    let angebot = fremd.create_offer().await.unwrap();
    fremd.set_local_description(angebot.clone()).await.unwrap();
    let verhandlung = NegotiationId::new();
    let jetzt = env.uhr.jetzt_millis();
    fremd_senden(
        env,
        von,
        jetzt,
        SignalPayload::Offer {
            an: an.clone(),
            verhandlung,
            beschreibung: angebot,
        },
    )
    .await;
    fremd_senden(
        env,
        von,
        jetzt,
        SignalPayload::Candidate {
            an: an.clone(),
            verhandlung,
            kandidat: IceCandidate::neu(KANDIDAT),
        },
    )
    .await;
    verhandlung
}

/// Wendet Antwort und Kandidaten des Peers zu einer Verhandlung auf der
/// Fremdverbindung an
async fn fremd_abschliessen(
    env: &Umgebung,
    peer: &TestPeer,
    fremd: &Arc<dyn MediaConnection>,
    verhandlung: NegotiationId,
) {
    let mut antwort = None;
    for _ in 0..1000 {
        antwort = env
            .gesendet(peer.id.as_str(), SignalKind::Answer)
            .into_iter()
            .find_map(|n| match n.payload {
                SignalPayload::Answer {
                    verhandlung: v,
                    beschreibung,
                    ..
                } if v == verhandlung => Some(beschreibung),
                _ => None,
            });
        if antwort.is_some() {
            break;
        }
        laufen_lassen(Duration::from_millis(10)).await;
    }
    let antwort = antwort.expect("keine Antwort zur Verhandlung");
    // Kandidaten folgen der Antwort im selben Versand
    laufen_lassen(Duration::from_millis(50)).await;

    fremd.set_remote_description(antwort).await.unwrap();
    for nachricht in env.gesendet(peer.id.as_str(), SignalKind::Candidate) {
        if let SignalPayload::Candidate {
            verhandlung: v,
            kandidat,
            ..
        } = nachricht.payload
        {
            if v == verhandlung {
                fremd.add_ice_candidate(kandidat).await.unwrap();
            }
        }
    }
}

/// Offene Loopback-Verbindungen, die die Spur des Peers senden
fn eigene_verbindungen(env: &Umgebung, peer: &TestPeer) -> usize {
    let spur = peer.mikrofon.letzter_handle().unwrap().spur_id().to_string();
    env.medien
        .verbindungen()
        .iter()
        .filter(|v| v.spur_id == spur)
        .count()
}

#[tokio::test(start_paused = true)]
async fn neues_angebot_ersetzt_verbundene_sitzung() {
    let env = Umgebung::neu();
    let a = env.teilnehmer("a").await;
    a.handle.join().await.unwrap();
    let b = PeerId::neu("b");

    let erste = fremde_verbindung(&env);
    let v1 = fremd_anbieten(&env, &a.id, "b", &erste).await;
    fremd_abschliessen(&env, &a, &erste, v1).await;
    let vorher = warten_verbunden(&a, &["b"]).await;
    let alte_sitzung = vorher.sitzung(&b).unwrap().sitzung;
    assert_eq!(a.ui.wiedergaben(&b), 1);
    assert_eq!(eigene_verbindungen(&env, &a), 1);

    // b verhandelt ohne Left neu, z.B. nach einem Neustart
    let zweite = fremde_verbindung(&env);
    let v2 = fremd_anbieten(&env, &a.id, "b", &zweite).await;
    warten_bis(&a, |s| {
        s.sitzung(&b).is_some_and(|x| x.sitzung != alte_sitzung)
    })
    .await;

    // Alte Verbindung ist zu, die Wiedergabe wurde genau einmal beendet
    assert_eq!(a.ui.stopps(&b), 1);
    assert_eq!(eigene_verbindungen(&env, &a), 1);

    fremd_abschliessen(&env, &a, &zweite, v2).await;
    let nachher = warten_bis(&a, |s| {
        s.sitzung(&b)
            .is_some_and(|x| x.sitzung != alte_sitzung && x.zustand == SessionState::Connected)
    })
    .await;

    assert_eq!(nachher.sitzungen.len(), 1);
    assert_eq!(a.ui.wiedergaben(&b), 2);
    assert_eq!(a.ui.stopps(&b), 1);
    assert_eq!(a.metriken.verbindungen_hergestellt.get(), 2);
    assert_eq!(a.metriken.sitzungen_aktiv.get(), 1);
    assert_eq!(env.gesendet("a", SignalKind::Answer).len(), 2);
    // Ersetzen ist kein Fehlschlag, also auch kein Wiederanlauf
    assert_eq!(a.metriken.wiederanlaeufe.get(), 0);
    assert_eq!(env.gesendet("a", SignalKind::Joined).len(), 1);
}
