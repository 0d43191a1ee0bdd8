//! Simuliertes Mikrofon
//!
//! Ersetzt die Plattform-Faehigkeit in Tests und in der lokalen Demo. Das
//! Verhalten beim Anfordern (erlauben, verweigern, kein Geraet) und eine
//! kuenstliche Verzoegerung sind zur Laufzeit einstellbar.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AudioError, AudioResult};
use crate::microphone::{AudioConstraints, LocalAudioHandle, Microphone};

/// Ergebnis der naechsten Mikrofon-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimVerhalten {
    Erlauben,
    Verweigern,
    KeinGeraet,
}

// ---------------------------------------------------------------------------
// SimulatedAudioHandle
// ---------------------------------------------------------------------------

/// Lokale Spur mit einstellbarem Energiepegel
pub struct SimulatedAudioHandle {
    spur_id: String,
    aktiv: AtomicBool,
    freigegeben: AtomicBool,
    pegel: Mutex<f32>,
}

impl SimulatedAudioHandle {
    pub fn neu() -> Self {
        Self {
            spur_id: format!("sim-{}", uuid::Uuid::new_v4()),
            aktiv: AtomicBool::new(true),
            freigegeben: AtomicBool::new(false),
            pegel: Mutex::new(0.0),
        }
    }

    /// Setzt die Energie, die jeder Frame-Wert liefert (0.0..1.0)
    pub fn pegel_setzen(&self, pegel: f32) {
        *self.pegel.lock() = pegel.clamp(0.0, 1.0);
    }

    pub fn ist_freigegeben(&self) -> bool {
        self.freigegeben.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedAudioHandle {
    fn default() -> Self {
        Self::neu()
    }
}

impl LocalAudioHandle for SimulatedAudioHandle {
    fn spur_id(&self) -> &str {
        &self.spur_id
    }

    fn set_enabled(&self, aktiv: bool) {
        self.aktiv.store(aktiv, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.aktiv.load(Ordering::SeqCst)
    }

    fn energie_lesen(&self, puffer: &mut [f32]) -> usize {
        if self.ist_freigegeben() {
            return 0;
        }
        let pegel = *self.pegel.lock();
        puffer.fill(pegel);
        puffer.len()
    }

    fn release(&self) {
        if !self.freigegeben.swap(true, Ordering::SeqCst) {
            tracing::debug!(spur = %self.spur_id, "Simuliertes Mikrofon freigegeben");
        }
    }
}

// ---------------------------------------------------------------------------
// SimulatedMicrophone
// ---------------------------------------------------------------------------

/// Mikrofon-Faehigkeit ohne echtes Geraet
pub struct SimulatedMicrophone {
    verhalten: Mutex<SimVerhalten>,
    verzoegerung: Mutex<Option<Duration>>,
    anfragen: AtomicUsize,
    letzter: Mutex<Option<Arc<SimulatedAudioHandle>>>,
}

impl SimulatedMicrophone {
    pub fn neu() -> Self {
        Self::mit_verhalten(SimVerhalten::Erlauben)
    }

    pub fn mit_verhalten(verhalten: SimVerhalten) -> Self {
        Self {
            verhalten: Mutex::new(verhalten),
            verzoegerung: Mutex::new(None),
            anfragen: AtomicUsize::new(0),
            letzter: Mutex::new(None),
        }
    }

    pub fn verhalten_setzen(&self, verhalten: SimVerhalten) {
        *self.verhalten.lock() = verhalten;
    }

    /// Verzoegert jede Anfrage (simuliert den Berechtigungsdialog)
    pub fn verzoegerung_setzen(&self, verzoegerung: Option<Duration>) {
        *self.verzoegerung.lock() = verzoegerung;
    }

    /// Zuletzt ausgegebener Handle
    pub fn letzter_handle(&self) -> Option<Arc<SimulatedAudioHandle>> {
        self.letzter.lock().clone()
    }

    pub fn anfragen(&self) -> usize {
        self.anfragen.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedMicrophone {
    fn default() -> Self {
        Self::neu()
    }
}

#[async_trait]
impl Microphone for SimulatedMicrophone {
    async fn acquire(
        &self,
        constraints: &AudioConstraints,
    ) -> AudioResult<Arc<dyn LocalAudioHandle>> {
        self.anfragen.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(?constraints, "Simuliertes Mikrofon angefordert");

        let verzoegerung = *self.verzoegerung.lock();
        if let Some(dauer) = verzoegerung {
            tokio::time::sleep(dauer).await;
        }

        let verhalten = *self.verhalten.lock();
        match verhalten {
            SimVerhalten::Verweigern => Err(AudioError::ZugriffVerweigert),
            SimVerhalten::KeinGeraet => Err(AudioError::KeinEingabegeraet),
            SimVerhalten::Erlauben => {
                let handle = Arc::new(SimulatedAudioHandle::neu());
                *self.letzter.lock() = Some(handle.clone());
                Ok(handle)
            }
        }
    }
}
