//! Wanduhr fuer Signal-Zeitstempel
//!
//! Signalnachrichten tragen eine Absendezeit in Millisekunden seit der
//! Unix-Epoche. Der Empfaenger vergleicht sie mit seiner eigenen Uhr, um
//! veraltete Nachrichten zu verwerfen. Tests ersetzen die Systemuhr durch
//! eine `ManualClock`, um Uhrenversatz gezielt einzustellen.

use parking_lot::Mutex;
use std::sync::Arc;

/// Quelle fuer die aktuelle Wanduhrzeit
pub trait Clock: Send + Sync + 'static {
    /// Millisekunden seit der Unix-Epoche
    fn jetzt_millis(&self) -> i64;
}

/// Systemuhr via chrono
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn jetzt_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manuell gestellte Uhr (Tests, Simulation)
///
/// Clone teilt den inneren Zeitstand.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<Mutex<i64>>,
}

impl ManualClock {
    /// Erstellt eine Uhr mit festem Startzeitpunkt
    pub fn neu(start_millis: i64) -> Self {
        Self {
            millis: Arc::new(Mutex::new(start_millis)),
        }
    }

    /// Stellt die Uhr vor (negative Werte stellen sie zurueck)
    pub fn vorstellen(&self, delta_millis: i64) {
        *self.millis.lock() += delta_millis;
    }

    /// Setzt die Uhr auf einen absoluten Wert
    pub fn setzen(&self, millis: i64) {
        *self.millis.lock() = millis;
    }
}

impl Clock for ManualClock {
    fn jetzt_millis(&self) -> i64 {
        *self.millis.lock()
    }
}
