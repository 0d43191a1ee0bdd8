//! SignalingChannel – Vertrag des Raum-Logs
//!
//! - `append` ist fire-and-forget: mindestens einmalige Zustellung an alle
//!   aktuellen und kuenftigen Abonnenten, keine Bestaetigung.
//! - Nachrichten desselben Absenders kommen in Sendereihenfolge an,
//!   zwischen verschiedenen Absendern gibt es keine Ordnung.
//! - `subscribe` liefert einen unbegrenzten Strom ab "jetzt"; es gibt keine
//!   historische Wiedergabe.
//! - Zustellung darf beliebig verzoegert werden oder ausfallen.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use jasus_core::RoomCode;
use jasus_protocol::SignalingMessage;

use crate::error::SignalingResult;

/// Strom eingehender Signalnachrichten eines Raums
pub type SignalStream = BoxStream<'static, SignalingMessage>;

/// Append-only, multi-writer Signal-Log pro Raum
#[async_trait]
pub trait SignalingChannel: Send + Sync + 'static {
    /// Haengt eine Nachricht an das Log des Raums an
    async fn append(&self, raum: &RoomCode, nachricht: SignalingMessage) -> SignalingResult<()>;

    /// Abonniert alle ab jetzt angehaengten Nachrichten des Raums
    async fn subscribe(&self, raum: &RoomCode) -> SignalingResult<SignalStream>;
}
