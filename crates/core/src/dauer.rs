//! Serde-Hilfe: `Duration` als ganze Millisekunden
//!
//! Verwendung: `#[serde(with = "jasus_core::dauer")]`

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S: Serializer>(dauer: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(dauer.as_millis() as u64)
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(d)?))
}
