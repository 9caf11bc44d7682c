use chrono::{DateTime, Utc};
use pcsc::{Protocols, ShareMode};
use serde::{Deserialize, Serialize};

/// Transmission protocol requested when connecting to a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardProtocol {
    T0,
    #[default]
    T1,
    Any,
}

impl CardProtocol {
    pub(crate) fn to_pcsc(self) -> Protocols {
        match self {
            CardProtocol::T0 => Protocols::T0,
            CardProtocol::T1 => Protocols::T1,
            CardProtocol::Any => Protocols::ANY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardShareMode {
    #[default]
    Shared,
    Exclusive,
}

impl CardShareMode {
    pub(crate) fn to_pcsc(self) -> ShareMode {
        match self {
            CardShareMode::Shared => ShareMode::Shared,
            CardShareMode::Exclusive => ShareMode::Exclusive,
        }
    }
}

/// Snapshot of one reader as reported by the PC/SC service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    pub name: String,
    pub card_present: bool,
    /// Hex ATR when a card is in the field.
    pub atr: Option<String>,
}

/// Recorded each time a card gets connected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPresence {
    pub reader_name: String,
    pub atr: String,
    pub detected_at: DateTime<Utc>,
}
