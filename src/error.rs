use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Reader IO error: {0}")]
    ReaderIo(String),

    #[error("Card IO error: {0}")]
    CardIo(String),

    #[error("Unexpected status word: {0}")]
    UnexpectedStatusWord(String),

    #[error("Card detection timed out")]
    Timeout,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReaderError {
    pub fn reader_io(message: impl Into<String>) -> Self {
        Self::ReaderIo(message.into())
    }

    pub fn card_io(message: impl Into<String>) -> Self {
        Self::CardIo(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for errors that mean the card left the field or stopped answering.
    pub fn is_card_error(&self) -> bool {
        matches!(self, Self::CardIo(_))
    }
}

impl From<pcsc::Error> for ReaderError {
    fn from(err: pcsc::Error) -> Self {
        use pcsc::Error as E;
        match err {
            E::NoSmartcard
            | E::RemovedCard
            | E::ResetCard
            | E::UnpoweredCard
            | E::UnresponsiveCard
            | E::UnsupportedCard
            | E::ProtoMismatch => Self::CardIo(err.to_string()),
            E::Timeout => Self::Timeout,
            _ => Self::ReaderIo(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;
