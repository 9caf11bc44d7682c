//! Keyple-less local reader library.
//!
//! Gives a host application exclusive access to a local smart card reader:
//! card detection, physical channel management and raw APDU exchange. PC/SC
//! readers are supported out of the box through [`PcscReader`]; other
//! hardware plugs in by implementing [`LocalNfcReader`].
//!
//! ```no_run
//! use keypleless_reader::{LocalReader, MultiplatformNfcReader, PcscReader, ReaderConfig};
//!
//! # async fn run() -> keypleless_reader::Result<()> {
//! let reader = MultiplatformNfcReader::new(PcscReader::new(ReaderConfig::default())?);
//! if reader.wait_for_card_present().await? {
//!     reader.open_physical_channel()?;
//!     let response = reader.transmit_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x00])?;
//!     println!("{}", keypleless_reader::to_hex(&response));
//!     reader.close_physical_channel();
//! }
//! reader.release();
//! # Ok(())
//! # }
//! ```

pub mod card;
pub mod config;
pub mod error;
pub mod logger;
pub mod multiplatform;
pub mod reader;
pub mod spi;
pub mod types;
pub mod utils;

#[cfg(feature = "node")]
mod node;

pub use card::{
    exchange, transmit_with_retry, transmit_with_retry_async, ApduResponse, ExchangeOptions,
};
pub use config::ReaderConfig;
pub use error::{ReaderError, Result};
pub use multiplatform::MultiplatformNfcReader;
pub use reader::PcscReader;
pub use spi::{CardDetectedCallback, LocalNfcReader, LocalReader};
pub use types::{CardPresence, CardProtocol, CardShareMode, ReaderInfo};
pub use utils::{get_version, parse_hex, to_hex};
