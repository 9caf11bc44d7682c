use crate::error::{ReaderError, Result};
use crate::spi::{CardDetectedCallback, LocalNfcReader, LocalReader};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// [`LocalReader`] over any platform backend, granting one operation at a time.
///
/// Guarded operations fail fast with `ReaderIo("Reader is already in use")`
/// instead of queueing behind the current holder.
pub struct MultiplatformNfcReader<R: LocalNfcReader> {
    nfc_reader: R,
    lock: Arc<Mutex<()>>,
}

impl<R: LocalNfcReader> MultiplatformNfcReader<R> {
    pub fn new(nfc_reader: R) -> Self {
        Self {
            nfc_reader,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Access to the backend for the operations the reader contract does not cover.
    pub fn inner(&self) -> &R {
        &self.nfc_reader
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    fn acquire(&self) -> Result<OwnedMutexGuard<()>> {
        self.lock
            .clone()
            .try_lock_owned()
            .map_err(|_| ReaderError::reader_io("Reader is already in use"))
    }
}

#[async_trait]
impl<R: LocalNfcReader> LocalReader for MultiplatformNfcReader<R> {
    fn name(&self) -> String {
        self.nfc_reader.name()
    }

    fn set_scan_message(&self, message: &str) {
        self.nfc_reader.set_scan_message(message);
    }

    async fn wait_for_card_present(&self) -> Result<bool> {
        let _guard = self.acquire()?;
        self.nfc_reader.wait_for_card_present().await
    }

    fn start_card_detection(&self, on_card_detected: CardDetectedCallback) -> Result<()> {
        let guard = self.acquire()?;
        // The guard travels with the callback: it is released right before the
        // user callback runs, or when a cancelled detection drops the callback.
        let callback: CardDetectedCallback = Box::new(move || {
            debug!("Card found");
            drop(guard);
            on_card_detected();
        });
        self.nfc_reader.start_card_detection(callback)
    }

    fn open_physical_channel(&self) -> Result<()> {
        let _guard = self.acquire()?;
        self.nfc_reader.open_physical_channel()
    }

    fn close_physical_channel(&self) {
        self.nfc_reader.close_physical_channel();
    }

    fn get_power_on_data(&self) -> String {
        self.nfc_reader.get_power_on_data()
    }

    fn transmit_apdu(&self, command_apdu: &[u8]) -> Result<Vec<u8>> {
        let _guard = self.acquire()?;
        self.nfc_reader.transmit_apdu(command_apdu)
    }

    fn release(&self) {
        self.nfc_reader.release_reader();
    }
}
