use crate::error::Result;
use async_trait::async_trait;

/// Invoked once, from a background context, when a card has been detected.
pub type CardDetectedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Platform backend driving one physical reader.
///
/// Methods take `&self` so that `release_reader` can interrupt a pending
/// wait running on another task.
#[async_trait]
pub trait LocalNfcReader: Send + Sync {
    fn scan_message(&self) -> String;

    fn set_scan_message(&self, message: &str);

    fn name(&self) -> String;

    /// Suspends until a card is detected and connected.
    ///
    /// Returns `false` when there is no reader to wait on, or when the wait
    /// was cancelled by [`release_reader`](Self::release_reader).
    async fn wait_for_card_present(&self) -> Result<bool>;

    /// Starts monitoring the reader and returns immediately.
    ///
    /// `on_card_detected` runs once a card is connected. A cancelled
    /// detection drops the callback without calling it.
    fn start_card_detection(&self, on_card_detected: CardDetectedCallback) -> Result<()>;

    /// Fails with `CardIo` when no card is connected.
    fn open_physical_channel(&self) -> Result<()>;

    /// The channel may already be gone after a card withdrawal, so this never fails.
    fn close_physical_channel(&self);

    /// Power-on data (ATR) of the connected card as uppercase hex, or an empty string.
    fn get_power_on_data(&self) -> String;

    /// Sends a command APDU and returns the response, status word included.
    fn transmit_apdu(&self, command_apdu: &[u8]) -> Result<Vec<u8>>;

    /// Stops polling and releases resources, leaving the reader reusable.
    fn release_reader(&self);
}

/// The reader contract consumed by Keyple-less clients.
#[async_trait]
pub trait LocalReader: Send + Sync {
    fn name(&self) -> String;

    /// Scan instructions shown to the user, on readers able to display them.
    fn set_scan_message(&self, message: &str);

    async fn wait_for_card_present(&self) -> Result<bool>;

    fn start_card_detection(&self, on_card_detected: CardDetectedCallback) -> Result<()>;

    fn open_physical_channel(&self) -> Result<()>;

    fn close_physical_channel(&self);

    fn get_power_on_data(&self) -> String;

    fn transmit_apdu(&self, command_apdu: &[u8]) -> Result<Vec<u8>>;

    fn release(&self);
}
