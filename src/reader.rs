use crate::config::ReaderConfig;
use crate::error::{ReaderError, Result};
use crate::spi::{CardDetectedCallback, LocalNfcReader};
use crate::types::{CardPresence, ReaderInfo};
use crate::utils::to_hex;
use async_trait::async_trait;
use chrono::Utc;
use pcsc::{Context, Disposition, ReaderState, Scope, State, MAX_BUFFER_SIZE_EXTENDED};
use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// PC/SC backend for Windows, macOS and Linux readers.
pub struct PcscReader {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: Context,
    config: ReaderConfig,
    slot: Mutex<ReaderSlot>,
    // Bumped by release; a detection started under an older value gives up.
    generation: AtomicU64,
}

struct ReaderSlot<C = pcsc::Card> {
    reader: Option<CString>,
    name: String,
    scan_message: String,
    card: Option<C>,
    channel_open: bool,
    last_presence: Option<CardPresence>,
}

impl<C> ReaderSlot<C> {
    fn new(name: String, scan_message: String) -> Self {
        Self {
            reader: None,
            name,
            scan_message,
            card: None,
            channel_open: false,
            last_presence: None,
        }
    }

    /// Stores a freshly connected card.
    ///
    /// Returns the card the caller must disconnect: the new one when the
    /// detection was released meanwhile, otherwise any card it replaces.
    /// Dropping a `pcsc::Card` resets it, so nothing is dropped here.
    fn install(&mut self, card: C, atr: String, current: bool) -> Option<C> {
        if !current {
            return Some(card);
        }
        self.last_presence = Some(CardPresence {
            reader_name: self.name.clone(),
            atr,
            detected_at: Utc::now(),
        });
        self.channel_open = false;
        self.card.replace(card)
    }
}

/// What a reader event state means for a pending detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardEvent {
    Waiting,
    Present,
    ReaderGone,
}

fn classify_event(state: State) -> CardEvent {
    if state.intersects(State::UNKNOWN | State::UNAVAILABLE) {
        CardEvent::ReaderGone
    } else if state.contains(State::PRESENT) && !state.contains(State::MUTE) {
        CardEvent::Present
    } else {
        CardEvent::Waiting
    }
}

/// Timeout of the next status-change call, bounded by the detection deadline.
fn poll_budget(
    deadline: Option<Instant>,
    now: Instant,
    poll_interval: Duration,
) -> Result<Duration> {
    match deadline {
        Some(deadline) if now >= deadline => Err(ReaderError::Timeout),
        Some(deadline) => Ok((deadline - now).min(poll_interval)),
        None => Ok(poll_interval),
    }
}

/// `Ok(true)` to poll again, `Ok(false)` when the wait was cancelled.
fn on_status_error(err: pcsc::Error) -> Result<bool> {
    match err {
        pcsc::Error::Timeout => Ok(true),
        pcsc::Error::Cancelled => Ok(false),
        e => Err(e.into()),
    }
}

fn superseded(generation: &AtomicU64, started: u64) -> bool {
    generation.load(Ordering::SeqCst) != started
}

impl PcscReader {
    pub fn new(config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        let ctx = Context::establish(Scope::User).map_err(|e| {
            ReaderError::reader_io(format!("Failed to establish PC/SC context: {}", e))
        })?;

        let slot = ReaderSlot::new(config.name.clone(), config.scan_message.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                ctx,
                config,
                slot: Mutex::new(slot),
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn with_filter(reader_name_filter: &str) -> Result<Self> {
        Self::new(ReaderConfig::with_filter(reader_name_filter))
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.inner.config
    }

    /// List available card readers with their current card state
    pub fn list_readers(&self) -> Result<Vec<ReaderInfo>> {
        let readers = self.inner.reader_names()?;
        if readers.is_empty() {
            return Ok(Vec::new());
        }

        let mut states: Vec<ReaderState> = readers
            .iter()
            .map(|r| ReaderState::new(r.clone(), State::UNAWARE))
            .collect();
        self.inner
            .ctx
            .get_status_change(Duration::from_secs(0), &mut states)?;

        Ok(states
            .iter()
            .map(|rs| {
                let present = rs.event_state().contains(State::PRESENT);
                ReaderInfo {
                    name: rs.name().to_string_lossy().into_owned(),
                    card_present: present,
                    atr: present.then(|| to_hex(rs.atr())),
                }
            })
            .collect())
    }

    /// The last card connected by this reader, if any.
    pub fn last_presence(&self) -> Option<CardPresence> {
        self.inner.slot().last_presence.clone()
    }

    pub fn is_card_connected(&self) -> bool {
        self.inner.slot().card.is_some()
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, ReaderSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reader_names(&self) -> Result<Vec<CString>> {
        match self.ctx.list_readers_owned() {
            Ok(readers) => Ok(readers),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(e) => Err(ReaderError::reader_io(format!("Failed to list readers: {}", e))),
        }
    }

    fn select_reader(&self) -> Result<Option<CString>> {
        let mut slot = self.slot();
        if let Some(reader) = &slot.reader {
            return Ok(Some(reader.clone()));
        }

        let readers = self.reader_names()?;
        let names: Vec<String> = readers
            .iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect();
        debug!(readers = ?names, "Readers detected");

        let Some(index) = pick_reader(&names, &self.config) else {
            return Ok(None);
        };
        debug!("Using reader: {}", names[index]);
        slot.reader = Some(readers[index].clone());
        slot.name = names[index].clone();
        Ok(slot.reader.clone())
    }

    /// Blocks until a usable card is in the field. `Ok(false)` when cancelled.
    fn await_card(&self, reader: &CStr, generation: u64) -> Result<bool> {
        let poll_interval = self.config.poll_interval();
        let deadline = self.config.detection_timeout().map(|t| Instant::now() + t);
        let mut states = [ReaderState::new(reader.to_owned(), State::UNAWARE)];

        loop {
            if superseded(&self.generation, generation) {
                return Ok(false);
            }

            let timeout = poll_budget(deadline, Instant::now(), poll_interval)?;
            if let Err(e) = self.ctx.get_status_change(timeout, &mut states) {
                if on_status_error(e)? {
                    continue;
                }
                return Ok(false);
            }

            match classify_event(states[0].event_state()) {
                CardEvent::Present => return Ok(true),
                CardEvent::ReaderGone => {
                    self.slot().reader = None;
                    return Err(ReaderError::reader_io("Reader is no longer available"));
                }
                CardEvent::Waiting => states[0].sync_current_state(),
            }
        }
    }

    /// `Ok(false)` when the detection was released while connecting.
    fn connect_card(&self, reader: &CStr, generation: u64) -> Result<bool> {
        // A handle still open from an earlier detection would reset the card
        // (shared mode) or block the new connection (exclusive mode).
        self.close_card();

        let card = self.ctx.connect(
            reader,
            self.config.share_mode.to_pcsc(),
            self.config.protocol.to_pcsc(),
        )?;
        let atr = card
            .status2_owned()
            .map(|status| to_hex(status.atr()))
            .unwrap_or_default();

        let mut slot = self.slot();
        let current = !superseded(&self.generation, generation);
        if current {
            debug!(reader = %slot.name, atr = %atr, "Card present");
        }
        let stale = slot.install(card, atr, current);
        drop(slot);

        if let Some(card) = stale {
            disconnect(card);
        }
        Ok(current)
    }

    fn detect_on(&self, reader: &CStr, generation: u64) -> Result<bool> {
        if !self.await_card(reader, generation)? || !self.connect_card(reader, generation)? {
            debug!("Card detection cancelled");
            return Ok(false);
        }
        Ok(true)
    }

    fn close_card(&self) {
        let card = {
            let mut slot = self.slot();
            slot.channel_open = false;
            slot.card.take()
        };
        if let Some(card) = card {
            disconnect(card);
            debug!("Card closed");
        }
    }
}

fn disconnect(card: pcsc::Card) {
    if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
        debug!(error = %e, "Ignoring disconnect failure");
    }
}

/// Index of the reader to use: the first one, unless the filter names another.
fn pick_reader(names: &[String], config: &ReaderConfig) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    if config.matches_any_reader() {
        return Some(0);
    }

    let filter = config.reader_name_filter.to_lowercase();
    match names
        .iter()
        .position(|name| name.to_lowercase().contains(&filter))
    {
        Some(index) => Some(index),
        None => {
            warn!(
                filter = %config.reader_name_filter,
                "No reader matches the filter, using the first one"
            );
            Some(0)
        }
    }
}

#[async_trait]
impl LocalNfcReader for PcscReader {
    fn scan_message(&self) -> String {
        self.inner.slot().scan_message.clone()
    }

    // PC/SC readers have no display; the message is only stored.
    fn set_scan_message(&self, message: &str) {
        self.inner.slot().scan_message = message.to_string();
    }

    fn name(&self) -> String {
        self.inner.slot().name.clone()
    }

    async fn wait_for_card_present(&self) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        let generation = inner.generation.load(Ordering::SeqCst);

        tokio::task::spawn_blocking(move || match inner.select_reader()? {
            Some(reader) => inner.detect_on(&reader, generation),
            None => {
                debug!("No reader available");
                Ok(false)
            }
        })
        .await
        .map_err(|e| ReaderError::reader_io(format!("Card detection task failed: {}", e)))?
    }

    fn start_card_detection(&self, on_card_detected: CardDetectedCallback) -> Result<()> {
        let reader = self
            .inner
            .select_reader()?
            .ok_or_else(|| ReaderError::reader_io("No reader available"))?;
        let inner = Arc::clone(&self.inner);
        let generation = inner.generation.load(Ordering::SeqCst);

        std::thread::Builder::new()
            .name("pcsc-card-detection".to_string())
            .spawn(move || match inner.detect_on(&reader, generation) {
                Ok(true) => on_card_detected(),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Card detection failed"),
            })
            .map_err(|e| {
                ReaderError::reader_io(format!("Failed to start card detection: {}", e))
            })?;
        Ok(())
    }

    fn open_physical_channel(&self) -> Result<()> {
        let mut slot = self.inner.slot();
        if slot.card.is_none() {
            return Err(ReaderError::card_io("No card connected"));
        }
        slot.channel_open = true;
        debug!("Physical channel open");
        Ok(())
    }

    fn close_physical_channel(&self) {
        self.inner.close_card();
    }

    /// Uppercase hex ATR, e.g. `3B8F8001...`; compare case-insensitively with
    /// readers that report lowercase.
    fn get_power_on_data(&self) -> String {
        self.inner
            .slot()
            .card
            .as_ref()
            .and_then(|card| card.status2_owned().ok())
            .map(|status| to_hex(status.atr()))
            .unwrap_or_default()
    }

    fn transmit_apdu(&self, command_apdu: &[u8]) -> Result<Vec<u8>> {
        let slot = self.inner.slot();
        let card = match (&slot.card, slot.channel_open) {
            (Some(card), true) => card,
            _ => return Err(ReaderError::card_io("Physical channel is not open")),
        };

        debug!("----> {}", to_hex(command_apdu));
        let mut buffer = vec![0u8; MAX_BUFFER_SIZE_EXTENDED];
        let response = card.transmit(command_apdu, &mut buffer)?.to_vec();
        debug!("<---- {}", to_hex(&response));
        Ok(response)
    }

    fn release_reader(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.inner.ctx.cancel() {
            debug!(error = %e, "Nothing to cancel");
        }
        self.inner.close_card();
        self.inner.slot().reader = None;
        debug!("Reader closed");
    }
}
