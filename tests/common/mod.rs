#![allow(dead_code)]

use async_trait::async_trait;
use keypleless_reader::{CardDetectedCallback, LocalNfcReader, ReaderError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// In-memory backend whose card detection and APDU responses are driven by the test.
pub struct ScriptedReader {
    pub script: Arc<Script>,
}

#[derive(Default)]
pub struct Script {
    /// When set, `wait_for_card_present` blocks until `proceed` is notified.
    pub hold_wait: AtomicBool,
    pub fail_detection: AtomicBool,
    pub entered: Notify,
    pub proceed: Notify,
    pub released: AtomicBool,
    pub release_count: AtomicUsize,
    pub channel_open: AtomicBool,
    pub scan_message: Mutex<String>,
    pub pending_callback: Mutex<Option<CardDetectedCallback>>,
    pub responses: Mutex<VecDeque<std::result::Result<Vec<u8>, String>>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl Script {
    pub fn respond(&self, response: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_vec()));
    }

    pub fn fail_next(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Simulates the card entering the field during a detection.
    pub fn fire_detection(&self) -> bool {
        let callback = self.pending_callback.lock().unwrap().take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl ScriptedReader {
    pub fn new() -> (Self, Arc<Script>) {
        let script = Arc::new(Script::default());
        (
            Self {
                script: Arc::clone(&script),
            },
            script,
        )
    }
}

#[async_trait]
impl LocalNfcReader for ScriptedReader {
    fn scan_message(&self) -> String {
        self.script.scan_message.lock().unwrap().clone()
    }

    fn set_scan_message(&self, message: &str) {
        *self.script.scan_message.lock().unwrap() = message.to_string();
    }

    fn name(&self) -> String {
        "Scripted".to_string()
    }

    async fn wait_for_card_present(&self) -> Result<bool> {
        self.script.released.store(false, Ordering::SeqCst);
        if self.script.hold_wait.load(Ordering::SeqCst) {
            self.script.entered.notify_one();
            self.script.proceed.notified().await;
        }
        Ok(!self.script.released.load(Ordering::SeqCst))
    }

    fn start_card_detection(&self, on_card_detected: CardDetectedCallback) -> Result<()> {
        if self.script.fail_detection.load(Ordering::SeqCst) {
            return Err(ReaderError::reader_io("No reader available"));
        }
        *self.script.pending_callback.lock().unwrap() = Some(on_card_detected);
        Ok(())
    }

    fn open_physical_channel(&self) -> Result<()> {
        self.script.channel_open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close_physical_channel(&self) {
        self.script.channel_open.store(false, Ordering::SeqCst);
    }

    fn get_power_on_data(&self) -> String {
        "3B8F8001804F0CA000000306030001000000006A".to_string()
    }

    fn transmit_apdu(&self, command_apdu: &[u8]) -> Result<Vec<u8>> {
        if !self.script.channel_open.load(Ordering::SeqCst) {
            return Err(ReaderError::card_io("Physical channel is not open"));
        }
        self.script.sent.lock().unwrap().push(command_apdu.to_vec());
        match self.script.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ReaderError::CardIo(message)),
            None => Ok(vec![0x90, 0x00]),
        }
    }

    fn release_reader(&self) {
        self.script.release_count.fetch_add(1, Ordering::SeqCst);
        self.script.released.store(true, Ordering::SeqCst);
        self.script.channel_open.store(false, Ordering::SeqCst);
        self.script.pending_callback.lock().unwrap().take();
        self.script.proceed.notify_one();
    }
}
