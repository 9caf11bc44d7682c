use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::multiplatform::MultiplatformNfcReader;
use crate::reader::PcscReader;
use crate::spi::LocalReader;
use napi::bindgen_prelude::*;
use napi::threadsafe_function::{ErrorStrategy, ThreadsafeFunction, ThreadsafeFunctionCallMode};
use napi::{Env, JsFunction, JsObject};
use napi_derive::napi;
use std::sync::Arc;

fn to_napi(err: ReaderError) -> napi::Error {
    napi::Error::new(napi::Status::GenericFailure, err.to_string())
}

/// PC/SC reader exposed to JavaScript
#[napi]
pub struct NfcReader {
    inner: Arc<MultiplatformNfcReader<PcscReader>>,
}

#[napi]
impl NfcReader {
    #[napi(constructor)]
    pub fn new(reader_name_filter: Option<String>) -> Result<Self> {
        let config = reader_name_filter
            .map(ReaderConfig::with_filter)
            .unwrap_or_default();
        let reader = PcscReader::new(config).map_err(to_napi)?;

        Ok(Self {
            inner: Arc::new(MultiplatformNfcReader::new(reader)),
        })
    }

    #[napi]
    pub fn name(&self) -> String {
        self.inner.name()
    }

    #[napi]
    pub fn set_scan_message(&self, message: String) {
        self.inner.set_scan_message(&message);
    }

    /// Resolves to true once a card is connected
    #[napi(ts_return_type = "Promise<boolean>")]
    pub fn wait_for_card_present(&self, env: Env) -> Result<JsObject> {
        let reader = Arc::clone(&self.inner);
        env.spawn_future(async move { reader.wait_for_card_present().await.map_err(to_napi) })
    }

    #[napi(ts_args_type = "onCardDetected: () => void")]
    pub fn start_card_detection(&self, on_card_detected: JsFunction) -> Result<()> {
        let tsfn: ThreadsafeFunction<(), ErrorStrategy::Fatal> = on_card_detected
            .create_threadsafe_function(0, |_ctx| Ok(Vec::<()>::new()))?;

        self.inner
            .start_card_detection(Box::new(move || {
                tsfn.call((), ThreadsafeFunctionCallMode::NonBlocking);
            }))
            .map_err(to_napi)
    }

    #[napi]
    pub fn open_physical_channel(&self) -> Result<()> {
        self.inner.open_physical_channel().map_err(to_napi)
    }

    #[napi]
    pub fn close_physical_channel(&self) {
        self.inner.close_physical_channel();
    }

    #[napi]
    pub fn get_power_on_data(&self) -> String {
        self.inner.get_power_on_data()
    }

    #[napi]
    pub fn transmit_apdu(&self, command: Buffer) -> Result<Buffer> {
        self.inner
            .transmit_apdu(command.as_ref())
            .map(Buffer::from)
            .map_err(to_napi)
    }

    /// JSON array of `{ name, card_present, atr }`
    #[napi]
    pub fn list_readers(&self) -> Result<String> {
        let readers = self.inner.inner().list_readers().map_err(to_napi)?;
        serde_json::to_string(&readers).map_err(|e| to_napi(e.into()))
    }

    #[napi]
    pub fn release(&self) {
        self.inner.release();
    }
}

/// Get library version
#[napi]
pub fn get_version() -> String {
    crate::utils::get_version()
}
