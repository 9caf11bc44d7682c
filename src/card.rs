use crate::error::{ReaderError, Result};
use crate::spi::LocalReader;
use crate::utils::to_hex;
use std::time::Duration;
use tracing::debug;

const SW_SUCCESS: u16 = 0x9000;
const SW1_MORE_DATA: u8 = 0x61;

/// Response APDU split into data and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ApduResponse {
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let Some((data, sw)) = raw.split_last_chunk::<2>() else {
            return Err(ReaderError::card_io(format!(
                "Response too short: {}",
                to_hex(raw)
            )));
        };
        Ok(Self {
            data: data.to_vec(),
            sw1: sw[0],
            sw2: sw[1],
        })
    }

    pub fn status_word(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    pub fn is_success(&self) -> bool {
        self.status_word() == SW_SUCCESS
    }

    /// SW1 = 0x61: SW2 more bytes are waiting for a GET RESPONSE.
    pub fn has_more_data(&self) -> bool {
        self.sw1 == SW1_MORE_DATA
    }

    pub fn expect_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ReaderError::UnexpectedStatusWord(format!(
                "{:04X}",
                self.status_word()
            )))
        }
    }

    /// Data followed by SW1 SW2, as the card sent it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 2);
        bytes.extend_from_slice(&self.data);
        bytes.push(self.sw1);
        bytes.push(self.sw2);
        bytes
    }
}

/// `00 C0 00 00 Le`
pub fn get_response_command(le: u8) -> [u8; 5] {
    [0x00, 0xC0, 0x00, 0x00, le]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOptions {
    pub max_get_response: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            max_get_response: 3,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Transmit APDU command with automatic GET RESPONSE handling
pub fn exchange<R>(reader: &R, command: &[u8], options: &ExchangeOptions) -> Result<ApduResponse>
where
    R: LocalReader + ?Sized,
{
    let mut response = ApduResponse::from_bytes(&reader.transmit_apdu(command)?)?;
    let mut get_response_count = 0;

    while response.has_more_data() && get_response_count < options.max_get_response {
        debug!(remaining = response.sw2, "Fetching pending response data");
        let next = ApduResponse::from_bytes(
            &reader.transmit_apdu(&get_response_command(response.sw2))?,
        )?;
        get_response_count += 1;

        let mut data = std::mem::take(&mut response.data);
        data.extend_from_slice(&next.data);
        response = ApduResponse { data, ..next };
    }

    Ok(response)
}

/// True when the attempt needs no retry.
fn settled(attempt: u32, result: &Result<ApduResponse>) -> bool {
    match result {
        Ok(response) if response.is_success() || response.has_more_data() => true,
        Ok(response) => {
            debug!(
                attempt,
                sw = %to_hex(&[response.sw1, response.sw2]),
                "Unexpected status word"
            );
            false
        }
        Err(e) => {
            debug!(attempt, error = %e, "APDU exchange failed");
            false
        }
    }
}

fn retries_exhausted() -> ReaderError {
    ReaderError::card_io("Failed to transmit APDU after retries")
}

/// Transmit APDU command with retry logic
///
/// Errors and failing status words are retried after `retry_delay`; the last
/// outcome is returned once attempts run out. The delay blocks the calling
/// thread: from async code use [`transmit_with_retry_async`].
pub fn transmit_with_retry<R>(
    reader: &R,
    command: &[u8],
    options: &ExchangeOptions,
) -> Result<ApduResponse>
where
    R: LocalReader + ?Sized,
{
    let attempts = options.max_retries.max(1);
    let mut last = None;

    for attempt in 0..attempts {
        let result = exchange(reader, command, options);
        if settled(attempt, &result) {
            return result;
        }
        last = Some(result);
        if attempt + 1 < attempts {
            std::thread::sleep(options.retry_delay);
        }
    }

    last.unwrap_or_else(|| Err(retries_exhausted()))
}

/// Same as [`transmit_with_retry`], waiting on the tokio timer between attempts.
pub async fn transmit_with_retry_async<R>(
    reader: &R,
    command: &[u8],
    options: &ExchangeOptions,
) -> Result<ApduResponse>
where
    R: LocalReader + ?Sized,
{
    let attempts = options.max_retries.max(1);
    let mut last = None;

    for attempt in 0..attempts {
        let result = exchange(reader, command, options);
        if settled(attempt, &result) {
            return result;
        }
        last = Some(result);
        if attempt + 1 < attempts {
            tokio::time::sleep(options.retry_delay).await;
        }
    }

    last.unwrap_or_else(|| Err(retries_exhausted()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_data_and_status_word() {
        let response = ApduResponse::from_bytes(&[0x01, 0x02, 0x90, 0x00]).unwrap();
        assert_eq!(response.data, vec![0x01, 0x02]);
        assert_eq!(response.status_word(), 0x9000);
        assert!(response.is_success());
        assert_eq!(response.to_bytes(), vec![0x01, 0x02, 0x90, 0x00]);
    }

    #[test]
    fn status_word_only_response_has_empty_data() {
        let response = ApduResponse::from_bytes(&[0x6A, 0x82]).unwrap();
        assert!(response.data.is_empty());
        assert!(!response.is_success());
    }

    #[test]
    fn one_byte_response_is_a_card_error() {
        let err = ApduResponse::from_bytes(&[0x90]).unwrap_err();
        assert!(err.is_card_error());
    }

    #[test]
    fn expect_success_reports_status_word_in_hex() {
        let err = ApduResponse::from_bytes(&[0x6A, 0x82])
            .unwrap()
            .expect_success()
            .unwrap_err();
        match err {
            ReaderError::UnexpectedStatusWord(sw) => assert_eq!(sw, "6A82"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn more_data_status() {
        let response = ApduResponse::from_bytes(&[0x61, 0x10]).unwrap();
        assert!(response.has_more_data());
        assert_eq!(get_response_command(response.sw2), [0x00, 0xC0, 0x00, 0x00, 0x10]);
    }
}
