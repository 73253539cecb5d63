//! UART byte link (ESP-IDF only).
//!
//! Wraps the two halves of an `esp_idf_hal` UART driver. Reads wait at
//! most one poll interval so the receive unit can observe stop requests.

use std::time::Duration;

use esp_idf_hal::delay::TickType;
use esp_idf_hal::uart::{UartDriver, UartRxDriver, UartTxDriver};

use crate::error::LinkError;
use crate::rpc::transport::{LinkRx, LinkTx};

pub struct UartRx {
    rx: UartRxDriver<'static>,
    poll_ticks: u32,
}

pub struct UartTx {
    tx: UartTxDriver<'static>,
    flush_ticks: u32,
}

/// Split a configured UART driver into link halves.
pub fn split(driver: UartDriver<'static>, poll: Duration) -> (UartRx, UartTx) {
    let ticks = TickType::from(poll).ticks();
    let (tx, rx) = driver.into_split();
    (
        UartRx {
            rx,
            poll_ticks: ticks,
        },
        UartTx {
            tx,
            flush_ticks: ticks.saturating_mul(10),
        },
    )
}

impl LinkRx for UartRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.rx.read(buf, self.poll_ticks) {
            Ok(n) => Ok(n),
            Err(e) if e.code() == esp_idf_sys::ESP_ERR_TIMEOUT => Ok(0),
            Err(e) => Err(LinkError::Io(e.to_string())),
        }
    }
}

impl LinkTx for UartTx {
    fn write_all(&mut self, mut data: &[u8]) -> Result<(), LinkError> {
        while !data.is_empty() {
            let n = self
                .tx
                .write(data)
                .map_err(|e| LinkError::Io(e.to_string()))?;
            data = &data[n..];
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        self.tx
            .wait_done(self.flush_ticks)
            .map_err(|e| LinkError::Io(e.to_string()))
    }
}
