//! The serial link to the coil bed's microcontroller.
//!
//! One newline-terminated ASCII line per send. The controller may echo a
//! status line back; we surface it for display but never parse it. Transport
//! faults are the caller's to drop or retry; they must not touch grid state.

use std::io::{Read, Write};
use std::time::Duration;

use anyhow::Context;

pub trait Transport {
    fn send(&mut self, line: &[u8]) -> anyhow::Result<()>;
    /// Returns one echoed line from the device, if a complete one is waiting.
    fn poll_echo(&mut self) -> anyhow::Result<Option<String>>;
}

pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    echo_buf: Vec<u8>,
}

impl SerialLink {
    /// Tries each candidate port in order. The originals give the firmware a
    /// moment to settle after opening before the first write.
    pub fn open(candidates: &[String], baud: u32) -> anyhow::Result<SerialLink> {
        for path in candidates {
            match serialport::new(path, baud)
                .timeout(Duration::from_millis(10))
                .open()
            {
                Ok(port) => {
                    log::info!("serial opened: {path}");
                    std::thread::sleep(Duration::from_millis(1500));
                    return Ok(SerialLink {
                        port,
                        echo_buf: Vec::new(),
                    });
                }
                Err(e) => {
                    log::debug!("could not open {path}: {e}");
                }
            }
        }
        anyhow::bail!("no serial port could be opened (tried {})", candidates.len())
    }
}

impl Transport for SerialLink {
    fn send(&mut self, line: &[u8]) -> anyhow::Result<()> {
        self.port.write_all(line).context("serial write failed")?;
        Ok(())
    }

    fn poll_echo(&mut self) -> anyhow::Result<Option<String>> {
        let waiting = self.port.bytes_to_read().context("serial status failed")?;
        if waiting > 0 {
            let mut buf = vec![0u8; waiting as usize];
            let n = self.port.read(&mut buf).context("serial read failed")?;
            self.echo_buf.extend_from_slice(&buf[..n]);
        }
        if let Some(pos) = self.echo_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.echo_buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim_end().to_string();
            return Ok(Some(text));
        }
        Ok(None)
    }
}

/// Stands in for the hardware when no port is available; every line goes to
/// the log instead of the wire.
pub struct MockLink;

impl Transport for MockLink {
    fn send(&mut self, line: &[u8]) -> anyhow::Result<()> {
        log::debug!("mock send: {}", String::from_utf8_lossy(line).trim_end());
        Ok(())
    }

    fn poll_echo(&mut self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}
