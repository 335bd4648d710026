//! Flow-control window arithmetic shared by connection- and stream-level
//! windows (§3, RFC 9113 §6.9).
//!
//! The window is a signed quantity: a SETTINGS_INITIAL_WINDOW_SIZE change
//! can drive an already-open stream's window negative, and it must stay
//! usable (just refusing sends) until enough WINDOW_UPDATEs bring it back
//! above zero.

use super::frame::error_code;
use super::Error;

pub const MAX_WINDOW_SIZE: i64 = (1 << 31) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowWindow {
    size: i64,
}

impl FlowWindow {
    pub fn new(initial: u32) -> FlowWindow {
        FlowWindow { size: initial as i64 }
    }

    pub fn available(&self) -> i64 {
        self.size
    }

    /// Subtracts `n` sent/received bytes. Callers are expected to have
    /// already checked `available() >= n` before sending; receiving more
    /// than advertised is the peer's protocol violation, surfaced by
    /// returning an error here too.
    pub fn consume(&mut self, n: u32) -> Result<(), Error> {
        let n = n as i64;
        if n > self.size {
            return Err(Error::connection(error_code::FLOW_CONTROL_ERROR));
        }
        self.size -= n;
        Ok(())
    }

    /// Applies a WINDOW_UPDATE increment, rejecting overflow past 2^31-1
    /// per §6.9.1.
    pub fn increment(&mut self, n: u32) -> Result<(), Error> {
        let new_size = self.size + n as i64;
        if new_size > MAX_WINDOW_SIZE {
            return Err(Error::connection(error_code::FLOW_CONTROL_ERROR));
        }
        self.size = new_size;
        Ok(())
    }

    /// Applies the per-stream effect of a SETTINGS_INITIAL_WINDOW_SIZE
    /// change: every existing stream's window shifts by the same delta
    /// (new_initial - old_initial), which may drive it negative (§6.9.2).
    pub fn apply_initial_window_delta(&mut self, delta: i64) -> Result<(), Error> {
        let new_size = self.size + delta;
        if !(-MAX_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&new_size) {
            return Err(Error::connection(error_code::FLOW_CONTROL_ERROR));
        }
        self.size = new_size;
        Ok(())
    }
}
