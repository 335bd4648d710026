//! HTTP/2 SETTINGS parameters (§3, RFC 9113 §6.5.2) and the negotiated pair
//! of local/remote settings a connection tracks.

use super::frame::settings_id;
use super::Error;

/// One side's SETTINGS parameters, with RFC 9113 §6.5.2 defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: u32,
    pub enable_push: bool,
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            header_table_size: 4096,
            enable_push: false,
            max_concurrent_streams: None,
            initial_window_size: 65_535,
            max_frame_size: super::frame::DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: None,
        }
    }
}

impl Settings {
    /// Applies one `(identifier, value)` pair from a SETTINGS frame,
    /// validating ranges per §6.5.2. Unknown identifiers are ignored.
    pub fn apply(&mut self, id: u16, value: u32) -> Result<(), Error> {
        match id {
            settings_id::HEADER_TABLE_SIZE => self.header_table_size = value,
            settings_id::ENABLE_PUSH => {
                if value > 1 {
                    return Err(Error::connection(super::frame::error_code::PROTOCOL_ERROR));
                }
                self.enable_push = value == 1;
            }
            settings_id::MAX_CONCURRENT_STREAMS => self.max_concurrent_streams = Some(value),
            settings_id::INITIAL_WINDOW_SIZE => {
                if value > i32::MAX as u32 {
                    return Err(Error::connection(super::frame::error_code::FLOW_CONTROL_ERROR));
                }
                self.initial_window_size = value;
            }
            settings_id::MAX_FRAME_SIZE => {
                if !(16_384..=16_777_215).contains(&value) {
                    return Err(Error::connection(super::frame::error_code::PROTOCOL_ERROR));
                }
                self.max_frame_size = value;
            }
            settings_id::MAX_HEADER_LIST_SIZE => self.max_header_list_size = Some(value),
            _ => {}
        }
        Ok(())
    }

    /// Encode as `(id, value)` pairs for a SETTINGS frame, omitting fields
    /// still at their RFC default so the initial frame stays small.
    pub fn to_pairs(&self) -> Vec<(u16, u32)> {
        let default = Settings::default();
        let mut out = Vec::new();
        if self.header_table_size != default.header_table_size {
            out.push((settings_id::HEADER_TABLE_SIZE, self.header_table_size));
        }
        if self.enable_push != default.enable_push {
            out.push((settings_id::ENABLE_PUSH, self.enable_push as u32));
        }
        if let Some(n) = self.max_concurrent_streams {
            out.push((settings_id::MAX_CONCURRENT_STREAMS, n));
        }
        if self.initial_window_size != default.initial_window_size {
            out.push((settings_id::INITIAL_WINDOW_SIZE, self.initial_window_size));
        }
        if self.max_frame_size != default.max_frame_size {
            out.push((settings_id::MAX_FRAME_SIZE, self.max_frame_size));
        }
        if let Some(n) = self.max_header_list_size {
            out.push((settings_id::MAX_HEADER_LIST_SIZE, n));
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_oversize_initial_window() {
        let mut s = Settings::default();
        assert!(s.apply(settings_id::INITIAL_WINDOW_SIZE, 1 << 31).is_err());
        assert!(s.apply(settings_id::INITIAL_WINDOW_SIZE, 100).is_ok());
        assert_eq!(s.initial_window_size, 100);
    }

    #[test]
    fn rejects_out_of_range_max_frame_size() {
        let mut s = Settings::default();
        assert!(s.apply(settings_id::MAX_FRAME_SIZE, 100).is_err());
        assert!(s.apply(settings_id::MAX_FRAME_SIZE, 20_000).is_ok());
    }

    #[test]
    fn ignores_unknown_identifier() {
        let mut s = Settings::default();
        assert!(s.apply(0xff, 1).is_ok());
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn pairs_omit_defaults() {
        let s = Settings::default();
        assert!(s.to_pairs().is_empty());
    }
}
