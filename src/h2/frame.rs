//! The 9-byte frame header codec and frame-type constants (RFC 9113 §4).

/// Frame type byte values (§4.1).
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// Frame flag bits, shared across the frame types that define them.
pub mod flags {
    pub const ACK: u8 = 0x1;
    pub const END_STREAM: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// SETTINGS parameter identifiers (§6.5.2).
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// Error codes carried in RST_STREAM and GOAWAY (§7).
pub mod error_code {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const INTERNAL_ERROR: u32 = 0x2;
    pub const FLOW_CONTROL_ERROR: u32 = 0x3;
    pub const SETTINGS_TIMEOUT: u32 = 0x4;
    pub const STREAM_CLOSED: u32 = 0x5;
    pub const FRAME_SIZE_ERROR: u32 = 0x6;
    pub const REFUSED_STREAM: u32 = 0x7;
    pub const CANCEL: u32 = 0x8;
    pub const COMPRESSION_ERROR: u32 = 0x9;
    pub const CONNECT_ERROR: u32 = 0xa;
    pub const ENHANCE_YOUR_CALM: u32 = 0xb;
    pub const INADEQUATE_SECURITY: u32 = 0xc;
    pub const HTTP_1_1_REQUIRED: u32 = 0xd;
}

pub const FRAME_HEADER_LEN: usize = 9;
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// A decoded 9-byte frame header; the payload is handled separately by the
/// caller once it knows `length` bytes are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn parse(data: &[u8]) -> Option<FrameHeader> {
        if data.len() < FRAME_HEADER_LEN {
            return None;
        }
        let length = (data[0] as u32) << 16 | (data[1] as u32) << 8 | data[2] as u32;
        let frame_type = data[3];
        let flags = data[4];
        let stream_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) & 0x7FFF_FFFF;
        Some(FrameHeader { length, frame_type, flags, stream_id })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push((self.length >> 16) as u8);
        out.push((self.length >> 8) as u8);
        out.push(self.length as u8);
        out.push(self.frame_type);
        out.push(self.flags);
        out.extend_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags & flags::END_HEADERS != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_padded(&self) -> bool {
        self.flags & flags::PADDED != 0
    }

    pub fn has_priority(&self) -> bool {
        self.flags & flags::PRIORITY != 0
    }
}

/// Strips PADDED-flag framing from a DATA frame payload, per §6.1.
pub fn strip_data_padding(header: &FrameHeader, payload: &[u8]) -> Result<&[u8], super::Error> {
    if !header.is_padded() {
        return Ok(payload);
    }
    let pad_len = *payload.first().ok_or(super::Error::connection(error_code::FRAME_SIZE_ERROR))? as usize;
    let body = &payload[1..];
    if pad_len >= body.len() + 1 {
        return Err(super::Error::connection(error_code::PROTOCOL_ERROR));
    }
    Ok(&body[..body.len() - pad_len])
}

/// Strips PADDED and PRIORITY framing from a HEADERS frame payload, per
/// §6.2. Returns `(header_block, priority)`, `priority` being the 5 stripped
/// dependency+weight bytes when the PRIORITY flag was set.
pub fn strip_headers_padding<'a>(
    header: &FrameHeader,
    payload: &'a [u8],
) -> Result<(&'a [u8], Option<(u32, u8)>), super::Error> {
    let mut offset = 0;
    let mut end = payload.len();
    if header.is_padded() {
        let pad_len = *payload.first().ok_or(super::Error::connection(error_code::FRAME_SIZE_ERROR))? as usize;
        offset = 1;
        if pad_len + offset > payload.len() {
            return Err(super::Error::connection(error_code::PROTOCOL_ERROR));
        }
        end = payload.len() - pad_len;
    }
    let mut priority = None;
    if header.has_priority() {
        if end < offset + 5 {
            return Err(super::Error::connection(error_code::FRAME_SIZE_ERROR));
        }
        let raw = &payload[offset..offset + 5];
        let dep = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) & 0x7FFF_FFFF;
        priority = Some((dep, raw[4]));
        offset += 5;
    }
    if offset > end {
        return Err(super::Error::connection(error_code::PROTOCOL_ERROR));
    }
    Ok((&payload[offset..end], priority))
}

pub fn encode_settings(out: &mut Vec<u8>, values: &[(u16, u32)]) {
    let header = FrameHeader {
        length: (values.len() * 6) as u32,
        frame_type: frame_type::SETTINGS,
        flags: 0,
        stream_id: 0,
    };
    header.encode(out);
    for (id, value) in values {
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&value.to_be_bytes());
    }
}

pub fn encode_settings_ack(out: &mut Vec<u8>) {
    FrameHeader { length: 0, frame_type: frame_type::SETTINGS, flags: flags::ACK, stream_id: 0 }.encode(out);
}

pub fn encode_ping(out: &mut Vec<u8>, data: [u8; 8], ack: bool) {
    FrameHeader {
        length: 8,
        frame_type: frame_type::PING,
        flags: if ack { flags::ACK } else { 0 },
        stream_id: 0,
    }
    .encode(out);
    out.extend_from_slice(&data);
}

pub fn encode_goaway(out: &mut Vec<u8>, last_stream_id: u32, error_code: u32, debug: &[u8]) {
    FrameHeader {
        length: 8 + debug.len() as u32,
        frame_type: frame_type::GOAWAY,
        flags: 0,
        stream_id: 0,
    }
    .encode(out);
    out.extend_from_slice(&(last_stream_id & 0x7FFF_FFFF).to_be_bytes());
    out.extend_from_slice(&error_code.to_be_bytes());
    out.extend_from_slice(debug);
}

pub fn encode_rst_stream(out: &mut Vec<u8>, stream_id: u32, error_code: u32) {
    FrameHeader { length: 4, frame_type: frame_type::RST_STREAM, flags: 0, stream_id }.encode(out);
    out.extend_from_slice(&error_code.to_be_bytes());
}

pub fn encode_window_update(out: &mut Vec<u8>, stream_id: u32, increment: u32) {
    FrameHeader { length: 4, frame_type: frame_type::WINDOW_UPDATE, flags: 0, stream_id }.encode(out);
    out.extend_from_slice(&(increment & 0x7FFF_FFFF).to_be_bytes());
}

pub fn encode_headers(out: &mut Vec<u8>, stream_id: u32, block: &[u8], end_stream: bool, end_headers: bool) {
    let mut flags = 0;
    if end_stream {
        flags |= self::flags::END_STREAM;
    }
    if end_headers {
        flags |= self::flags::END_HEADERS;
    }
    FrameHeader { length: block.len() as u32, frame_type: frame_type::HEADERS, flags, stream_id }.encode(out);
    out.extend_from_slice(block);
}

pub fn encode_continuation(out: &mut Vec<u8>, stream_id: u32, block: &[u8], end_headers: bool) {
    let flags = if end_headers { self::flags::END_HEADERS } else { 0 };
    FrameHeader { length: block.len() as u32, frame_type: frame_type::CONTINUATION, flags, stream_id }.encode(out);
    out.extend_from_slice(block);
}

pub fn encode_data(out: &mut Vec<u8>, stream_id: u32, data: &[u8], end_stream: bool) {
    let flags = if end_stream { self::flags::END_STREAM } else { 0 };
    FrameHeader { length: data.len() as u32, frame_type: frame_type::DATA, flags, stream_id }.encode(out);
    out.extend_from_slice(data);
}

/// Parses a SETTINGS frame payload into `(id, value)` pairs. The payload
/// length must already be known to be a multiple of 6 (checked by the
/// caller against `FRAME_SIZE_ERROR`, per §6.5).
pub fn parse_settings_payload(payload: &[u8]) -> Vec<(u16, u32)> {
    payload
        .chunks_exact(6)
        .map(|c| (u16::from_be_bytes([c[0], c[1]]), u32::from_be_bytes([c[2], c[3], c[4], c[5]])))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_header() {
        let h = FrameHeader { length: 42, frame_type: frame_type::DATA, flags: flags::END_STREAM, stream_id: 7 };
        let mut buf = Vec::new();
        h.encode(&mut buf);
        assert_eq!(buf.len(), FRAME_HEADER_LEN);
        let parsed = FrameHeader::parse(&buf).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn strips_data_padding() {
        let header = FrameHeader { length: 0, frame_type: frame_type::DATA, flags: flags::PADDED, stream_id: 1 };
        let payload = [2u8, b'h', b'i', 0, 0];
        let out = strip_data_padding(&header, &payload).unwrap();
        assert_eq!(out, b"hi");
    }

    #[test]
    fn strips_headers_padding_and_priority() {
        let header = FrameHeader {
            length: 0,
            frame_type: frame_type::HEADERS,
            flags: flags::PADDED | flags::PRIORITY,
            stream_id: 1,
        };
        let mut payload = vec![1u8]; // pad length
        payload.extend_from_slice(&5u32.to_be_bytes()); // stream dependency
        payload.push(16); // weight
        payload.extend_from_slice(b"block");
        payload.push(0); // 1 byte padding
        let (block, priority) = strip_headers_padding(&header, &payload).unwrap();
        assert_eq!(block, b"block");
        assert_eq!(priority, Some((5, 16)));
    }

    #[test]
    fn parses_settings_payload() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&settings_id::INITIAL_WINDOW_SIZE.to_be_bytes());
        payload.extend_from_slice(&65535u32.to_be_bytes());
        let parsed = parse_settings_payload(&payload);
        assert_eq!(parsed, vec![(settings_id::INITIAL_WINDOW_SIZE, 65535)]);
    }
}
