//! Thin wrapper around `fluke-hpack` giving HPACK decode/encode the header
//! shape the rest of this crate uses (`(name, value)` pairs, names
//! lowercase per §8.2).

use super::Error;

pub struct Decoder {
    inner: fluke_hpack::Decoder<'static>,
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder { inner: fluke_hpack::Decoder::new() }
    }

    /// Decodes one header block. A failure here is always connection-fatal
    /// (§6.2): the dynamic table is left in an indeterminate state.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<(String, Vec<u8>)>, Error> {
        let pairs = self.inner.decode(block).map_err(|_| Error::Hpack)?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| (String::from_utf8_lossy(&name).into_owned(), value))
            .collect())
    }
}

impl Default for Decoder {
    fn default() -> Decoder {
        Decoder::new()
    }
}

pub struct Encoder {
    inner: fluke_hpack::Encoder<'static>,
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder { inner: fluke_hpack::Encoder::new() }
    }

    pub fn encode(&mut self, headers: &[(String, Vec<u8>)]) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers.iter().map(|(n, v)| (n.as_bytes(), v.as_slice())).collect();
        self.inner.encode(pairs)
    }
}

impl Default for Encoder {
    fn default() -> Encoder {
        Encoder::new()
    }
}
