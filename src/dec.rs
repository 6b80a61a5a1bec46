use snap::raw::{Decoder, Encoder};

use crate::{core::Bytes, error::ChainDbResult};

/// Data Encoding and Compression (DEC)
///
/// Header structures go through a fixed-int little-endian
/// configuration so every header has a fixed width on disk. Payload
/// bytes pass through Snappy when compression is enabled; reads stay
/// able to decompress regardless, since the per-record header records
/// whether its payload was compressed.
#[derive(Debug)]
pub(crate) struct Dec {
    compress: bool,
    encoder: Option<Encoder>,
    decoder: Decoder,
}

impl Dec {
    /// Create a new Data Encoder and Compressor
    pub fn new(compress: bool) -> Dec {
        let encoder = if compress { Some(Encoder::new()) } else { None };
        Self {
            compress,
            encoder,
            decoder: Decoder::new(),
        }
    }

    /// Whether payloads written through this codec get compressed.
    pub fn compresses(&self) -> bool {
        self.compress
    }

    /// Serializes a header structure into its fixed-width byte form
    pub fn ser_raw<T: bincode::Encode>(value: &T) -> ChainDbResult<Bytes> {
        let config = Self::serde_config();
        Ok(bincode::encode_to_vec(value, config)?)
    }

    /// Deserializes a header structure from a slice of bytes
    pub fn deser_raw<T: bincode::Decode<()>>(bytes: &[u8]) -> ChainDbResult<T> {
        let config = Self::serde_config();
        Ok(bincode::decode_from_slice(bytes, config)?.0)
    }

    /// Runs payload bytes through the encoder, if one is configured.
    pub fn pack(&mut self, payload: &[u8]) -> ChainDbResult<Bytes> {
        if let Some(ref mut enc) = self.encoder {
            Ok(enc.compress_vec(payload)?)
        } else {
            Ok(payload.to_vec())
        }
    }

    /// Reverses [Dec::pack] on payload bytes read back from disk.
    pub fn unpack(&mut self, bytes: &[u8], compressed: bool) -> ChainDbResult<Bytes> {
        if compressed {
            Ok(self.decoder.decompress_vec(bytes)?)
        } else {
            Ok(bytes.to_vec())
        }
    }

    #[inline]
    fn serde_config() -> impl bincode::config::Config {
        bincode::config::standard()
            .with_little_endian()
            .with_fixed_int_encoding()
            .with_no_limit()
    }
}
