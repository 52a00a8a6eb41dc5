//! Compressing serde flavour, using DEFLATE via `flate2` (the teacher crate
//! already depends on it for its own asset pipeline).
//!
//! Named after the reference implementation's compressing serde
//! ("kivi"); there is nothing KIVI-specific about DEFLATE itself, it is
//! just the compression this crate ships.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use super::{Deserializer, Serializer};
use crate::error::CacheError;
use crate::memory_obj::MemoryObj;

#[derive(Debug, Default)]
pub struct KiviSerializer;

impl Serializer for KiviSerializer {
    fn serialize(&self, obj: &MemoryObj) -> Result<MemoryObj, CacheError> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(obj.byte_array())?;
        let compressed = encoder.finish()?;
        Ok(MemoryObj::new(obj.metadata(), compressed))
    }
}

#[derive(Debug, Default)]
pub struct KiviDeserializer;

impl Deserializer for KiviDeserializer {
    fn deserialize(&self, obj: &MemoryObj) -> Result<MemoryObj, CacheError> {
        let mut decoder = DeflateDecoder::new(obj.byte_array());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(MemoryObj::new(obj.metadata(), decompressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_obj::{DType, MemoryFormat, ObjMetadata};

    #[test]
    fn kivi_round_trip_preserves_bytes() {
        let metadata = ObjMetadata {
            shape: [64, 0, 0, 0],
            dtype: DType::Uint8,
            fmt: MemoryFormat::BINARY,
        };
        let payload: Vec<u8> = (0..64).map(|i| (i % 7) as u8).collect();
        let obj = MemoryObj::new(metadata, payload.clone());

        let compressed = KiviSerializer.serialize(&obj).unwrap();
        let restored = KiviDeserializer.deserialize(&compressed).unwrap();

        assert_eq!(restored.byte_array(), payload.as_slice());
    }

    #[test]
    fn kivi_actually_compresses_repetitive_data() {
        let metadata = ObjMetadata {
            shape: [4096, 0, 0, 0],
            dtype: DType::Uint8,
            fmt: MemoryFormat::BINARY,
        };
        let payload = vec![0u8; 4096];
        let obj = MemoryObj::new(metadata, payload);

        let compressed = KiviSerializer.serialize(&obj).unwrap();
        assert!(compressed.physical_size() < obj.physical_size());
    }
}
