//! Pass-through serde: the wire/disk representation is identical to the
//! in-memory one. Exists so backends can be generic over the serde layer
//! without a special case for "no compression".

use super::{Deserializer, Serializer};
use crate::error::CacheError;
use crate::memory_obj::MemoryObj;

#[derive(Debug, Default)]
pub struct NaiveSerializer;

impl Serializer for NaiveSerializer {
    fn serialize(&self, obj: &MemoryObj) -> Result<MemoryObj, CacheError> {
        Ok(MemoryObj::new(obj.metadata(), obj.byte_array().to_vec()))
    }
}

#[derive(Debug, Default)]
pub struct NaiveDeserializer;

impl Deserializer for NaiveDeserializer {
    fn deserialize(&self, obj: &MemoryObj) -> Result<MemoryObj, CacheError> {
        Ok(MemoryObj::new(obj.metadata(), obj.byte_array().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_obj::{DType, MemoryFormat, ObjMetadata};

    #[test]
    fn naive_round_trip_preserves_bytes() {
        let metadata = ObjMetadata {
            shape: [4, 0, 0, 0],
            dtype: DType::Uint8,
            fmt: MemoryFormat::BINARY,
        };
        let obj = MemoryObj::new(metadata, vec![1, 2, 3, 4]);

        let ser = NaiveSerializer.serialize(&obj).unwrap();
        let de = NaiveDeserializer.deserialize(&ser).unwrap();

        assert_eq!(de.byte_array(), obj.byte_array());
    }
}
