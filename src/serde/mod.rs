//! Serialisation layer between in-memory [`MemoryObj`]s and the bytes that
//! actually cross a backend boundary.
//!
//! Two flavours are mandated: `naive` (pass-through) and `kivi`
//! (compressing). Both implement the same [`Serializer`]/[`Deserializer`]
//! traits so a backend can be generic over which one it was configured with.

mod kivi;
mod naive;

pub use kivi::{KiviDeserializer, KiviSerializer};
pub use naive::{NaiveDeserializer, NaiveSerializer};

use crate::error::CacheError;
use crate::memory_obj::MemoryObj;

/// Which serde flavour a backend was configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerdeKind {
    Naive,
    Kivi,
}

/// Converts a plaintext `MemoryObj` into its wire/disk representation.
pub trait Serializer: Send + Sync {
    fn serialize(&self, obj: &MemoryObj) -> Result<MemoryObj, CacheError>;
}

/// Converts a wire/disk representation back into a plaintext `MemoryObj`.
pub trait Deserializer: Send + Sync {
    fn deserialize(&self, obj: &MemoryObj) -> Result<MemoryObj, CacheError>;
}

/// Construct the serializer/deserializer pair for a given [`SerdeKind`].
pub fn create_serde(kind: SerdeKind) -> (Box<dyn Serializer>, Box<dyn Deserializer>) {
    match kind {
        SerdeKind::Naive => (
            Box::new(NaiveSerializer),
            Box::new(NaiveDeserializer),
        ),
        SerdeKind::Kivi => (
            Box::new(KiviSerializer),
            Box::new(KiviDeserializer),
        ),
    }
}
