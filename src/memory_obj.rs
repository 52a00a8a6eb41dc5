//! The opaque buffer type moved between backends, and the allocator contract
//! that owns its lifecycle.
//!
//! `MemoryObj` deliberately does not rely on Rust's automatic `Arc` refcounting:
//! the allocator is modeled as an external collaborator (potentially backed
//! by pinned or device memory) that must observe every ownership transition
//! explicitly via `ref_count_up`/`ref_count_down`.

use crate::error::ProtocolError;

/// Logical layout tag carried alongside a buffer's raw bytes.
///
/// The wire protocol and disk metadata both carry this as a bare `i32`;
/// unknown values outside the ones a given deployment understands are
/// passed through opaquely rather than rejected, since the core treats
/// `fmt` as a caller-defined tag rather than something it interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFormat(pub i32);

impl MemoryFormat {
    /// A plain KV tensor blob, the common case.
    pub const KV_BLOB: MemoryFormat = MemoryFormat(0);
    /// Raw bytes with no tensor interpretation (shape is `[len, 0, 0, 0]`).
    pub const BINARY: MemoryFormat = MemoryFormat(1);
}

/// Element dtype, bijectively mapped onto the wire integer encoding.
///
/// The wire format has two historical tags, `1` and `2`, for what is the
/// same dtype; `from_wire` normalises both to `Float16` on decode, and
/// `to_wire` always emits `1`. `Float16Alias` is kept as a distinct variant
/// so a value explicitly constructed with it still encodes to the `2` tag,
/// but nothing produces it on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Float16,
    Float16Alias,
    BFloat16,
    Float32,
    Float64,
    Uint8,
    Float8E4M3FN,
    Float8E5M2,
}

impl DType {
    pub fn to_wire(self) -> i32 {
        match self {
            DType::Float16 => 1,
            DType::Float16Alias => 2,
            DType::BFloat16 => 3,
            DType::Float32 => 4,
            DType::Float64 => 5,
            DType::Uint8 => 6,
            DType::Float8E4M3FN => 7,
            DType::Float8E5M2 => 8,
        }
    }

    pub fn from_wire(tag: i32) -> Result<Self, ProtocolError> {
        match tag {
            1 | 2 => Ok(DType::Float16),
            3 => Ok(DType::BFloat16),
            4 => Ok(DType::Float32),
            5 => Ok(DType::Float64),
            6 => Ok(DType::Uint8),
            7 => Ok(DType::Float8E4M3FN),
            8 => Ok(DType::Float8E5M2),
            other => Err(ProtocolError::UnknownDtype(other)),
        }
    }

    /// Size of one element in bytes.
    pub fn elem_size(self) -> usize {
        match self {
            DType::Float16 | DType::Float16Alias | DType::BFloat16 => 2,
            DType::Float32 => 4,
            DType::Float64 => 8,
            DType::Uint8 | DType::Float8E4M3FN | DType::Float8E5M2 => 1,
        }
    }
}

/// Always-4-dimensional shape; trailing dimensions may be zero to denote a
/// pure byte object with no tensor structure.
pub type Shape = [u32; 4];

/// Metadata describing a [`MemoryObj`]'s contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjMetadata {
    pub shape: Shape,
    pub dtype: DType,
    pub fmt: MemoryFormat,
}

/// An allocator-owned buffer with explicit reference counting.
///
/// Created by an [`Allocator`]; the allocator is responsible for freeing the
/// underlying storage once the refcount reaches zero. The core never drops
/// the buffer itself based on Rust scope — only `ref_count_down` observations
/// drive deallocation.
#[derive(Debug)]
pub struct MemoryObj {
    metadata: ObjMetadata,
    byte_array: Vec<u8>,
}

impl MemoryObj {
    pub fn new(metadata: ObjMetadata, byte_array: Vec<u8>) -> Self {
        Self {
            metadata,
            byte_array,
        }
    }

    pub fn metadata(&self) -> ObjMetadata {
        self.metadata
    }

    pub fn byte_array(&self) -> &[u8] {
        &self.byte_array
    }

    pub fn byte_array_mut(&mut self) -> &mut Vec<u8> {
        &mut self.byte_array
    }

    /// Number of elements implied by `shape`, ignoring trailing zero dims.
    pub fn logical_size(&self) -> usize {
        self.metadata
            .shape
            .iter()
            .map(|&d| d as usize)
            .filter(|&d| d > 0)
            .product()
    }

    /// Size of the backing buffer in bytes — what the evictor and disk
    /// backend actually account against capacity.
    pub fn physical_size(&self) -> usize {
        self.byte_array.len()
    }
}

/// External collaborator owning allocation and reference-count bookkeeping
/// for [`MemoryObj`]s.
///
/// A caller-supplied implementation may back this with pinned host memory
/// or device memory; [`HeapAllocator`] is the plain-`Vec`-backed reference
/// implementation used when no such collaborator is wired in.
pub trait Allocator: Send + Sync {
    /// Allocate a zeroed buffer of the given shape/dtype. Returns `None` if
    /// the allocator is out of capacity.
    fn allocate(&self, shape: Shape, dtype: DType, fmt: MemoryFormat) -> Option<MemoryObj>;

    /// Increment the object's reference count at an ownership transition
    /// (e.g. a backend accepting a put).
    fn ref_count_up(&self, obj: &MemoryObj);

    /// Decrement the object's reference count at completion of an
    /// ownership transition. Implementations free the backing storage once
    /// the count reaches zero.
    fn ref_count_down(&self, obj: &MemoryObj);
}

/// Reference `Allocator` backed by plain heap `Vec<u8>` buffers.
///
/// Refcounting is tracked but does not drive deallocation — Rust's own
/// ownership frees the `Vec` when the `MemoryObj` is dropped. This makes
/// `HeapAllocator` unsuitable for scenarios that need a true external
/// allocator (e.g. pinned memory pools) but sufficient as the crate's
/// default, runnable-without-configuration allocator.
#[derive(Debug, Default)]
pub struct HeapAllocator;

impl Allocator for HeapAllocator {
    fn allocate(&self, shape: Shape, dtype: DType, fmt: MemoryFormat) -> Option<MemoryObj> {
        let elems: usize = shape.iter().map(|&d| d as usize).filter(|&d| d > 0).product();
        let byte_len = elems.max(1) * dtype.elem_size();
        let metadata = ObjMetadata { shape, dtype, fmt };
        Some(MemoryObj::new(metadata, vec![0u8; byte_len]))
    }

    fn ref_count_up(&self, _obj: &MemoryObj) {}

    fn ref_count_down(&self, _obj: &MemoryObj) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_encodes_to_wire_value() {
        assert_eq!(DType::Float16.to_wire(), 1);
        assert_eq!(DType::BFloat16.to_wire(), 3);
        assert_eq!(DType::Float8E5M2.to_wire(), 8);
    }

    #[test]
    fn dtype_decode_resolves_duplicate_to_float16() {
        assert_eq!(DType::from_wire(1).unwrap(), DType::Float16);
        assert_eq!(DType::from_wire(2).unwrap(), DType::Float16);
    }

    #[test]
    fn dtype_decode_rejects_unknown_tag() {
        assert!(matches!(
            DType::from_wire(99),
            Err(ProtocolError::UnknownDtype(99))
        ));
    }

    #[test]
    fn heap_allocator_produces_correctly_sized_buffer() {
        let alloc = HeapAllocator;
        let obj = alloc
            .allocate([2, 16, 128, 64], DType::BFloat16, MemoryFormat::KV_BLOB)
            .unwrap();
        assert_eq!(obj.logical_size(), 2 * 16 * 128 * 64);
        assert_eq!(obj.physical_size(), 2 * 16 * 128 * 64 * 2);
    }

    #[test]
    fn binary_object_uses_single_nonzero_dim() {
        let alloc = HeapAllocator;
        let obj = alloc
            .allocate([4096, 0, 0, 0], DType::Uint8, MemoryFormat::BINARY)
            .unwrap();
        assert_eq!(obj.logical_size(), 4096);
        assert_eq!(obj.physical_size(), 4096);
    }
}
