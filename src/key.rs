//! Deterministic composite key identifying a single KV chunk.
//!
//! The canonical string form is what actually gets hashed, compared, and
//! sent over the wire — the struct fields exist for ergonomic construction
//! and `Display`, not as a secondary source of truth.

use std::fmt;

use crate::error::ConfigError;

/// Maximum length of a key's canonical string form, in bytes.
///
/// Matches the fixed 150-byte key field in the wire protocol (see
/// [`crate::wire`]).
pub const MAX_KEY_LENGTH: usize = 150;

/// Composite, deterministic identifier for a single KV chunk.
///
/// Two keys are equal iff their canonical strings are equal; hashing is
/// likewise derived from the canonical string, not the individual fields.
#[derive(Debug, Clone)]
pub struct CacheEngineKey {
    format: String,
    model_name: String,
    world_size: u32,
    worker_id: u32,
    chunk_hash: String,
    canonical: String,
}

impl CacheEngineKey {
    /// Build a key from its constituent fields.
    ///
    /// Rejects fields containing `@` or `/` (reserved for the canonical
    /// encoding and filesystem path mapping, respectively) and canonical
    /// forms exceeding [`MAX_KEY_LENGTH`] bytes.
    pub fn new(
        format: impl Into<String>,
        model_name: impl Into<String>,
        world_size: u32,
        worker_id: u32,
        chunk_hash: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let format = format.into();
        let model_name = model_name.into();
        let chunk_hash = chunk_hash.into();

        for field in [&format, &model_name, &chunk_hash] {
            if field.contains('@') || field.contains('/') {
                return Err(ConfigError::InvalidKeyField {
                    field: field.clone(),
                });
            }
        }

        let canonical = format!(
            "{}@{}@{}@{}@{}",
            format, model_name, world_size, worker_id, chunk_hash
        );
        if canonical.len() > MAX_KEY_LENGTH {
            return Err(ConfigError::KeyTooLong {
                len: canonical.len(),
                max: MAX_KEY_LENGTH,
            });
        }

        Ok(Self {
            format,
            model_name,
            world_size,
            worker_id,
            chunk_hash,
            canonical,
        })
    }

    /// Parse a canonical string (`fmt@model@world_size@worker_id@hash`) back
    /// into a key.
    pub fn from_string(s: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = s.split('@').collect();
        let [format, model_name, world_size, worker_id, chunk_hash] = parts.as_slice() else {
            return Err(ConfigError::MalformedKey { key: s.to_string() });
        };
        let world_size: u32 = world_size
            .parse()
            .map_err(|_| ConfigError::MalformedKey { key: s.to_string() })?;
        let worker_id: u32 = worker_id
            .parse()
            .map_err(|_| ConfigError::MalformedKey { key: s.to_string() })?;
        Self::new(*format, *model_name, world_size, worker_id, *chunk_hash)
    }

    /// The canonical string form, e.g. `"vllm@llama-3-8b@4@0@abc123"`.
    pub fn to_string_canonical(&self) -> &str {
        &self.canonical
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    pub fn chunk_hash(&self) -> &str {
        &self.chunk_hash
    }
}

impl fmt::Display for CacheEngineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl PartialEq for CacheEngineKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for CacheEngineKey {}

impl std::hash::Hash for CacheEngineKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}
