//! Wire protocol between the `lm://` connector and a remote cache server.
//!
//! Both headers are fixed-size, little-endian integer blocks, matching the
//! original `struct.pack`/`struct.unpack` layout exactly so a Rust client
//! and a Python (or this crate's own) server can interoperate.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::ProtocolError;
use crate::key::{CacheEngineKey, MAX_KEY_LENGTH};
use crate::memory_obj::{DType, MemoryFormat, Shape};

/// Control command sent from connector to server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Put = 1,
    Get = 2,
    Exist = 3,
    List = 4,
}

impl Command {
    fn from_wire(v: i32) -> Result<Self, ProtocolError> {
        match v {
            1 => Ok(Command::Put),
            2 => Ok(Command::Get),
            3 => Ok(Command::Exist),
            4 => Ok(Command::List),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// Response code sent from server to connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success = 200,
    Fail = 400,
}

impl Code {
    fn from_wire(v: i32) -> Result<Self, ProtocolError> {
        match v {
            200 => Ok(Code::Success),
            400 => Ok(Code::Fail),
            other => Err(ProtocolError::UnknownCode(other)),
        }
    }
}

/// Control message from connector to server: 8 little-endian `i32`s
/// followed by a 150-byte space-padded UTF-8 key. Total 182 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHeader {
    pub command: Command,
    pub length: i32,
    pub fmt: MemoryFormat,
    pub dtype: DType,
    pub shape: Shape,
    pub key: CacheEngineKey,
}

impl ClientHeader {
    pub const fn packlength() -> usize {
        4 * 8 + MAX_KEY_LENGTH
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        let key_str = self.key.to_string_canonical();
        if key_str.len() > MAX_KEY_LENGTH {
            return Err(ProtocolError::Key(crate::error::ConfigError::KeyTooLong {
                len: key_str.len(),
                max: MAX_KEY_LENGTH,
            }));
        }

        let mut buf = vec![0u8; Self::packlength()];
        LittleEndian::write_i32(&mut buf[0..4], self.command as i32);
        LittleEndian::write_i32(&mut buf[4..8], self.length);
        LittleEndian::write_i32(&mut buf[8..12], self.fmt.0);
        LittleEndian::write_i32(&mut buf[12..16], self.dtype.to_wire());
        for (i, dim) in self.shape.iter().enumerate() {
            let off = 16 + i * 4;
            LittleEndian::write_i32(&mut buf[off..off + 4], *dim as i32);
        }

        let key_field = &mut buf[32..32 + MAX_KEY_LENGTH];
        key_field[..key_str.len()].copy_from_slice(key_str.as_bytes());
        for b in &mut key_field[key_str.len()..] {
            *b = b' ';
        }

        Ok(buf)
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != Self::packlength() {
            return Err(ProtocolError::UnexpectedEof {
                context: "client header",
            });
        }

        let command = Command::from_wire(LittleEndian::read_i32(&buf[0..4]))?;
        let length = LittleEndian::read_i32(&buf[4..8]);
        let fmt = MemoryFormat(LittleEndian::read_i32(&buf[8..12]));
        let dtype = DType::from_wire(LittleEndian::read_i32(&buf[12..16]))?;
        let mut shape: Shape = [0; 4];
        for (i, dim) in shape.iter_mut().enumerate() {
            let off = 16 + i * 4;
            *dim = LittleEndian::read_i32(&buf[off..off + 4]) as u32;
        }

        let key_field = &buf[32..32 + MAX_KEY_LENGTH];
        let key_str = std::str::from_utf8(key_field)
            .map_err(|_| ProtocolError::InvalidKeyEncoding)?
            .trim_end();
        let key = CacheEngineKey::from_string(key_str)?;

        Ok(Self {
            command,
            length,
            fmt,
            dtype,
            shape,
            key,
        })
    }
}

/// Control message from server to connector: 8 little-endian `i32`s, no
/// key field. Total 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHeader {
    pub code: Code,
    pub length: i32,
    pub fmt: MemoryFormat,
    pub dtype: DType,
    pub shape: Shape,
}

impl ServerHeader {
    pub const fn packlength() -> usize {
        4 * 8
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::packlength()];
        LittleEndian::write_i32(&mut buf[0..4], self.code as i32);
        LittleEndian::write_i32(&mut buf[4..8], self.length);
        LittleEndian::write_i32(&mut buf[8..12], self.fmt.0);
        LittleEndian::write_i32(&mut buf[12..16], self.dtype.to_wire());
        for (i, dim) in self.shape.iter().enumerate() {
            let off = 16 + i * 4;
            LittleEndian::write_i32(&mut buf[off..off + 4], *dim as i32);
        }
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != Self::packlength() {
            return Err(ProtocolError::UnexpectedEof {
                context: "server header",
            });
        }
        let code = Code::from_wire(LittleEndian::read_i32(&buf[0..4]))?;
        let length = LittleEndian::read_i32(&buf[4..8]);
        let fmt = MemoryFormat(LittleEndian::read_i32(&buf[8..12]));
        let dtype = DType::from_wire(LittleEndian::read_i32(&buf[12..16]))?;
        let mut shape: Shape = [0; 4];
        for (i, dim) in shape.iter_mut().enumerate() {
            let off = 16 + i * 4;
            *dim = LittleEndian::read_i32(&buf[off..off + 4]) as u32;
        }
        Ok(Self {
            code,
            length,
            fmt,
            dtype,
            shape,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_header_round_trips_and_is_182_bytes() {
        let key = CacheEngineKey::new("vllm", "llama-3-8b", 1, 0, "abc").unwrap();
        let header = ClientHeader {
            command: Command::Put,
            length: 4096,
            fmt: MemoryFormat::KV_BLOB,
            dtype: DType::BFloat16,
            shape: [2, 16, 128, 64],
            key,
        };
        let bytes = header.serialize().unwrap();
        assert_eq!(bytes.len(), 182);
        let decoded = ClientHeader::deserialize(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn server_header_round_trips_and_is_32_bytes() {
        let header = ServerHeader {
            code: Code::Success,
            length: 1024,
            fmt: MemoryFormat::KV_BLOB,
            dtype: DType::Float32,
            shape: [1, 2, 3, 4],
        };
        let bytes = header.serialize();
        assert_eq!(bytes.len(), 32);
        let decoded = ServerHeader::deserialize(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn client_header_rejects_truncated_buffer() {
        let buf = vec![0u8; 10];
        assert!(ClientHeader::deserialize(&buf).is_err());
    }

    #[test]
    fn unknown_command_is_a_protocol_error() {
        let mut buf = vec![0u8; ClientHeader::packlength()];
        LittleEndian::write_i32(&mut buf[0..4], 99);
        assert!(matches!(
            ClientHeader::deserialize(&buf),
            Err(ProtocolError::UnknownCommand(99))
        ));
    }
}
