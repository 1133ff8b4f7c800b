use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crate::error::{CResult, Error};
use crate::mvcc::Version;

const NEXT_VERSION: &[u8] = b"NextVersion_";
const TEN_ACTIVE: &[u8] = b"TenActive_";
const TXN_WRITE: &[u8] = b"TxnWrite_";
const KEY_VERSION: &[u8] = b"KeyVersion_";

/// A key in the MVCC keyspace. Every multi-byte integer is encoded
/// big-endian fixed 8 bytes, per the wire-exact key encoding this engine
/// persists.
pub enum Key {
    /// `NextVersion_`
    NextVersion,
    /// `TenActive_` ‖ u64_be(v)
    TxnActive(Version),
    /// `TxnWrite_` ‖ u64_be(v) ‖ user_key
    TxnWrite(Version, Vec<u8>),
    /// `KeyVersion_` ‖ user_key ‖ u64_be(v)
    Version(Vec<u8>, Version),
}

impl Key {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Key::NextVersion => buf.extend_from_slice(NEXT_VERSION),
            Key::TxnActive(version) => {
                buf.extend_from_slice(TEN_ACTIVE);
                buf.write_u64::<BigEndian>(*version).unwrap();
            }
            Key::TxnWrite(version, key) => {
                buf.extend_from_slice(TXN_WRITE);
                buf.write_u64::<BigEndian>(*version).unwrap();
                buf.extend_from_slice(key);
            }
            Key::Version(key, version) => {
                buf.extend_from_slice(KEY_VERSION);
                buf.extend_from_slice(key);
                buf.write_u64::<BigEndian>(*version).unwrap();
            }
        }
        buf
    }

    /// Decodes a `TxnWrite_<v><user_key>` key, returning the user key.
    pub fn decode_txn_write(key: &[u8]) -> CResult<Vec<u8>> {
        if key.len() < TXN_WRITE.len() + 8 {
            return Err(Error::Internal(format!("short TxnWrite key: {:?}", key)));
        }
        Ok(key[TXN_WRITE.len() + 8..].to_vec())
    }

    /// Decodes a `TenActive_<v>` key, returning the version.
    pub fn decode_txn_active(key: &[u8]) -> CResult<Version> {
        let mut cursor = std::io::Cursor::new(&key[TEN_ACTIVE.len()..]);
        Ok(cursor.read_u64::<BigEndian>()?)
    }

    /// Decodes a `KeyVersion_<user_key><v>` key, returning (user_key, version).
    pub fn decode_version(key: &[u8]) -> CResult<(Vec<u8>, Version)> {
        if key.len() < KEY_VERSION.len() + 8 {
            return Err(Error::Internal(format!("short KeyVersion key: {:?}", key)));
        }
        let body = &key[KEY_VERSION.len()..];
        let (user_key, version_bytes) = body.split_at(body.len() - 8);
        let mut cursor = std::io::Cursor::new(version_bytes);
        let version = cursor.read_u64::<BigEndian>()?;
        Ok((user_key.to_vec(), version))
    }
}

/// A key prefix, used to construct the start of a range/prefix scan.
pub enum KeyPrefix {
    TxnActive,
    TxnWrite(Version),
    Version(Vec<u8>),
}

impl KeyPrefix {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            KeyPrefix::TxnActive => buf.extend_from_slice(TEN_ACTIVE),
            KeyPrefix::TxnWrite(version) => {
                buf.extend_from_slice(TXN_WRITE);
                buf.write_u64::<BigEndian>(*version).unwrap();
            }
            KeyPrefix::Version(key) => {
                buf.extend_from_slice(KEY_VERSION);
                buf.extend_from_slice(key);
            }
        }
        buf
    }
}
