//! Telemetry datagram codec.
//!
//! A datagram is an unencrypted header followed by an AES-256-CBC encrypted payload:
//!
//! ```text
//! header:  seq (u32 BE) | id_len (u8) | flight id | enc tag (u8) | IV (16 bytes)
//! payload: [type u16 BE][len u16 BE][protobuf] ... padded to 16 bytes
//! ```
//!
//! Padding bytes all carry the pad count, and nothing is added when the payload
//! is already block aligned.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use prost::Message;
use thiserror::Error;

use crate::proto::{Position, Speed};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const BLOCK_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// Encryption method tag for aes-256-cbc.
pub const ENCRYPTION_AES_256_CBC: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("flight id is {0} bytes, at most 255 fit in the header")]
    FlightIdTooLong(usize),
    #[error("payload message is {0} bytes, at most 65535 fit in the length prefix")]
    MessageTooLong(usize),
    #[error("session key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("payload length {0} is not a multiple of the block size")]
    Unaligned(usize),
    #[error("datagram truncated")]
    Truncated,
    #[error("unsupported encryption method {0}")]
    UnsupportedEncryption(u8),
}

/// Payload message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    Position = 1,
    Speed = 3,
}

/// AES-256 session key delivered by the service.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for SessionKey {
    type Error = PacketError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| PacketError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Number of pad bytes needed to reach the next block boundary (0 when aligned).
pub fn padding_len(len: usize) -> usize {
    (BLOCK_LEN - len % BLOCK_LEN) % BLOCK_LEN
}

/// Pad in place; every added byte equals the pad count. Returns the count.
pub fn pad_payload(payload: &mut Vec<u8>) -> usize {
    let padding = padding_len(payload.len());
    payload.resize(payload.len() + padding, padding as u8);
    padding
}

fn push_message<M: Message>(
    buf: &mut Vec<u8>,
    msg_type: MessageType,
    message: &M,
) -> Result<(), PacketError> {
    let len = message.encoded_len();
    let len16 = u16::try_from(len).map_err(|_| PacketError::MessageTooLong(len))?;
    buf.extend_from_slice(&(msg_type as u16).to_be_bytes());
    buf.extend_from_slice(&len16.to_be_bytes());
    message
        .encode(buf)
        .map_err(|_| PacketError::MessageTooLong(len))?;
    Ok(())
}

/// Concatenate the Position and Speed records (unpadded).
pub fn encode_payload(position: &Position, speed: &Speed) -> Result<Vec<u8>, PacketError> {
    let mut payload = Vec::with_capacity(128);
    push_message(&mut payload, MessageType::Position, position)?;
    push_message(&mut payload, MessageType::Speed, speed)?;
    Ok(payload)
}

/// Split a decrypted payload into `(type, body)` records. Trailing padding is
/// ignored because it can never form a record header that fits the remainder.
pub fn decode_records(payload: &[u8]) -> Vec<(u16, &[u8])> {
    let mut records = Vec::new();
    let mut rest = payload;
    while rest.len() >= 4 {
        let msg_type = u16::from_be_bytes([rest[0], rest[1]]);
        let len = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        if len > rest.len() - 4 {
            break;
        }
        records.push((msg_type, &rest[4..4 + len]));
        rest = &rest[4 + len..];
    }
    records
}

fn encode_header(sequence: u32, flight_id: &str, iv: &[u8; IV_LEN]) -> Result<Vec<u8>, PacketError> {
    let id = flight_id.as_bytes();
    let id_len = u8::try_from(id.len()).map_err(|_| PacketError::FlightIdTooLong(id.len()))?;

    let mut header = Vec::with_capacity(4 + 1 + id.len() + 1 + IV_LEN);
    header.extend_from_slice(&sequence.to_be_bytes());
    header.push(id_len);
    header.extend_from_slice(id);
    header.push(ENCRYPTION_AES_256_CBC);
    header.extend_from_slice(iv);
    Ok(header)
}

/// Pad, encrypt and frame a payload into a single datagram.
pub fn seal_datagram(
    sequence: u32,
    flight_id: &str,
    key: &SessionKey,
    iv: &[u8; IV_LEN],
    mut payload: Vec<u8>,
) -> Result<Vec<u8>, PacketError> {
    let mut datagram = encode_header(sequence, flight_id, iv)?;

    pad_payload(&mut payload);
    let len = payload.len();
    Aes256CbcEnc::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| PacketError::InvalidKeyLength(KEY_LEN))?
        .encrypt_padded_mut::<NoPadding>(&mut payload, len)
        .map_err(|_| PacketError::Unaligned(len))?;

    datagram.extend_from_slice(&payload);
    Ok(datagram)
}

/// A datagram with its payload decrypted (padding still attached).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedDatagram {
    pub sequence: u32,
    pub flight_id: String,
    pub iv: [u8; IV_LEN],
    pub payload: Vec<u8>,
}

/// Parse and decrypt a datagram produced by [`seal_datagram`].
pub fn open_datagram(key: &SessionKey, datagram: &[u8]) -> Result<OpenedDatagram, PacketError> {
    let (seq_bytes, rest) = datagram.split_at_checked(4).ok_or(PacketError::Truncated)?;
    let sequence = u32::from_be_bytes([seq_bytes[0], seq_bytes[1], seq_bytes[2], seq_bytes[3]]);

    let (&id_len, rest) = rest.split_first().ok_or(PacketError::Truncated)?;
    let (id, rest) = rest
        .split_at_checked(id_len as usize)
        .ok_or(PacketError::Truncated)?;
    let flight_id = String::from_utf8_lossy(id).into_owned();

    let (&method, rest) = rest.split_first().ok_or(PacketError::Truncated)?;
    if method != ENCRYPTION_AES_256_CBC {
        return Err(PacketError::UnsupportedEncryption(method));
    }

    let (iv_bytes, ciphertext) = rest.split_at_checked(IV_LEN).ok_or(PacketError::Truncated)?;
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);

    let mut payload = ciphertext.to_vec();
    let len = Aes256CbcDec::new_from_slices(key.as_bytes(), &iv)
        .map_err(|_| PacketError::InvalidKeyLength(KEY_LEN))?
        .decrypt_padded_mut::<NoPadding>(&mut payload)
        .map_err(|_| PacketError::Unaligned(ciphertext.len()))?
        .len();
    payload.truncate(len);

    Ok(OpenedDatagram {
        sequence,
        flight_id,
        iv,
        payload,
    })
}
