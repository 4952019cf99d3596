//! Wire protocol between the factory and the stores.
//!
//! One exchange per TCP connection: the store sends a [`Request`], the factory
//! answers with a [`Response`] and closes.
//!
//! The store keeps its write side open until the reply arrives. If a unit is
//! on the belt when the request is read, it is served even if the store has
//! already shut down writing. Otherwise an end of stream while the factory
//! waits for production withdraws the request: no unit is taken and the
//! connection is closed without a reply.
//!
//! A frame that is cut short (end of stream or timeout inside the prefix or
//! body) is answered with a `malformed` error.
//!
//! Each message is a 4-byte big-endian length followed by a JSON body:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────┐
//! │ len: u32 BE  │ {"type":"request_vehicle","version":1,...}    │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::model::Unit;

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: u16 = 1;

/// Largest accepted message body.
pub const MAX_MESSAGE_LEN: u32 = 64 * 1024;

/// Default time allowed for a peer to deliver its message.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ask for one unit off the belt.
    RequestVehicle {
        version: u16,
        store_name: String,
        store_belt_position: u32,
    },
}

impl Request {
    pub fn request_vehicle(store_name: impl Into<String>, store_belt_position: u32) -> Self {
        Request::RequestVehicle {
            version: PROTOCOL_VERSION,
            store_name: store_name.into(),
            store_belt_position,
        }
    }

    /// Checks the fields serde cannot, returning the validated order.
    pub fn validate(self) -> Result<VehicleOrder, Rejection> {
        match self {
            Request::RequestVehicle {
                version,
                store_name,
                store_belt_position,
            } => {
                if version != PROTOCOL_VERSION {
                    return Err(Rejection::new(
                        ErrorCode::UnsupportedVersion,
                        format!(
                            "protocol version {} not supported, expected {}",
                            version, PROTOCOL_VERSION
                        ),
                    ));
                }
                let store_name = store_name.trim();
                if store_name.is_empty() {
                    return Err(Rejection::new(ErrorCode::Malformed, "store_name is empty"));
                }
                Ok(VehicleOrder {
                    store_name: store_name.to_string(),
                    store_belt_position,
                })
            }
        }
    }
}

/// A validated vehicle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleOrder {
    pub store_name: String,
    pub store_belt_position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request could not be decoded or failed validation.
    Malformed,
    /// The request used a protocol version this factory does not speak.
    UnsupportedVersion,
    /// The belt could not be serviced (factory shutting down).
    Unavailable,
}

/// Why a request was turned down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<Rejection> for Response {
    fn from(rejection: Rejection) -> Self {
        Response::Error {
            code: rejection.code,
            message: rejection.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Vehicle { unit: Unit },
    Error { code: ErrorCode, message: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message of {0} bytes exceeds the 64 KiB limit")]
    MessageTooLarge(u32),

    #[error("Timed out waiting for peer")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection closed in the middle of a message")]
    Truncated,
}

/// Serializes a message body (no length prefix).
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserializes a message body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Writes a length-prefixed message.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(body.len()).map_err(|_| ProtocolError::MessageTooLarge(u32::MAX))?;
    if len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLarge(len));
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a length-prefixed message.
///
/// A peer that closes before sending anything yields
/// [`ProtocolError::ConnectionClosed`]; one that closes after a partial
/// prefix or body yields [`ProtocolError::Truncated`].
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut prefix = [0u8; 4];
    if reader.read(&mut prefix[..1]).await? == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    read_rest(reader, &mut prefix[1..]).await?;

    let len = u32::from_be_bytes(prefix);
    if len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::MessageTooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    read_rest(reader, &mut body).await?;
    Ok(body)
}

async fn read_rest<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::Truncated),
        Err(e) => Err(e.into()),
    }
}

/// Reads a message body within `timeout`.
pub async fn read_message_within<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Vec<u8>, ProtocolError> {
    tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Encodes and writes a message within `timeout`.
pub async fn send<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    message: &T,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let body = encode(message)?;
    tokio::time::timeout(timeout, write_message(writer, &body))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
