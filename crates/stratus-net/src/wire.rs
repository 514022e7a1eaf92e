//! Fixed-layout wire messages.
//!
//! Both directions use little-endian fixed-size frames so a reader always
//! knows how many bytes to expect. Client to server frames are 11 bytes:
//! a tag byte, a 16-bit client id, and a 64-bit value. Server to client
//! frames are 5 bytes: a tag byte and a 32-bit value.

use std::io::{self, Read, Write};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error(transparent)]
    Io(#[from] io::Error),
}

const CLIENT_REGISTER: u8 = 1;
const CLIENT_SAMPLE: u8 = 2;

const SERVER_REGISTER: u8 = 1;
const SERVER_START: u8 = 2;
const SERVER_STOP: u8 = 3;
const SERVER_QUIT: u8 = 4;

/// A message sent by a sampling worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMsg {
    /// Join the server's worker pool. The client id is ignored; the
    /// server assigns one in its registration reply.
    Register,
    /// One path sample: nonzero means the path formula held.
    Sample { client_id: i16, value: u64 },
}

impl ClientMsg {
    pub const SIZE: usize = 11;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        match self {
            ClientMsg::Register => {
                buf[0] = CLIENT_REGISTER;
            }
            ClientMsg::Sample { client_id, value } => {
                buf[0] = CLIENT_SAMPLE;
                buf[1..3].copy_from_slice(&client_id.to_le_bytes());
                buf[3..11].copy_from_slice(&value.to_le_bytes());
            }
        }
        buf
    }

    pub fn decode(buf: &[u8; Self::SIZE]) -> Result<ClientMsg, WireError> {
        let client_id = i16::from_le_bytes([buf[1], buf[2]]);
        let mut value = [0u8; 8];
        value.copy_from_slice(&buf[3..11]);
        let value = u64::from_le_bytes(value);
        match buf[0] {
            CLIENT_REGISTER => Ok(ClientMsg::Register),
            CLIENT_SAMPLE => Ok(ClientMsg::Sample { client_id, value }),
            tag => Err(WireError::UnknownTag(tag)),
        }
    }

    pub fn read_from(reader: &mut impl Read) -> Result<ClientMsg, WireError> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;
        ClientMsg::decode(&buf)
    }

    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), WireError> {
        writer.write_all(&self.encode())?;
        Ok(())
    }
}

/// A message sent by the verification server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMsg {
    /// Registration reply carrying the assigned client id.
    Register { client_id: i32 },
    /// Start sampling the property with the given index.
    Start { property: i32 },
    /// Stop sampling but stay connected.
    Stop,
    /// Disconnect and exit.
    Quit,
}

impl ServerMsg {
    pub const SIZE: usize = 5;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let (tag, value) = match self {
            ServerMsg::Register { client_id } => (SERVER_REGISTER, *client_id),
            ServerMsg::Start { property } => (SERVER_START, *property),
            ServerMsg::Stop => (SERVER_STOP, 0),
            ServerMsg::Quit => (SERVER_QUIT, 0),
        };
        buf[0] = tag;
        buf[1..5].copy_from_slice(&value.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; Self::SIZE]) -> Result<ServerMsg, WireError> {
        let value = i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        match buf[0] {
            SERVER_REGISTER => Ok(ServerMsg::Register { client_id: value }),
            SERVER_START => Ok(ServerMsg::Start { property: value }),
            SERVER_STOP => Ok(ServerMsg::Stop),
            SERVER_QUIT => Ok(ServerMsg::Quit),
            tag => Err(WireError::UnknownTag(tag)),
        }
    }

    pub fn read_from(reader: &mut impl Read) -> Result<ServerMsg, WireError> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;
        ServerMsg::decode(&buf)
    }

    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), WireError> {
        writer.write_all(&self.encode())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_msg_layout() {
        let msg = ClientMsg::Sample {
            client_id: -2,
            value: 0x0102030405060708,
        };
        let buf = msg.encode();
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[1..3], &(-2i16).to_le_bytes());
        assert_eq!(buf[3], 0x08);
        assert_eq!(buf[10], 0x01);
        assert_eq!(ClientMsg::decode(&buf).unwrap(), msg);
    }

    #[test]
    fn test_server_msg_layout() {
        let msg = ServerMsg::Start { property: 7 };
        let buf = msg.encode();
        assert_eq!(buf, [2, 7, 0, 0, 0]);
        assert_eq!(ServerMsg::decode(&buf).unwrap(), msg);
    }

    #[test]
    fn test_stream_round_trip() {
        let mut bytes = Vec::new();
        ClientMsg::Register.write_to(&mut bytes).unwrap();
        ClientMsg::Sample {
            client_id: 3,
            value: 1,
        }
        .write_to(&mut bytes)
        .unwrap();

        let mut cursor = io::Cursor::new(bytes);
        assert_eq!(
            ClientMsg::read_from(&mut cursor).unwrap(),
            ClientMsg::Register
        );
        assert_eq!(
            ClientMsg::read_from(&mut cursor).unwrap(),
            ClientMsg::Sample {
                client_id: 3,
                value: 1
            }
        );
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let buf = [9u8; ClientMsg::SIZE];
        assert!(matches!(
            ClientMsg::decode(&buf),
            Err(WireError::UnknownTag(9))
        ));
        let buf = [0u8; ServerMsg::SIZE];
        assert!(matches!(
            ServerMsg::decode(&buf),
            Err(WireError::UnknownTag(0))
        ));
    }
}
