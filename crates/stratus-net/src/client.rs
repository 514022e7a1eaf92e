//! Worker client: generates path samples on behalf of a remote verifier.

use std::io::{self, Read};
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, info};

use crate::wire::{ClientMsg, ServerMsg, WireError};
use crate::NetError;

/// How long to wait for a command from the server before producing the
/// next sample for the active campaign.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Reads one server message, returning `None` when the poll interval
/// elapses with no traffic. Once a tag byte arrives the rest of the frame
/// is read without a timeout so frames are never torn.
fn poll_server_msg(stream: &mut TcpStream) -> Result<Option<ServerMsg>, NetError> {
    let mut buf = [0u8; ServerMsg::SIZE];
    match stream.read_exact(&mut buf[..1]) {
        Ok(()) => {}
        Err(err)
            if err.kind() == io::ErrorKind::WouldBlock
                || err.kind() == io::ErrorKind::TimedOut =>
        {
            return Ok(None)
        }
        Err(err) => return Err(NetError::Wire(WireError::Io(err))),
    }
    stream.set_read_timeout(None)?;
    let result = stream.read_exact(&mut buf[1..]);
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    result.map_err(WireError::Io)?;
    Ok(Some(ServerMsg::decode(&buf).map_err(NetError::Wire)?))
}

/// Connects to a verification server and serves samples until told to quit.
///
/// `sample` produces one path sample for the property with the given index;
/// the caller owns the model, the property table, and the simulation state.
pub fn run_client<F>(addr: &str, mut sample: F) -> Result<(), NetError>
where
    F: FnMut(i32) -> Result<bool, NetError>,
{
    let mut stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    ClientMsg::Register.write_to(&mut stream)?;

    let client_id = match ServerMsg::read_from(&mut stream)? {
        ServerMsg::Register { client_id } => client_id as i16,
        other => {
            return Err(NetError::Protocol(format!(
                "expected registration reply, got {other:?}"
            )))
        }
    };
    info!(client = client_id, server = addr, "registered with server");
    stream.set_read_timeout(Some(POLL_INTERVAL))?;

    let mut active: Option<i32> = None;
    loop {
        match poll_server_msg(&mut stream)? {
            Some(ServerMsg::Start { property }) => {
                debug!(property, "campaign started");
                active = Some(property);
            }
            Some(ServerMsg::Stop) => {
                debug!("campaign stopped");
                active = None;
            }
            Some(ServerMsg::Quit) => {
                info!(client = client_id, "server shut down");
                return Ok(());
            }
            Some(ServerMsg::Register { .. }) => {
                return Err(NetError::Protocol("unexpected registration reply".into()))
            }
            None => {
                if let Some(property) = active {
                    let value = u64::from(sample(property)?);
                    ClientMsg::Sample {
                        client_id,
                        value,
                    }
                    .write_to(&mut stream)?;
                }
            }
        }
    }
}
