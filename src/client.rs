//! Minimal blocking client for the framed wire protocol.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::error::Result;
use crate::server::protocol;

/// Send one command and return the server's reply.
///
/// Opens a fresh connection per request — the protocol carries no session
/// state — and reads the unframed response until the server closes.
pub fn request(addr: &str, database: &str, operation: &str, args: &[String]) -> Result<String> {
    let payload = protocol::build_payload(database, operation, args);
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(protocol::encode_frame(&payload).as_bytes())?;
    stream.shutdown(Shutdown::Write)?;
    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;
    Ok(reply)
}
