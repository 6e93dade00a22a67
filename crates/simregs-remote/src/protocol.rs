//! Newline-delimited JSON framing of address-space calls.
//!
//! Every frame is one JSON object on its own line. A connection carries one
//! request at a time; the server answers each request with exactly one
//! response before reading the next.

use std::io::{self, BufRead, Write};
use std::net::{Shutdown, TcpStream};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simregs_core::{Interrupt, RegisterError, WaitCondition, WaitOutcome};
use thiserror::Error;

/// One address-space call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// [`AddressSpace::read`](simregs_core::AddressSpace::read).
    Read {
        /// Register address.
        address: u32,
    },
    /// [`AddressSpace::write`](simregs_core::AddressSpace::write).
    Write {
        /// Register address.
        address: u32,
        /// Value to store.
        value: u32,
    },
    /// [`AddressSpace::wait`](simregs_core::AddressSpace::wait).
    Wait {
        /// Condition and bounds.
        condition: WaitCondition,
    },
    /// [`AddressSpace::provides_address`](simregs_core::AddressSpace::provides_address).
    ProvidesAddress {
        /// Address to probe.
        address: u32,
    },
    /// [`AddressSpace::describe`](simregs_core::AddressSpace::describe).
    Describe {
        /// Address to label.
        address: u32,
    },
}

/// Reply to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Register value of a read.
    Value {
        /// Value read.
        value: u32,
    },
    /// Write accepted.
    Done,
    /// Wait finished without failing.
    Waited {
        /// Satisfied or timed out, with elapsed cycles.
        outcome: WaitOutcome,
    },
    /// Answer to an address probe.
    Provides {
        /// Whether the address is mapped.
        provided: bool,
    },
    /// Diagnostic label.
    Label {
        /// Label text.
        label: String,
    },
    /// The call failed on the server.
    Error {
        /// Failure as raised by the server's address space.
        error: RegisterError,
    },
}

/// Framing or connection failure.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// Frame was not valid JSON for the expected message.
    #[error("malformed frame: {0}")]
    Codec(#[from] serde_json::Error),
    /// Peer closed the connection before answering.
    #[error("connection closed by peer")]
    Closed,
    /// Peer answered with a message of the wrong kind.
    #[error("unexpected response {0:?}")]
    Unexpected(Response),
}

impl From<ProtocolError> for RegisterError {
    fn from(err: ProtocolError) -> Self {
        Self::transport(err)
    }
}

/// Writes one frame and flushes.
///
/// # Errors
///
/// [`ProtocolError::Codec`] when encoding fails, [`ProtocolError::Io`] on
/// socket failure.
pub fn write_frame<W: Write, T: Serialize>(
    writer: &mut W,
    message: &T,
) -> Result<(), ProtocolError> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame; `None` at a clean end of stream.
///
/// # Errors
///
/// [`ProtocolError::Io`] on socket failure or timeout,
/// [`ProtocolError::Codec`] for a malformed frame.
pub fn read_frame<R: BufRead, T: DeserializeOwned>(
    reader: &mut R,
) -> Result<Option<T>, ProtocolError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}

/// Closes a socket when interrupted, unblocking any thread reading from it.
#[derive(Debug)]
pub(crate) struct ShutdownOnInterrupt(pub(crate) TcpStream);

impl Interrupt for ShutdownOnInterrupt {
    fn interrupt(&self) {
        // Already-closed sockets report an error we have no use for.
        let _ = self.0.shutdown(Shutdown::Both);
    }
}
