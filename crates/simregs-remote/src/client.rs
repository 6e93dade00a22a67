//! Address space reached over a TCP connection.

use std::io::BufReader;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use simregs_core::{
    AddressSpace, CancelToken, Interrupt, RegisterError, WaitCondition, WaitOutcome,
};
use tracing::{debug, trace};

use crate::protocol::{
    read_frame, write_frame, ProtocolError, Request, Response, ShutdownOnInterrupt,
};

/// Default bound on establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default bound on a non-blocking round trip.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);
/// Default number of idle connections kept for reuse.
pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 4;

/// Client connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Bound on establishing a connection.
    pub connect_timeout: Duration,
    /// Bound on reads, writes and the slack added to bounded waits;
    /// [`Duration::ZERO`] disables it.
    pub io_timeout: Duration,
    /// Idle connections kept for reuse.
    pub max_idle_connections: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
        }
    }
}

#[derive(Debug)]
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(addr: SocketAddr, config: &RemoteConfig) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(nonzero(config.io_timeout))?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    fn call(
        &mut self,
        request: &Request,
        read_timeout: Option<Duration>,
    ) -> Result<Response, ProtocolError> {
        self.reader.get_ref().set_read_timeout(read_timeout)?;
        write_frame(&mut self.writer, request)?;
        read_frame(&mut self.reader)?.ok_or(ProtocolError::Closed)
    }
}

const fn nonzero(duration: Duration) -> Option<Duration> {
    if duration.is_zero() {
        None
    } else {
        Some(duration)
    }
}

/// [`AddressSpace`] whose every call is a request/response round trip.
///
/// Each call checks out a connection for its whole duration, so calls from
/// one thread stay in program order and a blocking wait never holds up
/// other threads. Connections that fail are dropped rather than reused.
#[derive(Debug)]
pub struct RemoteAddressSpace {
    addr: SocketAddr,
    config: RemoteConfig,
    idle: Mutex<Vec<Connection>>,
}

impl RemoteAddressSpace {
    /// Connects to a register server.
    ///
    /// # Errors
    ///
    /// [`RegisterError::Transport`] when the address does not resolve or the
    /// first connection cannot be established.
    pub fn connect(addr: impl ToSocketAddrs, config: RemoteConfig) -> Result<Self, RegisterError> {
        let addr = addr
            .to_socket_addrs()
            .map_err(RegisterError::transport)?
            .next()
            .ok_or_else(|| RegisterError::transport("address resolved to nothing"))?;
        let first = Connection::open(addr, &config)?;
        debug!(%addr, "connected to register server");
        Ok(Self {
            addr,
            config,
            idle: Mutex::new(vec![first]),
        })
    }

    /// Server address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.addr
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn checkout(&self) -> Result<Connection, ProtocolError> {
        let pooled = self.idle.lock().pop();
        match pooled {
            Some(connection) => Ok(connection),
            None => Connection::open(self.addr, &self.config),
        }
    }

    fn checkin(&self, connection: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle_connections {
            idle.push(connection);
        }
    }

    fn call(
        &self,
        request: &Request,
        read_timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
    ) -> Result<Response, RegisterError> {
        let mut connection = self.checkout()?;
        let hook: Option<Arc<dyn Interrupt>> = match cancel {
            Some(_) => Some(Arc::new(ShutdownOnInterrupt(
                connection.writer.try_clone().map_err(RegisterError::transport)?,
            ))),
            None => None,
        };
        let registration = cancel
            .zip(hook.as_ref())
            .map(|(token, hook)| token.register(Arc::downgrade(hook)));
        let cancelled = || cancel.is_some_and(CancelToken::is_cancelled);
        if cancelled() {
            return Err(RegisterError::Interrupted);
        }

        trace!(peer = %self.addr, ?request, "sending request");
        let result = connection.call(request, read_timeout);
        drop(registration);

        match result {
            Ok(response) => {
                // A cancel racing the reply may already have shut the socket.
                if !cancelled() {
                    self.checkin(connection);
                }
                match response {
                    Response::Error { error } => Err(error),
                    response => Ok(response),
                }
            }
            Err(_) if cancelled() => Err(RegisterError::Interrupted),
            Err(err) => {
                debug!(peer = %self.addr, %err, "dropping failed connection");
                Err(err.into())
            }
        }
    }

    fn round_trip(&self, request: &Request) -> Result<Response, RegisterError> {
        self.call(request, nonzero(self.config.io_timeout), None)
    }
}

fn unexpected(response: Response) -> RegisterError {
    ProtocolError::Unexpected(response).into()
}

impl AddressSpace for RemoteAddressSpace {
    fn read(&self, address: u32) -> Result<u32, RegisterError> {
        match self.round_trip(&Request::Read { address })? {
            Response::Value { value } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    fn write(&self, address: u32, value: u32) -> Result<(), RegisterError> {
        match self.round_trip(&Request::Write { address, value })? {
            Response::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn wait(
        &self,
        condition: &WaitCondition,
        cancel: Option<&CancelToken>,
    ) -> Result<WaitOutcome, RegisterError> {
        let read_timeout = condition
            .time_limit()
            .map(|limit| limit + self.config.io_timeout);
        let request = Request::Wait {
            condition: *condition,
        };
        match self.call(&request, read_timeout, cancel)? {
            Response::Waited { outcome } => Ok(outcome),
            other => Err(unexpected(other)),
        }
    }

    fn provides_address(&self, address: u32) -> Result<bool, RegisterError> {
        match self.round_trip(&Request::ProvidesAddress { address })? {
            Response::Provides { provided } => Ok(provided),
            other => Err(unexpected(other)),
        }
    }

    fn describe(&self, address: u32) -> Result<String, RegisterError> {
        match self.round_trip(&Request::Describe { address })? {
            Response::Label { label } => Ok(label),
            other => Err(unexpected(other)),
        }
    }
}
