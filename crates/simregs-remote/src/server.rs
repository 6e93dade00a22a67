//! TCP server exposing an [`AddressSpace`] to remote clients.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use simregs_core::{AddressSpace, CancelToken, Interrupt};
use tracing::{debug, info, trace, warn};

use crate::protocol::{read_frame, write_frame, Request, Response, ShutdownOnInterrupt};

/// Serves one address space to any number of connections.
///
/// Every connection gets a reader thread and an executor thread, so a
/// blocking wait on one connection never stalls another. Closing a
/// connection interrupts the wait it has in flight.
pub struct RegisterServer {
    listener: TcpListener,
    space: Arc<dyn AddressSpace>,
}

impl std::fmt::Debug for RegisterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterServer")
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl RegisterServer {
    /// Binds a listening socket.
    ///
    /// # Errors
    ///
    /// Propagates socket errors.
    pub fn bind(addr: impl ToSocketAddrs, space: Arc<dyn AddressSpace>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, "register server listening");
        Ok(Self { listener, space })
    }

    /// Bound address, useful after binding port `0`.
    ///
    /// # Errors
    ///
    /// Propagates socket errors.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// Cancelling `shutdown` closes every open connection. A blocked
    /// `accept` only notices after the next incoming connection, which
    /// [`ServerHandle::shutdown`] provides.
    ///
    /// # Errors
    ///
    /// Propagates fatal listener errors.
    pub fn serve(self, shutdown: &CancelToken) -> io::Result<()> {
        for stream in self.listener.incoming() {
            if shutdown.is_cancelled() {
                break;
            }
            match stream {
                Ok(stream) => {
                    let space = Arc::clone(&self.space);
                    let shutdown = shutdown.clone();
                    thread::Builder::new()
                        .name("simregs-conn".into())
                        .spawn(move || serve_connection(stream, space.as_ref(), &shutdown))?;
                }
                Err(err) => warn!(%err, "accept failed"),
            }
        }
        info!("register server stopped");
        Ok(())
    }

    /// Runs [`serve`](Self::serve) on a background thread.
    ///
    /// # Errors
    ///
    /// Propagates socket or thread-spawn errors.
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let shutdown = CancelToken::new();
        let token = shutdown.clone();
        let thread = thread::Builder::new()
            .name("simregs-accept".into())
            .spawn(move || {
                if let Err(err) = self.serve(&token) {
                    warn!(%err, "register server failed");
                }
            })?;
        Ok(ServerHandle {
            addr,
            shutdown,
            thread: Some(thread),
        })
    }
}

/// Owner of a background server; stops it on drop.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address clients connect to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting, closes every connection and joins the accept thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.cancel();
        // Wakes the blocking accept so it sees the flag.
        let _ = TcpStream::connect(self.addr);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

fn serve_connection(stream: TcpStream, space: &dyn AddressSpace, shutdown: &CancelToken) {
    let peer = stream
        .peer_addr()
        .map_or_else(|_| "unknown".to_string(), |addr| addr.to_string());
    debug!(%peer, "connection accepted");
    if let Err(err) = run_connection(stream, space, shutdown, &peer) {
        debug!(%peer, %err, "connection failed");
    }
    debug!(%peer, "connection closed");
}

fn run_connection(
    stream: TcpStream,
    space: &dyn AddressSpace,
    shutdown: &CancelToken,
    peer: &str,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let closer: Arc<dyn Interrupt> = Arc::new(ShutdownOnInterrupt(stream.try_clone()?));
    let _registration = shutdown.register(Arc::downgrade(&closer));
    if shutdown.is_cancelled() {
        return Ok(());
    }

    let disconnected = CancelToken::new();
    let (requests, inbox) = mpsc::channel::<Request>();
    let reader = {
        let stream = stream.try_clone()?;
        let disconnected = disconnected.clone();
        let peer = peer.to_string();
        thread::Builder::new()
            .name("simregs-read".into())
            .spawn(move || {
                let mut reader = BufReader::new(stream);
                loop {
                    match read_frame::<_, Request>(&mut reader) {
                        Ok(Some(request)) => {
                            if requests.send(request).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            debug!(%peer, %err, "dropping connection");
                            break;
                        }
                    }
                }
                disconnected.cancel();
            })?
    };

    let mut writer = stream;
    for request in inbox {
        trace!(%peer, ?request, "executing request");
        let response = execute(space, request, &disconnected);
        if let Err(err) = write_frame(&mut writer, &response) {
            debug!(%peer, %err, "reply failed");
            break;
        }
    }
    closer.interrupt();
    let _ = reader.join();
    Ok(())
}

/// Runs one request against `space`.
///
/// Waits observe `cancel`, which fires when the requesting peer goes away.
#[must_use]
pub fn execute(space: &dyn AddressSpace, request: Request, cancel: &CancelToken) -> Response {
    let result = match request {
        Request::Read { address } => space.read(address).map(|value| Response::Value { value }),
        Request::Write { address, value } => {
            space.write(address, value).map(|()| Response::Done)
        }
        Request::Wait { condition } => space
            .wait(&condition, Some(cancel))
            .map(|outcome| Response::Waited { outcome }),
        Request::ProvidesAddress { address } => space
            .provides_address(address)
            .map(|provided| Response::Provides { provided }),
        Request::Describe { address } => space
            .describe(address)
            .map(|label| Response::Label { label }),
    };
    result.unwrap_or_else(|error| Response::Error { error })
}
