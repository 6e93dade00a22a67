//! Remote register address space for simregs.
//!
//! [`RegisterServer`] exposes any [`simregs_core::AddressSpace`] over TCP and
//! [`RemoteAddressSpace`] implements the same contract on the client side,
//! so code written against the trait runs unchanged in or out of process.

/// Wire messages and newline-delimited JSON framing.
pub mod protocol;
pub use protocol::{read_frame, write_frame, ProtocolError, Request, Response};

/// Client-side address space.
pub mod client;
pub use client::{
    RemoteAddressSpace, RemoteConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT,
    DEFAULT_MAX_IDLE_CONNECTIONS,
};

/// Server exposing an address space to remote clients.
pub mod server;
pub use server::{execute, RegisterServer, ServerHandle};
