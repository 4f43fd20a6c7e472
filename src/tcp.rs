//! TCP connection operations
//!
//! Server side: [`listen`] creates, binds and marks a stream socket passive,
//! then [`accept_with_timeout`] waits a bounded time for one connection.
//! Client side: [`connect_tcp`] resolves the target and performs a blocking
//! connect.
//!
//! A listening socket never carries data, and an accepted or connected
//! socket never accepts; the returned [`Socket`]s are used only for the
//! operations of their role.
//!
//! # Examples
//!
//! ## Server
//!
//! ```rust,no_run
//! use core_sockets::{accept_with_timeout, io, listen};
//! use std::time::Duration;
//!
//! let (listener, port) = listen(0, Some("127.0.0.1"), 16, true, None)?;
//! println!("listening on {port}");
//! loop {
//!     match accept_with_timeout(&listener, Duration::from_secs(1))? {
//!         Some(conn) => {
//!             let mut buf = [0u8; 4];
//!             if io::read_all(&conn, &mut buf)? == 4 {
//!                 io::write_all(&conn, &buf)?;
//!             }
//!         }
//!         None => continue, // nobody called
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Client
//!
//! ```rust,no_run
//! use core_sockets::{connect_tcp, io, TcpOptions};
//!
//! let sock = connect_tcp("localhost", 8080, None, Some(&TcpOptions::default()))?;
//! io::write_all(&sock, b"ping")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::config::{apply_tcp_options, TcpOptions};
use crate::error::{Result, SocketError};
use crate::io::{accept, connect, poll_readable};
use crate::raw::{self as r, Type};
use crate::socket::{connect_source, open_bound, open_socket, resolve_host, Socket};
use std::time::Duration;

/// Opens a TCP socket bound to `port` on `bind_addr`; see [`open_socket`].
pub fn open_tcp_socket(port: u16, bind_addr: Option<&str>, reuse_addr: bool) -> Result<(Socket, u16)> {
    open_socket(Type::Stream, port, bind_addr, reuse_addr)
}

/// Creates a listening TCP socket.
///
/// Opens a stream socket on `port` (0 = OS-assigned) and `bind_addr`
/// (`None` = all interfaces), applies `options` if given, and starts
/// listening with `backlog`. Failing to apply any option is fatal here.
///
/// Returns the listener and the port it is bound to. On failure the socket
/// is closed.
pub fn listen(
    port: u16,
    bind_addr: Option<&str>,
    backlog: i32,
    reuse_addr: bool,
    options: Option<&TcpOptions>,
) -> Result<(Socket, u16)> {
    let (sock, _) = open_tcp_socket(port, bind_addr, reuse_addr).map_err(|e| {
        log::warn!("listen: socket didn't open");
        e
    })?;

    if let Some(opts) = options {
        apply_tcp_options(&sock, opts).map_err(|e| {
            log::warn!("listen: unable to set tcp options");
            e
        })?;
    }

    let os = sock.checked()?;
    r::listen_raw(os, backlog).map_err(|e| {
        log::warn!("listen: listen() failed: {e}");
        SocketError::Listen(e)
    })?;

    let bound = r::local_addr(os).map_err(|e| {
        log::warn!("listen: cannot get socket name: {e}");
        SocketError::LocalName(e)
    })?;
    log::debug!("listening on {bound} (backlog {backlog})");
    Ok((sock, bound.port()))
}

/// Waits up to `timeout` for a connection on `listener` and accepts it.
///
/// Returns `Ok(None)` when the time runs out with nothing pending; that is
/// not an error. Only a failed wait or a failed `accept` is an `Err`.
pub fn accept_with_timeout(listener: &Socket, timeout: Duration) -> Result<Option<Socket>> {
    let os = listener.checked()?;
    let ready = poll_readable(listener, Some(timeout)).map_err(|e| {
        log::warn!("accept_with_timeout: poll failed: {e}");
        SocketError::Accept(e)
    })?;
    if !ready {
        return Ok(None);
    }
    let conn = accept(listener).map_err(|e| {
        log::warn!("accept_with_timeout: accept() failed: {e}");
        SocketError::Accept(e)
    })?;
    log::debug!("accepted connection on {:?}", r::local_addr(os).ok());
    Ok(Some(conn))
}

/// Connects to `host:port`.
///
/// `host` is tried as a literal address first and resolved by name
/// otherwise. The local end is bound to `bind_addr` if given (any port),
/// and `options` are applied before connecting. Every failure closes the
/// socket; resolution failures are [`SocketError::Resolve`], connect
/// failures [`SocketError::Connect`] naming `host:port`.
pub fn connect_tcp(host: &str, port: u16, bind_addr: Option<&str>, options: Option<&TcpOptions>) -> Result<Socket> {
    let target = resolve_host(host, port).map_err(|e| {
        log::warn!("connect_tcp: error finding host by name ({host})");
        e
    })?;

    let (sock, _) = open_bound(Type::Stream, connect_source(&target, bind_addr)?, false).map_err(|e| {
        log::warn!("connect_tcp: can't open socket");
        e
    })?;

    if let Some(opts) = options {
        apply_tcp_options(&sock, opts).map_err(|e| {
            log::warn!("connect_tcp: unable to set tcp options");
            e
        })?;
    }

    connect(&sock, target).map_err(|source| {
        log::warn!("connect_tcp: could not connect to machine {target} ({host}:{port}): {source}");
        SocketError::Connect { host: host.to_owned(), port, source }
    })?;
    Ok(sock)
}
