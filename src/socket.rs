//! Socket handles and the socket factory
//!
//! A [`Socket`] owns exactly one OS socket, or is BAD. Handles are created
//! by [`open_socket`] (and by the TCP/UDP helpers built on it), and become
//! BAD again when [`Socket::close`] succeeds or fails. Dropping an open
//! socket closes it.
//!
//! Closing or shutting down a BAD handle is not an OS error: it returns
//! [`CloseStatus::BadHandle`], whose integer code is [`BAD_HANDLE_STATUS`],
//! so redundant closes can be told apart from real failures.
//!
//! # Examples
//!
//! ```rust,no_run
//! use core_sockets::{open_socket, Type};
//!
//! let (mut sock, port) = open_socket(Type::Dgram, 0, Some("127.0.0.1"), false)?;
//! println!("bound to port {port}");
//! sock.close()?;
//! assert!(sock.is_bad());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{Result, SocketError};
use crate::raw::{self as r, OsSocket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

/// Integer status reported for a close or shutdown of a BAD handle.
///
/// Distinct from every OS result (`0` success, `-1` failure).
pub const BAD_HANDLE_STATUS: i32 = -100;

/// Outcome of a close or shutdown that did not fail at the OS level
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CloseStatus {
    /// The OS call succeeded
    Closed,
    /// The handle was already BAD; nothing was done
    BadHandle,
}

impl CloseStatus {
    /// Integer view: `0` for [`CloseStatus::Closed`], [`BAD_HANDLE_STATUS`]
    /// for [`CloseStatus::BadHandle`]
    pub fn code(self) -> i32 {
        match self {
            CloseStatus::Closed => 0,
            CloseStatus::BadHandle => BAD_HANDLE_STATUS,
        }
    }
}

/// Owned OS socket handle
///
/// All I/O goes through `&Socket`, so one thread may read while another
/// writes. Nothing beyond the OS's own serialization protects concurrent
/// use otherwise. Closing a socket another thread is blocked on is
/// undefined at the OS level and must not be relied on to cancel the call.
#[derive(Debug)]
pub struct Socket {
    os: OsSocket,
}

impl Socket {
    /// A handle that names no socket
    pub const fn bad() -> Self {
        Self { os: r::BAD_SOCKET }
    }

    pub(crate) fn from_os(os: OsSocket) -> Self {
        Self { os }
    }

    /// Takes ownership of a raw handle obtained elsewhere.
    ///
    /// # Safety
    ///
    /// `os` must be an open socket (or the platform's bad value) that
    /// nothing else will close.
    pub unsafe fn from_raw(os: OsSocket) -> Self {
        Self { os }
    }

    /// Releases ownership without closing; the handle becomes BAD.
    pub fn into_raw(mut self) -> OsSocket {
        std::mem::replace(&mut self.os, r::BAD_SOCKET)
    }

    /// `true` once the handle is unusable
    pub fn is_bad(&self) -> bool {
        self.os == r::BAD_SOCKET
    }

    /// Raw handle, or an `InvalidInput` error for a BAD socket
    pub(crate) fn raw(&self) -> io::Result<OsSocket> {
        if self.is_bad() {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "bad socket handle"))
        } else {
            Ok(self.os)
        }
    }

    /// Raw handle for setup paths that report [`SocketError`]
    pub(crate) fn checked(&self) -> Result<OsSocket> {
        if self.is_bad() { Err(SocketError::BadHandle) } else { Ok(self.os) }
    }

    /// Address this socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        r::local_addr(self.raw()?)
    }

    /// Port this socket is bound to
    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.local_addr()?.port())
    }

    /// Closes the socket. The handle is BAD afterwards whatever the outcome.
    pub fn close(&mut self) -> io::Result<CloseStatus> {
        if self.is_bad() {
            return Ok(CloseStatus::BadHandle);
        }
        let os = std::mem::replace(&mut self.os, r::BAD_SOCKET);
        r::close_raw(os).map(|()| CloseStatus::Closed)
    }

    /// Shuts down both directions; the handle stays open.
    pub fn shutdown(&self) -> io::Result<CloseStatus> {
        if self.is_bad() {
            return Ok(CloseStatus::BadHandle);
        }
        r::shutdown_raw(self.os).map(|()| CloseStatus::Closed)
    }
}

impl Default for Socket {
    fn default() -> Self {
        Self::bad()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if !self.is_bad() {
            if let Err(e) = r::close_raw(self.os) {
                log::warn!("close on drop failed: {e}");
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        impl std::os::unix::io::AsRawFd for Socket {
            fn as_raw_fd(&self) -> std::os::unix::io::RawFd { self.os }
        }
    } else {
        impl std::os::windows::io::AsRawSocket for Socket {
            fn as_raw_socket(&self) -> std::os::windows::io::RawSocket { self.os }
        }
    }
}

/// Close `sock`, returning the integer status: `0` on success, `-1` on an
/// OS failure, [`BAD_HANDLE_STATUS`] if it was already BAD.
pub fn close_socket(sock: &mut Socket) -> i32 {
    match sock.close() {
        Ok(status) => status.code(),
        Err(e) => {
            log::warn!("close_socket: {e}");
            -1
        }
    }
}

/// Resolve `host` to one socket address, trying it as a literal address
/// first and falling back to name resolution. IPv4 results are preferred.
pub fn resolve_host(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    let resolve_err = |source| SocketError::Resolve { host: host.to_owned(), source };
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs().map_err(resolve_err)?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| resolve_err(io::Error::new(io::ErrorKind::NotFound, "no addresses returned")))
}

/// Local bind address for an optional interface name (`None` = all interfaces)
pub(crate) fn bind_target(bind_addr: Option<&str>, port: u16) -> Result<SocketAddr> {
    match bind_addr {
        None => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
        Some(host) => resolve_host(host, port).map_err(|e| {
            log::warn!("open_socket: can't get {host} host entry");
            e
        }),
    }
}

/// Local address for a socket that will connect to `target`: `bind_addr`
/// on any port, or the unspecified address of `target`'s family.
pub(crate) fn connect_source(target: &SocketAddr, bind_addr: Option<&str>) -> Result<SocketAddr> {
    match bind_addr {
        Some(_) => bind_target(bind_addr, 0),
        None if target.is_ipv4() => Ok(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)),
        None => Ok(SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0)),
    }
}

fn enable_reuse(os: OsSocket) {
    if let Err(e) = r::set_reuse_addr(os, true) {
        log::warn!("setsockopt(SO_REUSEADDR) failed: {e}");
    }
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    if let Err(e) = r::set_reuse_port(os, true) {
        log::warn!("setsockopt(SO_REUSEPORT) failed: {e}");
    }
}

/// Opens a socket of type `ty` bound to `port` on `bind_addr`.
///
/// `port` 0 asks the OS for an ephemeral port and `bind_addr` `None` binds
/// every interface. With `reuse_addr`, `SO_REUSEADDR` (and `SO_REUSEPORT`
/// where it exists) are requested first; failing to set them is logged and
/// ignored.
///
/// Returns the socket and the port actually bound. Any failure closes the
/// partially created socket before returning.
pub fn open_socket(ty: Type, port: u16, bind_addr: Option<&str>, reuse_addr: bool) -> Result<(Socket, u16)> {
    let target = bind_target(bind_addr, port)?;
    open_bound(ty, target, reuse_addr)
}

pub(crate) fn open_bound(ty: Type, target: SocketAddr, reuse_addr: bool) -> Result<(Socket, u16)> {
    let os = r::socket(r::Domain::of(&target), ty, ty.protocol()).map_err(|e| {
        log::warn!("open_socket: can't open socket: {e}");
        SocketError::Create(e)
    })?;
    // Dropping the handle on an early return closes it.
    let sock = Socket::from_os(os);

    if reuse_addr {
        enable_reuse(os);
    }

    if let Err(source) = r::bind_raw(os, target) {
        log::warn!("open_socket: can't bind address {target}: {source}");
        return Err(SocketError::Bind { addr: target, source });
    }

    let bound = r::local_addr(os).map_err(|e| {
        log::warn!("open_socket: cannot get socket name: {e}");
        SocketError::LocalName(e)
    })?;
    log::debug!("open_socket: {ty:?} socket bound to {bound}");
    Ok((sock, bound.port()))
}

/// Local address to advertise to peers, as a dotted string.
///
/// In priority order: `candidate` if given, the address `bound` is bound
/// to if given, then the first address this machine's hostname resolves to.
pub fn resolve_local_address(candidate: Option<&str>, bound: Option<&Socket>) -> Result<String> {
    if let Some(addr) = candidate {
        return Ok(addr.to_owned());
    }
    if let Some(sock) = bound {
        let addr = r::local_addr(sock.checked()?).map_err(|e| {
            log::warn!("resolve_local_address: cannot get socket name: {e}");
            SocketError::LocalName(e)
        })?;
        return Ok(addr.ip().to_string());
    }
    let name = r::hostname().map_err(|e| {
        log::warn!("resolve_local_address: error finding local hostname: {e}");
        SocketError::Io(e)
    })?;
    let addr = resolve_host(&name, 0).map_err(|e| {
        log::warn!("resolve_local_address: error finding host by name ({name})");
        e
    })?;
    Ok(addr.ip().to_string())
}
