//! Chained builder over the socket factory
//!
//! [`SocketBuilder`] collects the parameters the free functions take one by
//! one (bind address, port, backlog, address reuse, TCP options) and hands
//! them to [`listen`], [`connect_tcp`], [`open_udp_socket`] or
//! [`connect_udp`] when a terminal method is called.
//!
//! # Examples
//!
//! ```rust,no_run
//! use core_sockets::SocketBuilder;
//!
//! // TCP listener on an OS-assigned port
//! let (listener, port) = SocketBuilder::new()
//!     .bind("127.0.0.1")
//!     .backlog(64)
//!     .reuse_addr(true)
//!     .keepalive(5, 2, 3)
//!     .listen()?;
//!
//! // Client with the same keepalive timers
//! let client = SocketBuilder::new()
//!     .keepalive(5, 2, 3)
//!     .connect("127.0.0.1", port)?;
//!
//! // UDP receiver on a fixed port
//! let (rx, _) = SocketBuilder::new().port(9000).udp()?;
//! # Ok::<(), core_sockets::SocketError>(())
//! ```

use crate::config::TcpOptions;
use crate::error::Result;
use crate::socket::Socket;
use crate::tcp::{connect_tcp, listen};
use crate::udp::{connect_udp, open_udp_socket};

/// Socket parameters collected by method chaining
///
/// Configuration methods consume the builder and return it, so a chain
/// ends in exactly one terminal call. Nothing touches the OS before that.
#[derive(Debug, Clone)]
pub struct SocketBuilder {
    bind_addr: Option<String>,
    port: u16,
    backlog: i32,
    reuse_addr: bool,
    options: Option<TcpOptions>,
}

impl SocketBuilder {
    /// All interfaces, OS-assigned port, backlog 1024, no reuse, no TCP
    /// options.
    pub fn new() -> Self {
        Self { bind_addr: None, port: 0, backlog: 1024, reuse_addr: false, options: None }
    }

    /// Local interface to bind, as a literal address or a host name
    ///
    /// **Default**: all interfaces
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = Some(addr.to_owned());
        self
    }

    /// Local port for [`listen`](Self::listen) and [`udp`](Self::udp).
    /// Connecting sockets always use an ephemeral port.
    ///
    /// **Default**: `0` (OS-assigned)
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Maximum pending connections for [`listen`](Self::listen)
    ///
    /// **Default**: 1024
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Request SO_REUSEADDR (and SO_REUSEPORT where available) before
    /// binding
    ///
    /// **Default**: `false`
    pub fn reuse_addr(mut self, on: bool) -> Self {
        self.reuse_addr = on;
        self
    }

    /// Replace the TCP options wholesale
    pub fn options(mut self, options: TcpOptions) -> Self {
        self.options = Some(options);
        self
    }

    fn options_mut(&mut self) -> &mut TcpOptions {
        self.options.get_or_insert_with(TcpOptions::default)
    }

    /// Keepalive with explicit timers; see [`TcpOptions::keepalive`]
    pub fn keepalive(mut self, idle_secs: i32, interval_secs: i32, count: i32) -> Self {
        let o = self.options_mut();
        o.keep_alive = true;
        o.keep_idle_secs = Some(idle_secs);
        o.keep_interval_secs = Some(interval_secs);
        o.keep_count = Some(count);
        self
    }

    /// Enable or disable TCP_NODELAY
    ///
    /// **Default**: `true` once any TCP option is set
    pub fn nodelay(mut self, on: bool) -> Self {
        self.options_mut().no_delay = on;
        self
    }

    /// TCP_USER_TIMEOUT in milliseconds (Linux/Android only)
    pub fn user_timeout(mut self, ms: i32) -> Self {
        self.options_mut().user_timeout_ms = Some(ms);
        self
    }

    /// Ignore SIGPIPE process-wide when the options are applied
    pub fn ignore_broken_pipe(mut self, on: bool) -> Self {
        self.options_mut().ignore_broken_pipe = on;
        self
    }

    /// Builds a listening TCP socket; returns it with its bound port.
    pub fn listen(self) -> Result<(Socket, u16)> {
        listen(self.port, self.bind_addr.as_deref(), self.backlog, self.reuse_addr, self.options.as_ref())
    }

    /// Connects a TCP socket to `host:port` from the configured interface.
    pub fn connect(self, host: &str, port: u16) -> Result<Socket> {
        connect_tcp(host, port, self.bind_addr.as_deref(), self.options.as_ref())
    }

    /// Builds a bound UDP socket; returns it with its bound port. TCP
    /// options are ignored.
    pub fn udp(self) -> Result<(Socket, u16)> {
        open_udp_socket(self.port, self.bind_addr.as_deref(), self.reuse_addr)
    }

    /// Builds a UDP socket whose default peer is `host:port`.
    pub fn connect_udp(self, host: &str, port: u16) -> Result<Socket> {
        connect_udp(host, port, self.bind_addr.as_deref())
    }
}

impl Default for SocketBuilder {
    fn default() -> Self {
        Self::new()
    }
}
