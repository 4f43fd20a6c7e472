//! Blocking system-call layer
//!
//! This module is the only place in the crate that talks to the operating
//! system. It exposes one set of free functions with identical signatures on
//! every platform, selected at compile time:
//!
//! ## Unix (Linux, macOS, the BSDs, Android)
//! - POSIX socket APIs through `libc`
//! - File descriptor handles, `-1` as the bad-handle value
//! - Readiness through `poll(2)`
//!
//! ## Windows
//! - WinSock2 through `windows-sys`, with `WSAStartup` run once on first use
//! - `SOCKET` handles, `INVALID_SOCKET` as the bad-handle value
//! - Readiness through `select` with the socket in both the read and the
//!   exception set
//!
//! # Capability set
//!
//! `socket`, `bind_raw`, `connect_raw`, `listen_raw`, `accept_raw`,
//! `send_raw`, `recv_raw`, `close_raw`, `shutdown_raw`, `poll_read_raw`,
//! `poll_write_raw`, `take_error`, `local_addr` and the integer
//! socket-option setters/getters.
//!
//! None of these functions retry on `EINTR`; the interrupt-safe loops live in
//! [`crate::io`].
//!
//! # Safety
//!
//! Every `unsafe` block in the crate is here: the socket calls themselves,
//! `sockaddr` storage filled in by the kernel, and option buffers. The
//! functions exported are safe to call with any handle value.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Address family of a socket
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Domain {
    /// IPv4 protocol
    Ipv4,
    /// IPv6 protocol
    Ipv6,
}

impl Domain {
    /// Domain matching the family of `addr`
    pub fn of(addr: &SocketAddr) -> Self {
        if addr.is_ipv4() { Domain::Ipv4 } else { Domain::Ipv6 }
    }
}

/// Stream or datagram
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    /// TCP stream socket
    Stream,
    /// UDP datagram socket
    Dgram,
}

impl Type {
    /// Transport protocol carried by this socket type
    pub fn protocol(self) -> Protocol {
        match self { Type::Stream => Protocol::Tcp, Type::Dgram => Protocol::Udp }
    }
}

/// Transport protocol implied by a [`Type`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// TCP protocol
    Tcp,
    /// UDP protocol
    Udp,
}

#[allow(dead_code)]
fn unsupported(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("{what} is not supported on this platform"))
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use std::os::unix::io::RawFd;
        /// Unix socket handle type
        pub type OsSocket = RawFd;
        /// Handle value that never names an open socket
        pub const BAD_SOCKET: OsSocket = -1;

        /// `sockaddr_in`/`sockaddr_in6` ready to pass to the kernel
        #[derive(Debug)]
        pub enum SockAddr {
            /// IPv4 socket address
            V4(libc::sockaddr_in),
            /// IPv6 socket address
            V6(libc::sockaddr_in6),
        }

        impl SockAddr {
            fn as_ptr(&self) -> *const libc::sockaddr {
                match self {
                    SockAddr::V4(s) => s as *const _ as *const libc::sockaddr,
                    SockAddr::V6(s) => s as *const _ as *const libc::sockaddr,
                }
            }
        }

        /// Kernel form of `addr`, with its family and length
        pub fn to_sockaddr(addr: SocketAddr) -> (Domain, SockAddr, libc::socklen_t) {
            match addr {
                SocketAddr::V4(a) => {
                    let mut s: libc::sockaddr_in = unsafe { std::mem::zeroed() };
                    s.sin_family = libc::AF_INET as _;
                    s.sin_port = a.port().to_be();
                    // octets are already in network order
                    s.sin_addr = libc::in_addr { s_addr: u32::from_ne_bytes(a.ip().octets()) };
                    (Domain::Ipv4, SockAddr::V4(s), std::mem::size_of::<libc::sockaddr_in>() as _)
                }
                SocketAddr::V6(a) => {
                    let mut s: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
                    s.sin6_family = libc::AF_INET6 as _;
                    s.sin6_port = a.port().to_be();
                    s.sin6_flowinfo = a.flowinfo();
                    s.sin6_scope_id = a.scope_id();
                    s.sin6_addr = libc::in6_addr { s6_addr: a.ip().octets() };
                    (Domain::Ipv6, SockAddr::V6(s), std::mem::size_of::<libc::sockaddr_in6>() as _)
                }
            }
        }

        fn from_storage(ss: &libc::sockaddr_storage) -> io::Result<SocketAddr> {
            match ss.ss_family as libc::c_int {
                libc::AF_INET => {
                    let sin = unsafe { &*(ss as *const _ as *const libc::sockaddr_in) };
                    let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
                    Ok(SocketAddr::new(IpAddr::V4(ip), u16::from_be(sin.sin_port)))
                }
                libc::AF_INET6 => {
                    let sin6 = unsafe { &*(ss as *const _ as *const libc::sockaddr_in6) };
                    let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
                    Ok(SocketAddr::new(IpAddr::V6(ip), u16::from_be(sin6.sin6_port)))
                }
                _ => Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported address family")),
            }
        }

        fn cvt(rc: libc::c_int) -> io::Result<()> {
            if rc != 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
        }

        /// Create a blocking socket that is not inherited by child processes
        pub fn socket(domain: Domain, ty: Type, proto: Protocol) -> io::Result<OsSocket> {
            let d = match domain { Domain::Ipv4 => libc::AF_INET, Domain::Ipv6 => libc::AF_INET6 };
            let t = match ty { Type::Stream => libc::SOCK_STREAM, Type::Dgram => libc::SOCK_DGRAM };
            let p = match proto { Protocol::Tcp => libc::IPPROTO_TCP, Protocol::Udp => libc::IPPROTO_UDP };
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
            let fd = unsafe { libc::socket(d, t | libc::SOCK_CLOEXEC, p) };
            #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
            let fd = unsafe { libc::socket(d, t, p) };
            if fd < 0 { return Err(io::Error::last_os_error()); }
            set_cloexec(fd)
        }

        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        fn set_cloexec(fd: RawFd) -> io::Result<OsSocket> { Ok(fd) /* set atomically by SOCK_CLOEXEC */ }

        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        fn set_cloexec(fd: RawFd) -> io::Result<OsSocket> {
            if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }
            Ok(fd)
        }

        /// Bind socket to a local address
        pub fn bind_raw(os: OsSocket, addr: SocketAddr) -> io::Result<()> {
            let (_, sa, len) = to_sockaddr(addr);
            cvt(unsafe { libc::bind(os, sa.as_ptr(), len) })
        }

        /// Blocking connect to a remote address
        pub fn connect_raw(os: OsSocket, addr: SocketAddr) -> io::Result<()> {
            let (_, sa, len) = to_sockaddr(addr);
            cvt(unsafe { libc::connect(os, sa.as_ptr(), len) })
        }

        /// Mark the socket passive
        pub fn listen_raw(os: OsSocket, backlog: i32) -> io::Result<()> { cvt(unsafe { libc::listen(os, backlog) }) }

        /// Accept one pending connection
        pub fn accept_raw(os: OsSocket) -> io::Result<OsSocket> {
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
            let fd = unsafe { libc::accept4(os, std::ptr::null_mut(), std::ptr::null_mut(), libc::SOCK_CLOEXEC) };
            #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
            let fd = unsafe { libc::accept(os, std::ptr::null_mut(), std::ptr::null_mut()) };
            if fd < 0 { Err(io::Error::last_os_error()) } else { set_cloexec(fd) }
        }

        /// Address the socket is bound to
        pub fn local_addr(os: OsSocket) -> io::Result<SocketAddr> {
            let mut ss: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
            let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            cvt(unsafe { libc::getsockname(os, &mut ss as *mut _ as *mut libc::sockaddr, &mut len) })?;
            from_storage(&ss)
        }

        /// One `send(2)` call
        pub fn send_raw(os: OsSocket, buf: &[u8]) -> io::Result<usize> {
            let rc = unsafe { libc::send(os, buf.as_ptr() as *const libc::c_void, buf.len(), 0) };
            if rc < 0 { Err(io::Error::last_os_error()) } else { Ok(rc as usize) }
        }

        /// One `recv(2)` call
        pub fn recv_raw(os: OsSocket, buf: &mut [u8]) -> io::Result<usize> {
            let rc = unsafe { libc::recv(os, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
            if rc < 0 { Err(io::Error::last_os_error()) } else { Ok(rc as usize) }
        }

        /// Release the descriptor
        pub fn close_raw(os: OsSocket) -> io::Result<()> { cvt(unsafe { libc::close(os) }) }

        /// Full-duplex shutdown
        pub fn shutdown_raw(os: OsSocket) -> io::Result<()> { cvt(unsafe { libc::shutdown(os, libc::SHUT_RDWR) }) }

        /// Wait once for read readiness. `None` waits forever.
        ///
        /// `POLLERR`, `POLLHUP` and `POLLNVAL` are reported as errors.
        pub fn poll_read_raw(os: OsSocket, timeout: Option<Duration>) -> io::Result<bool> {
            let ms = match timeout {
                None => -1,
                Some(d) => d.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int,
            };
            let mut pfd = libc::pollfd { fd: os, events: libc::POLLIN, revents: 0 };
            let rc = unsafe { libc::poll(&mut pfd, 1, ms) };
            if rc < 0 { return Err(io::Error::last_os_error()); }
            if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, format!("exceptional condition on socket (revents {:#x})", pfd.revents)));
            }
            Ok(rc > 0)
        }

        /// Wait once for a socket to turn writable or fail. `None` waits
        /// forever. Failure conditions count as ready; read them with
        /// [`take_error`].
        pub fn poll_write_raw(os: OsSocket, timeout: Option<Duration>) -> io::Result<bool> {
            let ms = match timeout {
                None => -1,
                Some(d) => d.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int,
            };
            let mut pfd = libc::pollfd { fd: os, events: libc::POLLOUT, revents: 0 };
            let rc = unsafe { libc::poll(&mut pfd, 1, ms) };
            if rc < 0 { return Err(io::Error::last_os_error()); }
            Ok(rc > 0)
        }

        /// Pending error (SO_ERROR), cleared by reading it
        pub fn take_error(os: OsSocket) -> io::Result<Option<io::Error>> {
            let code = getsockopt_int(os, libc::SOL_SOCKET, libc::SO_ERROR)?;
            Ok((code != 0).then(|| io::Error::from_raw_os_error(code)))
        }

        fn setsockopt_int(fd: RawFd, level: i32, opt: i32, val: i32) -> io::Result<()> {
            let v = val as libc::c_int;
            cvt(unsafe { libc::setsockopt(fd, level, opt, &v as *const _ as _, std::mem::size_of::<libc::c_int>() as _) })
        }

        fn getsockopt_int(fd: RawFd, level: i32, opt: i32) -> io::Result<i32> {
            let mut v: libc::c_int = 0;
            let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
            cvt(unsafe { libc::getsockopt(fd, level, opt, &mut v as *mut _ as _, &mut len) })?;
            Ok(v)
        }

        #[cfg(any(target_os = "macos", target_os = "ios"))]
        const KEEP_IDLE: i32 = libc::TCP_KEEPALIVE;
        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        const KEEP_IDLE: i32 = libc::TCP_KEEPIDLE;

        /// Allow rebinding an address in TIME_WAIT
        pub fn set_reuse_addr(os: OsSocket, on: bool) -> io::Result<()> { setsockopt_int(os, libc::SOL_SOCKET, libc::SO_REUSEADDR, on as i32) }
        /// Let several sockets bind the same port
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly"))]
        pub fn set_reuse_port(os: OsSocket, on: bool) -> io::Result<()> { setsockopt_int(os, libc::SOL_SOCKET, libc::SO_REUSEPORT, on as i32) }
        /// SO_REUSEPORT does not exist here
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly")))]
        pub fn set_reuse_port(_os: OsSocket, _on: bool) -> io::Result<()> { Err(unsupported("SO_REUSEPORT")) }
        /// Disable TCP Nagle algorithm
        pub fn set_tcp_nodelay(os: OsSocket, on: bool) -> io::Result<()> { setsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_NODELAY, on as i32) }
        /// Toggle SO_KEEPALIVE
        pub fn set_keepalive(os: OsSocket, on: bool) -> io::Result<()> { setsockopt_int(os, libc::SOL_SOCKET, libc::SO_KEEPALIVE, on as i32) }
        /// Idle seconds before the first keepalive probe
        pub fn set_keep_idle(os: OsSocket, secs: i32) -> io::Result<()> { setsockopt_int(os, libc::IPPROTO_TCP, KEEP_IDLE, secs) }
        /// Seconds between keepalive probes
        pub fn set_keep_interval(os: OsSocket, secs: i32) -> io::Result<()> { setsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_KEEPINTVL, secs) }
        /// Unanswered probes before the connection is dropped
        pub fn set_keep_count(os: OsSocket, n: i32) -> io::Result<()> { setsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_KEEPCNT, n) }

        pub fn tcp_nodelay(os: OsSocket) -> io::Result<bool> { Ok(getsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_NODELAY)? != 0) }
        pub fn keepalive(os: OsSocket) -> io::Result<bool> { Ok(getsockopt_int(os, libc::SOL_SOCKET, libc::SO_KEEPALIVE)? != 0) }
        pub fn keep_idle(os: OsSocket) -> io::Result<i32> { getsockopt_int(os, libc::IPPROTO_TCP, KEEP_IDLE) }
        pub fn keep_interval(os: OsSocket) -> io::Result<i32> { getsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_KEEPINTVL) }
        pub fn keep_count(os: OsSocket) -> io::Result<i32> { getsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_KEEPCNT) }

        cfg_if::cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "android"))] {
                /// Milliseconds unacknowledged data may stay in flight
                pub fn set_user_timeout(os: OsSocket, ms: i32) -> io::Result<()> { setsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_USER_TIMEOUT, ms) }
                pub fn user_timeout(os: OsSocket) -> io::Result<Option<i32>> { getsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_USER_TIMEOUT).map(Some) }
                /// Native TCP_CORK
                pub fn set_tcp_cork(os: OsSocket, on: bool) -> io::Result<Option<()>> { setsockopt_int(os, libc::IPPROTO_TCP, libc::TCP_CORK, on as i32).map(Some) }
            } else {
                /// TCP_USER_TIMEOUT (not applicable here)
                pub fn set_user_timeout(_os: OsSocket, _ms: i32) -> io::Result<()> { Ok(()) /* not applicable */ }
                pub fn user_timeout(_os: OsSocket) -> io::Result<Option<i32>> { Ok(None) }
                /// No corking primitive; callers fall back to emulation
                pub fn set_tcp_cork(_os: OsSocket, _on: bool) -> io::Result<Option<()>> { Ok(None) }
            }
        }

        /// Ignore SIGPIPE for the whole process
        pub fn ignore_broken_pipe() -> io::Result<()> {
            let prev = unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
            if prev == libc::SIG_ERR { Err(io::Error::last_os_error()) } else { Ok(()) }
        }

        /// This machine's host name
        pub fn hostname() -> io::Result<String> {
            let mut buf = [0u8; 256];
            cvt(unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) })?;
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            String::from_utf8(buf[..end].to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        }

    } else {
        // Windows
        use std::sync::Once;
        use windows_sys::Win32::Networking::WinSock::*;
        use std::os::windows::io::RawSocket;
        /// Windows socket handle type
        pub type OsSocket = RawSocket; // SOCKET
        /// Handle value that never names an open socket
        pub const BAD_SOCKET: OsSocket = INVALID_SOCKET as OsSocket;

        // Not all SDK versions export these through windows-sys.
        const TCP_KEEPIDLE_OPT: i32 = 3;
        const TCP_KEEPCNT_OPT: i32 = 16;
        const TCP_KEEPINTVL_OPT: i32 = 17;

        static WSA_INIT: Once = Once::new();
        fn ensure_wsa() {
            WSA_INIT.call_once(|| unsafe {
                let mut data: WSADATA = std::mem::zeroed();
                let rc = WSAStartup(0x202, &mut data); // MAKEWORD(2,2)
                if rc != 0 { log::error!("WSAStartup failed: {}", rc); }
            });
        }

        fn last_error() -> io::Error { io::Error::from_raw_os_error(unsafe { WSAGetLastError() }) }

        fn cvt(rc: i32) -> io::Result<()> { if rc != 0 { Err(last_error()) } else { Ok(()) } }

        /// `SOCKADDR_IN`/`SOCKADDR_IN6` ready to pass to WinSock
        pub enum SockAddr {
            /// IPv4 socket address
            V4(SOCKADDR_IN),
            /// IPv6 socket address
            V6(SOCKADDR_IN6),
        }

        impl SockAddr {
            fn as_ptr(&self) -> *const SOCKADDR {
                match self {
                    SockAddr::V4(s) => s as *const _ as *const SOCKADDR,
                    SockAddr::V6(s) => s as *const _ as *const SOCKADDR,
                }
            }
        }

        /// Kernel form of `addr`, with its family and length
        pub fn to_sockaddr(addr: SocketAddr) -> (Domain, SockAddr, i32) {
            match addr {
                SocketAddr::V4(a) => {
                    let mut s: SOCKADDR_IN = unsafe { std::mem::zeroed() };
                    s.sin_family = AF_INET as _;
                    s.sin_port = a.port().to_be();
                    s.sin_addr = IN_ADDR { S_un: IN_ADDR_0 { S_addr: u32::from_ne_bytes(a.ip().octets()) } };
                    (Domain::Ipv4, SockAddr::V4(s), std::mem::size_of::<SOCKADDR_IN>() as _)
                }
                SocketAddr::V6(a) => {
                    let mut s: SOCKADDR_IN6 = unsafe { std::mem::zeroed() };
                    s.sin6_family = AF_INET6 as _;
                    s.sin6_port = a.port().to_be();
                    s.sin6_flowinfo = a.flowinfo();
                    s.Anonymous.sin6_scope_id = a.scope_id();
                    s.sin6_addr = IN6_ADDR { u: IN6_ADDR_0 { Byte: a.ip().octets() } };
                    (Domain::Ipv6, SockAddr::V6(s), std::mem::size_of::<SOCKADDR_IN6>() as _)
                }
            }
        }

        fn from_storage(ss: &SOCKADDR_STORAGE) -> io::Result<SocketAddr> {
            match ss.ss_family {
                AF_INET => {
                    let sin = unsafe { &*(ss as *const _ as *const SOCKADDR_IN) };
                    let raw = unsafe { sin.sin_addr.S_un.S_addr };
                    Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(raw.to_ne_bytes())), u16::from_be(sin.sin_port)))
                }
                AF_INET6 => {
                    let sin6 = unsafe { &*(ss as *const _ as *const SOCKADDR_IN6) };
                    let ip = Ipv6Addr::from(unsafe { sin6.sin6_addr.u.Byte });
                    Ok(SocketAddr::new(IpAddr::V6(ip), u16::from_be(sin6.sin6_port)))
                }
                _ => Err(io::Error::new(io::ErrorKind::InvalidData, "unsupported address family")),
            }
        }

        /// Create a blocking socket that is not inherited by child processes
        pub fn socket(domain: Domain, ty: Type, _proto: Protocol) -> io::Result<OsSocket> {
            ensure_wsa();
            let d = match domain { Domain::Ipv4 => AF_INET, Domain::Ipv6 => AF_INET6 } as i32;
            let t = match ty { Type::Stream => SOCK_STREAM, Type::Dgram => SOCK_DGRAM } as i32;
            let s = unsafe { WSASocketW(d, t, 0, std::ptr::null_mut(), 0, WSA_FLAG_OVERLAPPED | WSA_FLAG_NO_HANDLE_INHERIT) };
            if s == INVALID_SOCKET { return Err(last_error()); }
            Ok(s as _)
        }

        /// Bind socket to a local address
        pub fn bind_raw(os: OsSocket, addr: SocketAddr) -> io::Result<()> {
            let (_, sa, len) = to_sockaddr(addr);
            cvt(unsafe { bind(os as usize, sa.as_ptr(), len) })
        }

        /// Blocking connect to a remote address
        pub fn connect_raw(os: OsSocket, addr: SocketAddr) -> io::Result<()> {
            let (_, sa, len) = to_sockaddr(addr);
            cvt(unsafe { connect(os as usize, sa.as_ptr(), len) })
        }

        /// Mark the socket passive
        pub fn listen_raw(os: OsSocket, backlog: i32) -> io::Result<()> { cvt(unsafe { listen(os as usize, backlog) }) }

        /// Accept one pending connection
        pub fn accept_raw(os: OsSocket) -> io::Result<OsSocket> {
            let s = unsafe { accept(os as usize, std::ptr::null_mut(), std::ptr::null_mut()) };
            if s == INVALID_SOCKET { Err(last_error()) } else { Ok(s as _) }
        }

        /// Address the socket is bound to
        pub fn local_addr(os: OsSocket) -> io::Result<SocketAddr> {
            let mut ss: SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
            let mut len = std::mem::size_of::<SOCKADDR_STORAGE>() as i32;
            cvt(unsafe { getsockname(os as usize, &mut ss as *mut _ as *mut SOCKADDR, &mut len) })?;
            from_storage(&ss)
        }

        /// One `send` call
        pub fn send_raw(os: OsSocket, buf: &[u8]) -> io::Result<usize> {
            let len = buf.len().min(i32::MAX as usize) as i32;
            let rc = unsafe { send(os as usize, buf.as_ptr(), len, 0) };
            if rc == SOCKET_ERROR { Err(last_error()) } else { Ok(rc as usize) }
        }

        /// One `recv` call
        pub fn recv_raw(os: OsSocket, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(i32::MAX as usize) as i32;
            let rc = unsafe { recv(os as usize, buf.as_mut_ptr(), len, 0) };
            if rc == SOCKET_ERROR { Err(last_error()) } else { Ok(rc as usize) }
        }

        /// Release the socket
        pub fn close_raw(os: OsSocket) -> io::Result<()> { cvt(unsafe { closesocket(os as usize) }) }

        /// Full-duplex shutdown
        pub fn shutdown_raw(os: OsSocket) -> io::Result<()> { cvt(unsafe { shutdown(os as usize, SD_BOTH as _) }) }

        /// Wait once for read readiness. `None` waits forever.
        ///
        /// WinSock's `WSAPoll` misreports some conditions, so this uses
        /// `select` on a single socket. Any exception-set hit is an error.
        pub fn poll_read_raw(os: OsSocket, timeout: Option<Duration>) -> io::Result<bool> {
            let mut readfds: FD_SET = unsafe { std::mem::zeroed() };
            readfds.fd_count = 1;
            readfds.fd_array[0] = os as usize;
            let mut exceptfds: FD_SET = unsafe { std::mem::zeroed() };
            exceptfds.fd_count = 1;
            exceptfds.fd_array[0] = os as usize;
            let tv = timeout.map(|d| TIMEVAL {
                tv_sec: d.as_secs().min(i32::MAX as u64) as i32,
                tv_usec: d.subsec_micros() as i32,
            });
            let tv_ptr = tv.as_ref().map_or(std::ptr::null(), |t| t as *const TIMEVAL);
            let rc = unsafe { select(0, &mut readfds, std::ptr::null_mut(), &mut exceptfds, tv_ptr) };
            if rc == SOCKET_ERROR { return Err(last_error()); }
            if exceptfds.fd_count > 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "exceptional condition on socket"));
            }
            Ok(readfds.fd_count > 0)
        }

        /// Wait once for a socket to turn writable or fail. `None` waits
        /// forever. Failure conditions count as ready; read them with
        /// [`take_error`].
        pub fn poll_write_raw(os: OsSocket, timeout: Option<Duration>) -> io::Result<bool> {
            let mut writefds: FD_SET = unsafe { std::mem::zeroed() };
            writefds.fd_count = 1;
            writefds.fd_array[0] = os as usize;
            let mut exceptfds: FD_SET = unsafe { std::mem::zeroed() };
            exceptfds.fd_count = 1;
            exceptfds.fd_array[0] = os as usize;
            let tv = timeout.map(|d| TIMEVAL {
                tv_sec: d.as_secs().min(i32::MAX as u64) as i32,
                tv_usec: d.subsec_micros() as i32,
            });
            let tv_ptr = tv.as_ref().map_or(std::ptr::null(), |t| t as *const TIMEVAL);
            let rc = unsafe { select(0, std::ptr::null_mut(), &mut writefds, &mut exceptfds, tv_ptr) };
            if rc == SOCKET_ERROR { return Err(last_error()); }
            Ok(rc > 0)
        }

        /// Pending error (SO_ERROR), cleared by reading it
        pub fn take_error(os: OsSocket) -> io::Result<Option<io::Error>> {
            let code = getsockopt_int(os, SOL_SOCKET as _, SO_ERROR as _)?;
            Ok((code != 0).then(|| io::Error::from_raw_os_error(code)))
        }

        fn setsockopt_int(socket: OsSocket, level: i32, opt: i32, val: i32) -> io::Result<()> {
            cvt(unsafe { setsockopt(socket as usize, level, opt, &val as *const _ as _, std::mem::size_of::<i32>() as _) })
        }

        fn getsockopt_int(socket: OsSocket, level: i32, opt: i32) -> io::Result<i32> {
            let mut v: i32 = 0;
            let mut len = std::mem::size_of::<i32>() as i32;
            cvt(unsafe { getsockopt(socket as usize, level, opt, &mut v as *mut _ as _, &mut len) })?;
            Ok(v)
        }

        /// Allow rebinding an address in TIME_WAIT
        pub fn set_reuse_addr(os: OsSocket, on: bool) -> io::Result<()> { setsockopt_int(os, SOL_SOCKET as _, SO_REUSEADDR as _, on as i32) }
        /// Enable port reuse (not a separate option on Windows)
        pub fn set_reuse_port(_os: OsSocket, _on: bool) -> io::Result<()> { Err(unsupported("SO_REUSEPORT")) }
        /// Disable TCP Nagle algorithm
        pub fn set_tcp_nodelay(os: OsSocket, on: bool) -> io::Result<()> { setsockopt_int(os, IPPROTO_TCP as _, TCP_NODELAY as _, on as i32) }
        /// Toggle SO_KEEPALIVE
        pub fn set_keepalive(os: OsSocket, on: bool) -> io::Result<()> { setsockopt_int(os, SOL_SOCKET as _, SO_KEEPALIVE as _, on as i32) }
        /// Idle seconds before the first keepalive probe
        pub fn set_keep_idle(os: OsSocket, secs: i32) -> io::Result<()> { setsockopt_int(os, IPPROTO_TCP as _, TCP_KEEPIDLE_OPT, secs) }
        /// Seconds between keepalive probes
        pub fn set_keep_interval(os: OsSocket, secs: i32) -> io::Result<()> { setsockopt_int(os, IPPROTO_TCP as _, TCP_KEEPINTVL_OPT, secs) }
        /// Unanswered probes before the connection is dropped
        pub fn set_keep_count(os: OsSocket, n: i32) -> io::Result<()> { setsockopt_int(os, IPPROTO_TCP as _, TCP_KEEPCNT_OPT, n) }
        /// TCP_USER_TIMEOUT (not applicable on Windows)
        pub fn set_user_timeout(_os: OsSocket, _ms: i32) -> io::Result<()> { Ok(()) /* not applicable */ }
        /// No corking primitive; callers fall back to emulation
        pub fn set_tcp_cork(_os: OsSocket, _on: bool) -> io::Result<Option<()>> { Ok(None) }

        pub fn tcp_nodelay(os: OsSocket) -> io::Result<bool> { Ok(getsockopt_int(os, IPPROTO_TCP as _, TCP_NODELAY as _)? != 0) }
        pub fn keepalive(os: OsSocket) -> io::Result<bool> { Ok(getsockopt_int(os, SOL_SOCKET as _, SO_KEEPALIVE as _)? != 0) }
        pub fn keep_idle(os: OsSocket) -> io::Result<i32> { getsockopt_int(os, IPPROTO_TCP as _, TCP_KEEPIDLE_OPT) }
        pub fn keep_interval(os: OsSocket) -> io::Result<i32> { getsockopt_int(os, IPPROTO_TCP as _, TCP_KEEPINTVL_OPT) }
        pub fn keep_count(os: OsSocket) -> io::Result<i32> { getsockopt_int(os, IPPROTO_TCP as _, TCP_KEEPCNT_OPT) }
        pub fn user_timeout(_os: OsSocket) -> io::Result<Option<i32>> { Ok(None) }

        /// There is no SIGPIPE on Windows
        pub fn ignore_broken_pipe() -> io::Result<()> { Ok(()) }

        /// This machine's host name
        pub fn hostname() -> io::Result<String> {
            ensure_wsa();
            let mut buf = [0u8; 256];
            cvt(unsafe { gethostname(buf.as_mut_ptr(), buf.len() as i32) })?;
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            String::from_utf8(buf[..end].to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        }
    }
}
