//! TCP tuning options
//!
//! [`TcpOptions`] is a value-typed bundle of optional knobs applied to a
//! stream socket by [`apply_tcp_options`]. Absent (`None`) or negative
//! values leave the OS default in place.
//!
//! Application is best-effort per option: every option is attempted, each
//! failure is logged, and the call reports all of them at the end. Options
//! applied before a failure are not rolled back.
//!
//! # Keepalive
//! - `keep_alive`: SO_KEEPALIVE
//! - `keep_idle_secs`: idle time before the first probe (TCP_KEEPIDLE,
//!   TCP_KEEPALIVE on macOS)
//! - `keep_interval_secs`: time between probes (TCP_KEEPINTVL)
//! - `keep_count`: unanswered probes before the peer is declared dead
//!   (TCP_KEEPCNT)
//!
//! # Delivery
//! - `user_timeout_ms`: TCP_USER_TIMEOUT (Linux only, ignored elsewhere)
//! - `no_delay`: TCP_NODELAY
//! - `ignore_broken_pipe`: ignore SIGPIPE process-wide (no-op on Windows)
//!
//! # Examples
//!
//! ```rust,no_run
//! use core_sockets::{connect_tcp, TcpOptions};
//!
//! let opts = TcpOptions::keepalive(5, 2, 3);
//! let sock = connect_tcp("127.0.0.1", 9000, None, Some(&opts))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{Result, SocketError};
use crate::raw as r;
use crate::socket::Socket;
use std::io;

/// Tuning knobs for a TCP socket
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpOptions {
/// Enable SO_KEEPALIVE
///
/// **Default**: `true`
pub keep_alive: bool,

/// Seconds of idle time before the first keepalive probe
///
/// **Default**: `None` (system default, often two hours)
pub keep_idle_secs: Option<i32>,

/// Seconds between keepalive probes
///
/// **Default**: `None`
pub keep_interval_secs: Option<i32>,

/// Unanswered keepalive probes before the connection is dropped
///
/// **Default**: `None`
pub keep_count: Option<i32>,

/// Milliseconds transmitted data may remain unacknowledged before the
/// connection is dropped. Linux/Android only.
///
/// **Default**: `None`
pub user_timeout_ms: Option<i32>,

/// Disable Nagle's algorithm
///
/// **Default**: `true`
pub no_delay: bool,

/// Ignore SIGPIPE so a write to a closed peer fails with `EPIPE` instead of
/// killing the process. Affects the whole process.
///
/// **Default**: `false`
pub ignore_broken_pipe: bool,
}

impl Default for TcpOptions {
    /// Keepalive on with OS timers, Nagle disabled, SIGPIPE untouched.
    fn default() -> Self {
        Self {
            keep_alive: true,
            keep_idle_secs: None,
            keep_interval_secs: None,
            keep_count: None,
            user_timeout_ms: None,
            no_delay: true,
            ignore_broken_pipe: false,
        }
    }
}

impl TcpOptions {
    /// Keepalive with explicit timers: probe after `idle` seconds of
    /// silence, every `interval` seconds, `count` times.
    pub fn keepalive(idle: i32, interval: i32, count: i32) -> Self {
        Self {
            keep_idle_secs: Some(idle),
            keep_interval_secs: Some(interval),
            keep_count: Some(count),
            ..Self::default()
        }
    }

    /// Leave every OS default alone
    pub fn none() -> Self {
        Self { keep_alive: false, no_delay: false, ..Self::default() }
    }

    /// Reads the current settings back from the OS.
    ///
    /// Fields the platform cannot report come back as `None`.
    /// `ignore_broken_pipe` is process state, not socket state, and is
    /// always `false` here.
    pub fn query(sock: &Socket) -> io::Result<Self> {
        let os = sock.raw()?;
        Ok(Self {
            keep_alive: r::keepalive(os)?,
            keep_idle_secs: r::keep_idle(os).ok(),
            keep_interval_secs: r::keep_interval(os).ok(),
            keep_count: r::keep_count(os).ok(),
            user_timeout_ms: r::user_timeout(os)?,
            no_delay: r::tcp_nodelay(os)?,
            ignore_broken_pipe: false,
        })
    }
}

fn configured(v: Option<i32>) -> Option<i32> {
    v.filter(|v| *v >= 0)
}

/// Applies `opts` to a stream socket.
///
/// Every option is attempted even after one fails. On failure the error
/// lists the name of each option the OS rejected.
pub fn apply_tcp_options(sock: &Socket, opts: &TcpOptions) -> Result<()> {
    let os = sock.checked()?;
    let mut failed: Vec<&'static str> = Vec::new();
    let mut attempt = |name: &'static str, res: io::Result<()>| {
        if let Err(e) = res {
            log::warn!("apply_tcp_options: setsockopt({name}) failed: {e}");
            failed.push(name);
        }
    };

    if let Some(n) = configured(opts.keep_count) { attempt("TCP_KEEPCNT", r::set_keep_count(os, n)); }
    if let Some(s) = configured(opts.keep_idle_secs) { attempt("TCP_KEEPIDLE", r::set_keep_idle(os, s)); }
    if let Some(s) = configured(opts.keep_interval_secs) { attempt("TCP_KEEPINTVL", r::set_keep_interval(os, s)); }
    if let Some(ms) = configured(opts.user_timeout_ms) { attempt("TCP_USER_TIMEOUT", r::set_user_timeout(os, ms)); }
    if opts.keep_alive { attempt("SO_KEEPALIVE", r::set_keepalive(os, true)); }
    if opts.no_delay { attempt("TCP_NODELAY", r::set_tcp_nodelay(os, true)); }
    if opts.ignore_broken_pipe { attempt("SIGPIPE", r::ignore_broken_pipe()); }

    if failed.is_empty() { Ok(()) } else { Err(SocketError::Options(failed)) }
}

/// Holds back partial segments so several small writes leave as one.
///
/// Uses TCP_CORK where the platform has it. Elsewhere corking is emulated
/// by re-enabling Nagle's algorithm, which only delays small segments
/// while data is unacknowledged; it is not a true hold.
pub fn cork(sock: &Socket) -> Result<()> {
    let os = sock.checked().map_err(|e| {
        log::warn!("cork: bad socket");
        e
    })?;
    let res = match r::set_tcp_cork(os, true) {
        Ok(Some(())) => Ok(()),
        Ok(None) => r::set_tcp_nodelay(os, false),
        Err(e) => Err(e),
    };
    res.map_err(|e| {
        log::warn!("cork: setsockopt failed: {e}");
        SocketError::Io(e)
    })
}

/// Releases a [`cork`] and pushes out anything it held.
///
/// Without TCP_CORK this disables Nagle again and sends a zero-length
/// packet as a nudge. That flush is best-effort: the stack may still hold
/// data briefly.
pub fn uncork(sock: &Socket) -> Result<()> {
    let os = sock.checked().map_err(|e| {
        log::warn!("uncork: bad socket");
        e
    })?;
    let res = match r::set_tcp_cork(os, false) {
        Ok(Some(())) => Ok(()),
        Ok(None) => r::set_tcp_nodelay(os, true).map(|()| {
            // Result ignored; the zero-length send is only a nudge.
            let _ = r::send_raw(os, &[]);
        }),
        Err(e) => Err(e),
    };
    res.map_err(|e| {
        log::warn!("uncork: setsockopt failed: {e}");
        SocketError::Io(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{read_all, write_all};
    use crate::socket::open_socket;
    use crate::tcp::tests::loopback_pair;
    use crate::Type;

    #[test]
    fn test_default_options() {
        let opts = TcpOptions::default();
        assert!(opts.keep_alive);
        assert!(opts.no_delay);
        assert_eq!(opts.keep_idle_secs, None);
        assert!(!opts.ignore_broken_pipe);
    }

    #[test]
    fn test_keepalive_preset() {
        let opts = TcpOptions::keepalive(5, 2, 3);
        assert_eq!(opts.keep_idle_secs, Some(5));
        assert_eq!(opts.keep_interval_secs, Some(2));
        assert_eq!(opts.keep_count, Some(3));
        assert!(opts.keep_alive);
    }

    #[test]
    fn test_apply_default_to_fresh_socket() -> anyhow::Result<()> {
        let (s, _) = open_socket(Type::Stream, 0, None, false)?;
        apply_tcp_options(&s, &TcpOptions::default())?;
        let got = TcpOptions::query(&s)?;
        assert!(got.keep_alive);
        assert!(got.no_delay);
        Ok(())
    }

    #[test]
    fn test_keepalive_timers_read_back() -> anyhow::Result<()> {
        let (s, _) = open_socket(Type::Stream, 0, None, false)?;
        apply_tcp_options(&s, &TcpOptions::keepalive(5, 2, 3))?;
        let got = TcpOptions::query(&s)?;
        assert!(got.keep_alive);
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
        {
            assert_eq!(got.keep_idle_secs, Some(5));
            assert_eq!(got.keep_interval_secs, Some(2));
            assert_eq!(got.keep_count, Some(3));
        }
        Ok(())
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_user_timeout_read_back() -> anyhow::Result<()> {
        let (s, _) = open_socket(Type::Stream, 0, None, false)?;
        let opts = TcpOptions { user_timeout_ms: Some(1500), ..TcpOptions::default() };
        apply_tcp_options(&s, &opts)?;
        assert_eq!(TcpOptions::query(&s)?.user_timeout_ms, Some(1500));
        Ok(())
    }

    #[test]
    fn test_negative_values_are_skipped() -> anyhow::Result<()> {
        let (s, _) = open_socket(Type::Stream, 0, None, false)?;
        let opts = TcpOptions { keep_count: Some(-1), keep_idle_secs: Some(-5), ..TcpOptions::none() };
        apply_tcp_options(&s, &opts)?;
        Ok(())
    }

    #[test]
    fn test_failures_are_collected() -> anyhow::Result<()> {
        // Keepalive timers are rejected on a datagram socket, but the
        // remaining options are still attempted.
        let (s, _) = open_socket(Type::Dgram, 0, None, false)?;
        let err = apply_tcp_options(&s, &TcpOptions::keepalive(5, 2, 3)).unwrap_err();
        match err {
            SocketError::Options(names) => {
                assert!(names.contains(&"TCP_KEEPCNT"));
                assert!(names.contains(&"TCP_NODELAY"));
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_bad_socket_rejected() {
        assert!(matches!(apply_tcp_options(&Socket::bad(), &TcpOptions::default()), Err(SocketError::BadHandle)));
        assert!(matches!(cork(&Socket::bad()), Err(SocketError::BadHandle)));
        assert!(matches!(uncork(&Socket::bad()), Err(SocketError::BadHandle)));
    }

    #[test]
    fn test_cork_then_uncork_delivers() -> anyhow::Result<()> {
        let (client, server) = loopback_pair()?;
        cork(&server)?;
        write_all(&server, b"one")?;
        write_all(&server, b"two")?;
        uncork(&server)?;
        let mut buf = [0u8; 6];
        assert_eq!(read_all(&client, &mut buf)?, 6);
        assert_eq!(&buf, b"onetwo");
        Ok(())
    }
}
