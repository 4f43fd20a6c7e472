//! Interrupt-safe blocking I/O
//!
//! Every loop here re-issues a system call that failed with
//! [`io::ErrorKind::Interrupted`] without losing the bytes already moved;
//! callers never see an interruption.
//!
//! Two ways a read can come back short are kept distinct:
//!
//! - **deadline expiry**: [`read_with_deadline`] returns `Ok(n)` with `n`
//!   smaller than requested (possibly `0`);
//! - **peer closed mid-message**: the peer shut the stream before the
//!   request was satisfied; this is `Err` with
//!   [`io::ErrorKind::UnexpectedEof`] even if some bytes already landed in
//!   the buffer.
//!
//! There is no way to cancel a blocked [`write_all`] or [`read_all`] from
//! another thread. Use [`read_with_deadline`] when a read must be bounded.
//!
//! # Examples
//!
//! ```rust,no_run
//! use core_sockets::{connect_tcp, io};
//! use std::time::Duration;
//!
//! let sock = connect_tcp("127.0.0.1", 9000, None, None)?;
//! io::write_all(&sock, b"ping")?;
//!
//! let mut reply = [0u8; 4];
//! let n = io::read_with_deadline(&sock, &mut reply, Some(Duration::from_millis(250)))?;
//! if n < reply.len() {
//!     println!("only {n} bytes before the deadline");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::raw as r;
use crate::socket::Socket;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn peer_closed(sofar: usize, wanted: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("peer closed the connection after {sofar} of {wanted} bytes"),
    )
}

/// Sends all of `buf`.
///
/// Returns `Ok(buf.len())` once everything is sent, `Ok(0)` if the OS
/// reports that nothing more can be sent (peer closed during the write),
/// and `Err` on any other failure. An empty `buf` returns `Ok(0)` without a
/// system call.
pub fn write_all(sock: &Socket, buf: &[u8]) -> io::Result<usize> {
    let os = sock.raw()?;
    let mut sofar = 0;
    while sofar < buf.len() {
        match r::send_raw(os, &buf[sofar..]) {
            Ok(0) => return Ok(0),
            Ok(n) => sofar += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(sofar)
}

/// Fills all of `buf`.
///
/// - An empty `buf` returns `Ok(0)` immediately; some platforms block
///   forever on a zero-length `recv`.
/// - End of stream before any byte arrived is a clean `Ok(0)`.
/// - End of stream after some bytes arrived is `Err(UnexpectedEof)`.
///
/// On a datagram socket each `recv` consumes one datagram, so `buf` should
/// be sized to the datagrams the peer sends.
pub fn read_all(sock: &Socket, buf: &mut [u8]) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let os = sock.raw()?;
    let mut sofar = 0;
    while sofar < buf.len() {
        match r::recv_raw(os, &mut buf[sofar..]) {
            Ok(0) if sofar == 0 => return Ok(0),
            Ok(0) => return Err(peer_closed(sofar, buf.len())),
            Ok(n) => sofar += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(sofar)
}

/// Waits until `sock` is readable or `timeout` passes.
///
/// `None` waits forever and `Some(Duration::ZERO)` checks once without
/// blocking. A listening socket is readable when a connection is pending.
/// An interrupted wait is re-issued with the time left, measured from the
/// clock rather than estimated. Any exceptional condition on the socket
/// (error, hang-up, invalid handle) is returned as `Err`.
pub fn poll_readable(sock: &Socket, timeout: Option<Duration>) -> io::Result<bool> {
    let os = sock.raw()?;
    // A timeout past the end of the clock waits forever.
    let stop = timeout.and_then(|t| Instant::now().checked_add(t));
    let mut budget = stop.and(timeout);
    loop {
        match r::poll_read_raw(os, budget) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                if let Some(stop) = stop {
                    let now = Instant::now();
                    if now >= stop {
                        return Ok(false);
                    }
                    budget = Some(stop - now);
                }
            }
            other => return other,
        }
    }
}

/// How long a deadline read may keep waiting
#[derive(Copy, Clone, Debug)]
enum Limit {
    Forever,
    QueuedOnly,
    Until(Instant),
}

impl Limit {
    fn from_deadline(deadline: Option<Duration>) -> Self {
        match deadline {
            None => Limit::Forever,
            Some(d) if d.is_zero() => Limit::QueuedOnly,
            Some(d) => Instant::now().checked_add(d).map_or(Limit::Forever, Limit::Until),
        }
    }

    fn budget(self) -> Option<Duration> {
        match self {
            Limit::Forever => None,
            Limit::QueuedOnly => Some(Duration::ZERO),
            Limit::Until(stop) => Some(stop.saturating_duration_since(Instant::now())),
        }
    }
}

/// Accepts one connection, re-issuing `accept` when a signal interrupts it.
pub(crate) fn accept(listener: &Socket) -> io::Result<Socket> {
    let os = listener.raw()?;
    loop {
        match r::accept_raw(os) {
            Ok(conn) => return Ok(Socket::from_os(conn)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Blocking connect that survives a signal.
///
/// An interrupted `connect` keeps going in the kernel and must not be
/// issued again; the outcome is collected by waiting for the socket to turn
/// writable and reading its pending error.
pub(crate) fn connect(sock: &Socket, addr: SocketAddr) -> io::Result<()> {
    let os = sock.raw()?;
    match r::connect_raw(os, addr) {
        Err(e) if e.kind() == io::ErrorKind::Interrupted => finish_connect(os),
        other => other,
    }
}

fn finish_connect(os: r::OsSocket) -> io::Result<()> {
    loop {
        match r::poll_write_raw(os, None) {
            Ok(true) => break,
            Ok(false) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    match r::take_error(os)? {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Reads up to `buf.len()` bytes, giving up when `deadline` expires.
///
/// `None` blocks until the buffer is full; `Some(Duration::ZERO)` takes
/// only what is already queued.
///
/// Returns the number of bytes read, which is smaller than `buf.len()` when
/// the deadline expired first (this is not an error). If the socket turns
/// readable but `recv` yields nothing, the peer has closed and the call
/// fails with `UnexpectedEof`, discarding the partial count: a half-received
/// message is a failure, not a short read. An exceptional readiness
/// condition is always an error.
pub fn read_with_deadline(sock: &Socket, buf: &mut [u8], deadline: Option<Duration>) -> io::Result<usize> {
    let os = sock.raw()?;
    if buf.is_empty() {
        return Ok(0);
    }
    let limit = Limit::from_deadline(deadline);

    let mut sofar = 0;
    while sofar < buf.len() {
        let budget = limit.budget();

        if !poll_readable(sock, budget)? {
            match budget {
                Some(left) if left.is_zero() => return Ok(sofar),
                // Woke early with nothing to read; recompute the budget.
                _ => continue,
            }
        }

        match r::recv_raw(os, &mut buf[sofar..]) {
            Ok(0) => return Err(peer_closed(sofar, buf.len())),
            Ok(n) => sofar += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(sofar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::tests::loopback_pair;
    use std::thread;

    fn pattern(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 128) as u8).collect()
    }

    #[test]
    fn test_chunked_write_then_read_preserves_bytes() -> anyhow::Result<()> {
        for (total, chunk) in [(1, 1), (1000, 7), (4096, 4096), (10_000, 333)] {
            let (client, server) = loopback_pair()?;
            let sent = pattern(total);
            let writer = {
                let sent = sent.clone();
                thread::spawn(move || -> io::Result<()> {
                    for piece in sent.chunks(chunk) {
                        assert_eq!(write_all(&server, piece)?, piece.len());
                    }
                    Ok(())
                })
            };
            let mut got = vec![0u8; total];
            for piece in got.chunks_mut(chunk) {
                let len = piece.len();
                assert_eq!(read_all(&client, piece)?, len);
            }
            writer.join().unwrap()?;
            assert_eq!(got, sent);
        }
        Ok(())
    }

    #[test]
    fn test_zero_length_requests() -> anyhow::Result<()> {
        let (client, server) = loopback_pair()?;
        assert_eq!(read_all(&client, &mut [])?, 0);
        assert_eq!(write_all(&server, &[])?, 0);
        assert_eq!(read_with_deadline(&client, &mut [], None)?, 0);
        Ok(())
    }

    #[test]
    fn test_read_all_clean_eof_vs_mid_message() -> anyhow::Result<()> {
        let (client, mut server) = loopback_pair()?;
        server.close()?;
        let mut buf = [0u8; 8];
        assert_eq!(read_all(&client, &mut buf)?, 0);

        let (client, mut server) = loopback_pair()?;
        write_all(&server, b"abc")?;
        server.close()?;
        let err = read_all(&client, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(&buf[..3], b"abc");
        Ok(())
    }

    #[test]
    fn test_bad_handle_io_fails() {
        let bad = Socket::bad();
        let mut buf = [0u8; 4];
        assert_eq!(write_all(&bad, b"x").unwrap_err().kind(), io::ErrorKind::InvalidInput);
        assert_eq!(read_all(&bad, &mut buf).unwrap_err().kind(), io::ErrorKind::InvalidInput);
        assert!(read_with_deadline(&bad, &mut buf, Some(Duration::ZERO)).is_err());
        assert!(poll_readable(&bad, Some(Duration::ZERO)).is_err());
    }

    #[test]
    fn test_deadline_read_returns_nothing_without_error() -> anyhow::Result<()> {
        let (client, _server) = loopback_pair()?;
        let mut buf = [0u8; 16];
        let start = Instant::now();
        assert_eq!(read_with_deadline(&client, &mut buf, Some(Duration::from_millis(100)))?, 0);
        assert!(start.elapsed() >= Duration::from_millis(90));
        Ok(())
    }

    #[test]
    fn test_zero_deadline_does_not_block() -> anyhow::Result<()> {
        let (client, server) = loopback_pair()?;
        let mut buf = [0u8; 16];
        assert_eq!(read_with_deadline(&client, &mut buf, Some(Duration::ZERO))?, 0);

        write_all(&server, b"hello")?;
        assert!(poll_readable(&client, Some(Duration::from_secs(5)))?);
        assert_eq!(read_with_deadline(&client, &mut buf, Some(Duration::ZERO))?, 5);
        assert_eq!(&buf[..5], b"hello");
        Ok(())
    }

    #[test]
    fn test_deadline_read_returns_partial_count() -> anyhow::Result<()> {
        let (client, server) = loopback_pair()?;
        write_all(&server, &pattern(10))?;
        let mut buf = [0u8; 100];
        let n = read_with_deadline(&client, &mut buf, Some(Duration::from_millis(200)))?;
        assert_eq!(n, 10);
        assert_eq!(&buf[..10], &pattern(10)[..]);
        Ok(())
    }

    #[test]
    fn test_deadline_read_collects_late_bytes() -> anyhow::Result<()> {
        let (client, server) = loopback_pair()?;
        let writer = thread::spawn(move || -> io::Result<Socket> {
            write_all(&server, b"first")?;
            thread::sleep(Duration::from_millis(50));
            write_all(&server, b"second")?;
            Ok(server)
        });
        let mut buf = [0u8; 11];
        let n = read_with_deadline(&client, &mut buf, Some(Duration::from_secs(5)))?;
        let _server = writer.join().unwrap()?;
        assert_eq!(n, 11);
        assert_eq!(&buf, b"firstsecond");
        Ok(())
    }

    #[test]
    fn test_deadline_read_peer_closed_mid_message_is_error() -> anyhow::Result<()> {
        let (client, mut server) = loopback_pair()?;
        write_all(&server, b"part")?;
        server.close()?;
        let mut buf = [0u8; 64];
        let err = read_with_deadline(&client, &mut buf, Some(Duration::from_secs(5))).unwrap_err();
        #[cfg(target_os = "linux")]
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof, "{err}");
        #[cfg(not(target_os = "linux"))]
        assert!(matches!(err.kind(), io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionAborted), "{err}");
        Ok(())
    }

    #[test]
    fn test_blocking_deadline_read_fills_buffer() -> anyhow::Result<()> {
        let (client, server) = loopback_pair()?;
        let writer = thread::spawn(move || -> io::Result<Socket> {
            for piece in pattern(3000).chunks(1000) {
                write_all(&server, piece)?;
                thread::sleep(Duration::from_millis(5));
            }
            Ok(server)
        });
        let mut buf = vec![0u8; 3000];
        assert_eq!(read_with_deadline(&client, &mut buf, None)?, 3000);
        let _server = writer.join().unwrap()?;
        assert_eq!(buf, pattern(3000));
        Ok(())
    }

    #[test]
    fn test_unbounded_deadline_reads_queued_bytes() -> anyhow::Result<()> {
        let (client, server) = loopback_pair()?;
        write_all(&server, b"abcd")?;
        let mut buf = [0u8; 4];
        assert_eq!(read_with_deadline(&client, &mut buf, Some(Duration::MAX))?, 4);
        assert_eq!(&buf, b"abcd");

        write_all(&server, b"efgh")?;
        assert!(poll_readable(&client, Some(Duration::from_secs(u64::MAX)))?);
        Ok(())
    }

    #[test]
    fn test_limit_past_end_of_clock_is_forever() {
        assert!(matches!(Limit::from_deadline(Some(Duration::MAX)), Limit::Forever));
        assert!(matches!(Limit::from_deadline(None), Limit::Forever));
        assert!(matches!(Limit::from_deadline(Some(Duration::ZERO)), Limit::QueuedOnly));
        assert!(matches!(Limit::from_deadline(Some(Duration::from_secs(1))), Limit::Until(_)));
        assert_eq!(Limit::QueuedOnly.budget(), Some(Duration::ZERO));
    }

    #[test]
    fn test_accept_and_connect_helpers() -> anyhow::Result<()> {
        let (listener, port) = crate::tcp::listen(0, Some("127.0.0.1"), 1, false, None)?;
        let (client, _) = crate::socket::open_socket(crate::Type::Stream, 0, Some("127.0.0.1"), false)?;
        connect(&client, SocketAddr::from(([127, 0, 0, 1], port)))?;
        let server = accept(&listener)?;
        write_all(&client, b"ok")?;
        let mut buf = [0u8; 2];
        assert_eq!(read_all(&server, &mut buf)?, 2);
        assert_eq!(&buf, b"ok");
        Ok(())
    }

    #[cfg(unix)]
    mod interrupts {
        use super::super::*;
        use crate::tcp::tests::loopback_pair;
        use std::sync::mpsc;
        use std::sync::Once;
        use std::thread;

        struct Tid(libc::pthread_t);
        // pthread_t is a plain id on some targets and a pointer on others.
        unsafe impl Send for Tid {}

        extern "C" fn on_signal(_: libc::c_int) {}

        /// SIGUSR1 handler without SA_RESTART, so blocked calls fail with EINTR.
        fn install_handler() {
            static INSTALL: Once = Once::new();
            INSTALL.call_once(|| unsafe {
                let mut sa: libc::sigaction = std::mem::zeroed();
                sa.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
                sa.sa_flags = 0;
                libc::sigemptyset(&mut sa.sa_mask);
                assert_eq!(libc::sigaction(libc::SIGUSR1, &sa, std::ptr::null_mut()), 0);
            });
        }

        /// Runs `f` on a thread, signals it while it blocks, then releases it
        /// with `release`.
        fn interrupted<T: Send + 'static>(
            f: impl FnOnce() -> io::Result<T> + Send + 'static,
            release: impl FnOnce() -> anyhow::Result<()>,
        ) -> anyhow::Result<T> {
            install_handler();
            let (tx, rx) = mpsc::channel();
            let worker = thread::spawn(move || {
                tx.send(Tid(unsafe { libc::pthread_self() })).unwrap();
                f()
            });
            let tid = rx.recv()?;
            for _ in 0..5 {
                thread::sleep(Duration::from_millis(20));
                assert_eq!(unsafe { libc::pthread_kill(tid.0, libc::SIGUSR1) }, 0);
            }
            release()?;
            Ok(worker.join().unwrap()?)
        }

        #[test]
        fn test_read_all_survives_signals() -> anyhow::Result<()> {
            let (client, server) = loopback_pair()?;
            let got = interrupted(
                move || {
                    let mut buf = [0u8; 64];
                    read_all(&client, &mut buf).map(|n| (n, buf))
                },
                || Ok(write_all(&server, &[7u8; 64]).map(drop)?),
            )?;
            assert_eq!(got.0, 64);
            assert_eq!(got.1, [7u8; 64]);
            Ok(())
        }

        #[test]
        fn test_deadline_read_survives_signals() -> anyhow::Result<()> {
            let (client, server) = loopback_pair()?;
            let got = interrupted(
                move || {
                    let mut buf = [0u8; 32];
                    read_with_deadline(&client, &mut buf, Some(Duration::from_secs(10))).map(|n| (n, buf))
                },
                || Ok(write_all(&server, &[3u8; 32]).map(drop)?),
            )?;
            assert_eq!(got.0, 32);
            assert_eq!(got.1, [3u8; 32]);
            Ok(())
        }

        #[test]
        fn test_poll_survives_signals() -> anyhow::Result<()> {
            let (client, server) = loopback_pair()?;
            let ready = interrupted(
                move || poll_readable(&client, None),
                || Ok(write_all(&server, b"x").map(drop)?),
            )?;
            assert!(ready);
            Ok(())
        }

        #[test]
        fn test_accept_survives_signals() -> anyhow::Result<()> {
            let (listener, port) = crate::tcp::listen(0, Some("127.0.0.1"), 1, false, None)?;
            let mut client = None;
            let conn = interrupted(
                move || accept(&listener),
                || {
                    client = Some(crate::tcp::connect_tcp("127.0.0.1", port, None, None)?);
                    Ok(())
                },
            )?;
            assert!(!conn.is_bad());
            assert!(client.is_some());
            Ok(())
        }

        #[test]
        fn test_interrupted_connect_completion() -> anyhow::Result<()> {
            let (listener, port) = crate::tcp::listen(0, Some("127.0.0.1"), 1, false, None)?;
            let (refused_on, closed_port) = crate::tcp::open_tcp_socket(0, Some("127.0.0.1"), false)?;
            drop(refused_on);

            for (target_port, expect_ok) in [(port, true), (closed_port, false)] {
                let (sock, _) = crate::socket::open_socket(crate::Type::Stream, 0, Some("127.0.0.1"), false)?;
                let os = sock.raw()?;
                // Non-blocking connect leaves the handshake in flight, the same
                // state an interrupted blocking connect is in.
                unsafe {
                    let flags = libc::fcntl(os, libc::F_GETFL);
                    assert_eq!(libc::fcntl(os, libc::F_SETFL, flags | libc::O_NONBLOCK), 0);
                }
                let res = match r::connect_raw(os, SocketAddr::from(([127, 0, 0, 1], target_port))) {
                    Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => finish_connect(os),
                    other => other,
                };
                if expect_ok {
                    res?;
                } else {
                    assert_eq!(res.unwrap_err().kind(), io::ErrorKind::ConnectionRefused);
                }
            }
            drop(listener);
            Ok(())
        }
    }
}
