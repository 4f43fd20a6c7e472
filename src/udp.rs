//! UDP sockets
//!
//! [`open_udp_socket`] binds a datagram socket for receiving. [`connect_udp`]
//! opens one on an ephemeral port and fixes its default peer so the
//! stream-style [`io::write_all`](crate::io::write_all) and
//! [`io::read_all`](crate::io::read_all) work on it; each call then moves
//! one datagram per system call.
//!
//! # Examples
//!
//! ```rust,no_run
//! use core_sockets::{connect_udp, io, open_udp_socket};
//!
//! let (rx, port) = open_udp_socket(0, Some("127.0.0.1"), false)?;
//! let tx = connect_udp("127.0.0.1", port, None)?;
//! io::write_all(&tx, b"tick")?;
//!
//! let mut buf = [0u8; 4];
//! io::read_all(&rx, &mut buf)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{Result, SocketError};
use crate::io::connect;
use crate::raw::{self as r, Type};
use crate::socket::{connect_source, open_bound, open_socket, resolve_host, Socket};

/// Port used to pick a route in [`local_address_toward`]. Nothing is sent
/// to it.
const ROUTE_PORT: u16 = 3883;

/// Opens a UDP socket bound to `port` on `bind_addr`; see [`open_socket`].
pub fn open_udp_socket(port: u16, bind_addr: Option<&str>, reuse_addr: bool) -> Result<(Socket, u16)> {
    open_socket(Type::Dgram, port, bind_addr, reuse_addr)
}

/// Opens a UDP socket on an ephemeral port whose default peer is
/// `host:port`.
///
/// No packet is exchanged; a UDP connect only records the peer and picks a
/// route. Datagrams from other senders are filtered out by the OS.
pub fn connect_udp(host: &str, port: u16, bind_addr: Option<&str>) -> Result<Socket> {
    let target = resolve_host(host, port).map_err(|e| {
        log::warn!("connect_udp: error finding host by name ({host})");
        e
    })?;
    let (sock, _) = open_bound(Type::Dgram, connect_source(&target, bind_addr)?, false)?;
    connect(&sock, target).map_err(|source| {
        log::warn!("connect_udp: could not connect to {target}: {source}");
        SocketError::Connect { host: host.to_owned(), port, source }
    })?;
    Ok(sock)
}

/// Address of the local interface the OS would use to reach `remote_host`.
///
/// Connects a throwaway UDP socket toward the remote and reads back the
/// local end. When the remote cannot be resolved or routed to, the result
/// is `"0.0.0.0"` so a caller listening on it accepts every interface.
/// Only failing to create the routing socket is an error.
pub fn local_address_toward(remote_host: &str) -> Result<String> {
    const ANY: &str = "0.0.0.0";

    let target = match resolve_host(remote_host, ROUTE_PORT) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("local_address_toward: {e}; using {ANY}");
            return Ok(ANY.to_owned());
        }
    };
    let (route, _) = open_bound(Type::Dgram, connect_source(&target, None)?, false)?;
    let os = route.checked()?;

    match connect(&route, target).and_then(|()| r::local_addr(os)) {
        Ok(local) if !local.ip().is_unspecified() => Ok(local.ip().to_string()),
        Ok(_) => Ok(ANY.to_owned()),
        Err(e) => {
            log::warn!("local_address_toward: cannot route to {target}: {e}; using {ANY}");
            Ok(ANY.to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{read_all, read_with_deadline, write_all};
    use std::time::Duration;

    #[test]
    fn test_connected_udp_delivers_datagrams() -> anyhow::Result<()> {
        let (rx, port) = open_udp_socket(0, Some("127.0.0.1"), false)?;
        let tx = connect_udp("127.0.0.1", port, None)?;

        assert_eq!(write_all(&tx, b"one")?, 3);
        assert_eq!(write_all(&tx, b"two")?, 3);

        let mut buf = [0u8; 3];
        assert_eq!(read_all(&rx, &mut buf)?, 3);
        assert_eq!(&buf, b"one");
        assert_eq!(read_with_deadline(&rx, &mut buf, Some(Duration::from_secs(5)))?, 3);
        assert_eq!(&buf, b"two");
        Ok(())
    }

    #[test]
    fn test_connect_udp_with_bind_address() -> anyhow::Result<()> {
        let (_rx, port) = open_udp_socket(0, Some("127.0.0.1"), true)?;
        let tx = connect_udp("localhost", port, Some("127.0.0.1"))?;
        assert_eq!(tx.local_addr()?.ip().to_string(), "127.0.0.1");
        assert_ne!(tx.local_port()?, 0);
        Ok(())
    }

    #[test]
    fn test_connect_udp_unresolvable() {
        let err = connect_udp("no-such-host.invalid", 9, None).unwrap_err();
        assert!(matches!(err, SocketError::Resolve { .. }), "{err}");
    }

    #[test]
    fn test_local_address_toward_loopback() -> anyhow::Result<()> {
        assert_eq!(local_address_toward("127.0.0.1")?, "127.0.0.1");
        Ok(())
    }

    #[test]
    fn test_local_address_toward_unknown_host_falls_back() -> anyhow::Result<()> {
        assert_eq!(local_address_toward("no-such-host.invalid")?, "0.0.0.0");
        Ok(())
    }
}
