#![deny(unsafe_op_in_unsafe_fn)]

pub mod builder;
pub mod config;
pub mod error;
pub mod io;
pub mod raw; // OS-level socket helpers (Unix/Windows)
pub mod socket;
pub mod tcp;
pub mod udp;
pub mod wire;

/// Convenience re-exports
pub use builder::SocketBuilder;
pub use config::{apply_tcp_options, cork, uncork, TcpOptions};
pub use error::SocketError;
pub use raw::Type;
pub use socket::{close_socket, open_socket, resolve_host, resolve_local_address, CloseStatus, Socket, BAD_HANDLE_STATUS};
pub use tcp::{accept_with_timeout, connect_tcp, listen, open_tcp_socket};
pub use udp::{connect_udp, local_address_toward, open_udp_socket};
