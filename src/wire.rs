//! Network byte order for 64-bit integers and doubles
//!
//! `htons`/`htonl` stop at 32 bits. These helpers extend the same convention
//! (big-endian on the wire) to `i64` and IEEE-754 `f64` values. They are
//! their own inverses, so `ntoh_*` is `hton_*` under another name.
//!
//! The host byte order is determined once, from the in-memory layout of a
//! known bit pattern, and never changes afterwards.
//!
//! ```rust
//! use core_sockets::wire;
//!
//! let stamp = wire::hton_f64(1.5);
//! assert_eq!(wire::ntoh_f64(stamp), 1.5);
//! assert_eq!(wire::i64_to_wire(1), [0, 0, 0, 0, 0, 0, 0, 1]);
//! ```

/// `true` when the host stores the most significant byte first.
pub const HOST_IS_BIG_ENDIAN: bool = 0x0102u16.to_ne_bytes()[0] == 0x01;

#[inline]
fn reorder(bits: u64, host_big_endian: bool) -> u64 {
    if host_big_endian {
        return bits;
    }
    (bits >> 56)
        | ((bits >> 40) & 0x0000_0000_0000_ff00)
        | ((bits >> 24) & 0x0000_0000_00ff_0000)
        | ((bits >> 8) & 0x0000_0000_ff00_0000)
        | ((bits << 8) & 0x0000_00ff_0000_0000)
        | ((bits << 24) & 0x0000_ff00_0000_0000)
        | ((bits << 40) & 0x00ff_0000_0000_0000)
        | (bits << 56)
}

/// Host to network order for a 64-bit integer
#[inline]
pub fn hton_i64(v: i64) -> i64 {
    reorder(v as u64, HOST_IS_BIG_ENDIAN) as i64
}

/// Network to host order for a 64-bit integer
#[inline]
pub fn ntoh_i64(v: i64) -> i64 {
    hton_i64(v)
}

/// Host to network order for a double. The result is only meaningful as a
/// bit pattern to put on the wire.
#[inline]
pub fn hton_f64(v: f64) -> f64 {
    f64::from_bits(reorder(v.to_bits(), HOST_IS_BIG_ENDIAN))
}

/// Network to host order for a double
#[inline]
pub fn ntoh_f64(v: f64) -> f64 {
    hton_f64(v)
}

/// Wire bytes of an `i64`, ready to copy into a send buffer
pub fn i64_to_wire(v: i64) -> [u8; 8] {
    hton_i64(v).to_ne_bytes()
}

/// Decode an `i64` received in network order
pub fn i64_from_wire(bytes: [u8; 8]) -> i64 {
    ntoh_i64(i64::from_ne_bytes(bytes))
}

/// Wire bytes of an `f64`
pub fn f64_to_wire(v: f64) -> [u8; 8] {
    hton_f64(v).to_ne_bytes()
}

/// Decode an `f64` received in network order
pub fn f64_from_wire(bytes: [u8; 8]) -> f64 {
    ntoh_f64(f64::from_ne_bytes(bytes))
}
