//! Bounds-checked wrappers over segment bytes.
//!
//! Device memory travels over a 7-bit channel, so every byte holds at most
//! seven bits. Values wider than that are nibble-packed: each byte carries
//! four bits, most significant nibble first.

mod macros;
mod ro;
mod rw;
mod wo;

pub use ro::ROSlice;
pub use rw::RWSlice;
pub use wo::WOSlice;

/// Largest value a single 7-bit data byte can hold.
pub const MAX_DATA_BYTE: u8 = 0x7F;

/// Largest raw value storable in `width` bytes, or `None` for unsupported widths.
pub const fn max_packed(width: usize) -> Option<u32> {
    match width {
        1 => Some(MAX_DATA_BYTE as u32),
        2 => Some(0xFF),
        4 => Some(0xFFFF),
        _ => None,
    }
}
