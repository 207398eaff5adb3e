//! Pixelflut draw command encoding.
//!
//! Each pixel becomes one ASCII line:
//! - `PX <x> <y> <rrggbb>\n` for fully opaque pixels
//! - `PX <x> <y> <rrggbbaa>\n` otherwise
//!
//! Coordinates are absolute canvas coordinates (image position plus offset).

use bytes::{BufMut, BytesMut};
use std::fmt;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// A single pixel placed on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub x: u64,
    pub y: u64,
    pub color: [u8; 4],
}

impl Pixel {
    pub fn new(x: u64, y: u64, color: [u8; 4]) -> Self {
        Self { x, y, color }
    }

    /// Whether the alpha suffix is emitted.
    pub fn is_opaque(&self) -> bool {
        self.color[3] == 0xff
    }

    /// Exact length of the encoded command, newline included.
    pub fn encoded_len(&self) -> usize {
        let color = if self.is_opaque() { 6 } else { 8 };
        "PX ".len() + decimal_len(self.x) + 1 + decimal_len(self.y) + 1 + color + 1
    }

    /// Append the draw command for this pixel to `out`.
    pub fn encode(&self, out: &mut BytesMut) {
        let [r, g, b, a] = self.color;
        out.reserve(self.encoded_len());
        out.put_slice(b"PX ");
        put_decimal(out, self.x);
        out.put_u8(b' ');
        put_decimal(out, self.y);
        out.put_u8(b' ');
        for channel in [r, g, b] {
            put_hex(out, channel);
        }
        if !self.is_opaque() {
            put_hex(out, a);
        }
        out.put_u8(b'\n');
    }
}

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

fn put_decimal(out: &mut BytesMut, mut n: u64) {
    let mut digits = [0u8; 20];
    let mut start = digits.len();
    loop {
        start -= 1;
        digits[start] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    out.put_slice(&digits[start..]);
}

fn put_hex(out: &mut BytesMut, byte: u8) {
    out.put_u8(HEX_DIGITS[usize::from(byte >> 4)]);
    out.put_u8(HEX_DIGITS[usize::from(byte & 0x0f)]);
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.color;
        write!(f, "PX {} {} {:02x}{:02x}{:02x}", self.x, self.y, r, g, b)?;
        if !self.is_opaque() {
            write!(f, "{a:02x}")?;
        }
        f.write_str("\n")
    }
}
