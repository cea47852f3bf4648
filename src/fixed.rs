//! Fixed-point helpers backing the `sin@`, `cos@` and `mul@` built-ins
//!
//! Values carry 6 fractional bits (1.0 == 64). Angles are in 1/256 of a turn.

use crate::value::{truncate, Value};

pub const FRAC_BITS: u32 = 6;

/// Quarter-wave sine table, `round(sin(i / 64 * pi / 2) * 64)`
const SIN_TABLE: [i8; 65] = [
    0x00, 0x02, 0x03, 0x05, 0x06, 0x08, 0x09, 0x0b, 0x0c, 0x0e,
    0x10, 0x11, 0x13, 0x14, 0x16, 0x17, 0x18, 0x1a, 0x1b, 0x1d,
    0x1e, 0x20, 0x21, 0x22, 0x24, 0x25, 0x26, 0x27, 0x29, 0x2a,
    0x2b, 0x2c, 0x2d, 0x2e, 0x2f, 0x30, 0x31, 0x32, 0x33, 0x34,
    0x35, 0x36, 0x37, 0x38, 0x38, 0x39, 0x3a, 0x3b, 0x3b, 0x3c,
    0x3c, 0x3d, 0x3d, 0x3e, 0x3e, 0x3e, 0x3f, 0x3f, 0x3f, 0x40,
    0x40, 0x40, 0x40, 0x40, 0x40,
];

const INDEX_MASK: Value = 63;

pub fn sin(angle: Value) -> Value {
    let index = if angle & 0x40 == 0 {
        // 1st or 3rd quarter
        (angle & INDEX_MASK) as usize
    } else {
        SIN_TABLE.len() - 2 - (angle & INDEX_MASK) as usize
    };

    let magnitude = SIN_TABLE[index] as Value;
    if angle & 0x80 == 0 { magnitude } else { -magnitude }
}

pub fn cos(angle: Value) -> Value {
    sin(angle.wrapping_add(0x40))
}

pub fn mul(a: Value, b: Value) -> Value {
    truncate((a as i32 * b as i32) >> FRAC_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sin_quadrants() {
        assert_eq!(sin(0), 0);
        assert_eq!(sin(0x40), 0x40);
        assert_eq!(sin(0x3f), 0x40);
        assert_eq!(sin(0x80), 0);
        assert_eq!(sin(0xC0), -0x40);
        assert_eq!(sin(0x20), 0x2d);
        assert_eq!(sin(0xA0), -0x2d);
    }

    #[test]
    fn test_cos_is_shifted_sin() {
        assert_eq!(cos(0), sin(0x40));
        assert_eq!(cos(0x40), sin(0x80));
    }

    #[test]
    fn test_mul() {
        assert_eq!(mul(64, 64), 64);
        assert_eq!(mul(32, 128), 64);
        assert_eq!(mul(-64, 96), -96);
        assert_eq!(mul(i16::MAX, i16::MAX), truncate((32767 * 32767) >> 6));
    }
}
