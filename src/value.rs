/// Runtime value in the STAK VM
///
/// The VM has exactly one datum: a 16-bit signed integer. It is used for numbers,
/// booleans (zero / non-zero), local addresses and built-in arguments and results.
/// The operand stack is homogeneous, so there is no tagging.
pub type Value = i16;

/// Check if a value is truthy (non-zero)
#[inline]
pub fn is_truthy(value: Value) -> bool {
    value != 0
}

/// Convert a boolean into the VM's canonical 0/1 representation
#[inline]
pub fn from_bool(b: bool) -> Value {
    if b { 1 } else { 0 }
}

/// Truncate a 32-bit intermediate to the VM's 16-bit value, wrapping like the target does
#[inline]
pub fn truncate(wide: i32) -> Value {
    wide as Value
}

/// Decode a little-endian value from two bytes
#[inline]
pub fn from_le(lo: u8, hi: u8) -> Value {
    Value::from_le_bytes([lo, hi])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(1));
        assert!(is_truthy(-1));
        assert!(!is_truthy(0));
    }

    #[test]
    fn test_truncate_wraps() {
        assert_eq!(truncate(32767 + 1), -32768);
        assert_eq!(truncate(0x1_0005), 5);
        assert_eq!(truncate(-2), -2);
    }

    #[test]
    fn test_from_le() {
        assert_eq!(from_le(0x34, 0x12), 0x1234);
        assert_eq!(from_le(0xFF, 0xFF), -1);
    }
}
