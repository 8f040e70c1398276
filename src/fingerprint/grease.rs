/// Check if a u16 value is a GREASE value (RFC 8701).
///
/// GREASE values follow the pattern 0x?A?A where both bytes are identical:
/// 0x0A0A, 0x1A1A, ..., 0xFAFA
pub fn is_grease_u16(val: u16) -> bool {
    let hi = (val >> 8) as u8;
    let lo = val as u8;
    hi == lo && (hi & 0x0F) == 0x0A
}

/// Filter GREASE values from a slice of u16 values.
pub fn filter_grease_u16(values: &[u16]) -> Vec<u16> {
    values.iter().copied().filter(|v| !is_grease_u16(*v)).collect()
}

/// True if any value in the slice is a GREASE placeholder.
pub fn contains_grease(values: &[u16]) -> bool {
    values.iter().any(|v| is_grease_u16(*v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grease_values() {
        for hi in 0u16..16 {
            let byte = (hi << 4) | 0x0A;
            let v = (byte << 8) | byte;
            assert!(is_grease_u16(v), "0x{:04X} should be GREASE", v);
        }
    }

    #[test]
    fn test_non_grease_values() {
        assert!(!is_grease_u16(0x0303));
        assert!(!is_grease_u16(0xC02B));
        assert!(!is_grease_u16(0x1301));
        assert!(!is_grease_u16(0x00FF));
        assert!(!is_grease_u16(0x0A1A));
    }

    #[test]
    fn test_filter_grease() {
        let input = vec![0x0A0A, 0x1301, 0x1302, 0xFAFA, 0xC02B];
        assert_eq!(filter_grease_u16(&input), vec![0x1301, 0x1302, 0xC02B]);
        assert!(contains_grease(&input));
        assert!(!contains_grease(&[0x1301]));
    }
}
