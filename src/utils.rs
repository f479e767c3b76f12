pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(&x, &y)| x == y).count()
}

/// Order preserving u32 built from the first (up to) 4 bytes of `bytes`, zero padded.
///
/// Two keys with different heads compare the same way as their heads,
/// equal heads require a full comparison.
pub fn key_head(bytes: &[u8]) -> u32 {
    match bytes.len() {
        4.. => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        3 => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]),
        2 => u32::from_be_bytes([bytes[0], bytes[1], 0, 0]),
        1 => u32::from_be_bytes([bytes[0], 0, 0, 0]),
        0 => 0,
    }
}

pub struct EscapedBytes<'a>(pub &'a [u8]);

impl std::fmt::Debug for EscapedBytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut end_zeroes = 0;
        if cfg!(any(fuzzing, test)) {
            end_zeroes = self.0.iter().rev().take_while(|b| **b == 0).count();
            if end_zeroes <= 5 {
                end_zeroes = 0;
            }
        }
        for &b in &self.0[..self.0.len() - end_zeroes] {
            write!(f, "{}", std::ascii::escape_default(b))?
        }
        if end_zeroes != 0 {
            write!(f, "…\\0*{end_zeroes}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_head_order() {
        let samples: &[&[u8]] = &[
            b"", b"\x00", b"\x01", b"a", b"aa", b"aaa", b"aaaa", b"aaaaa", b"b", b"bb", b"c",
        ];
        let conv = samples.iter().copied().map(key_head).collect::<Vec<_>>();
        assert!(samples.windows(2).all(|a| a[0] <= a[1]));
        assert!(conv.windows(2).all(|a| a[0] <= a[1]));

        let mut samples = (0..10000)
            .map(|_| {
                let len = rand::random::<u8>() as usize % 8;
                let mut v = vec![0u8; len];
                rand::RngCore::fill_bytes(&mut rand::rng(), &mut v);
                v
            })
            .collect::<Vec<_>>();
        samples.sort();
        let conv = samples.iter().map(|v| key_head(v)).collect::<Vec<_>>();
        assert!(conv.windows(2).all(|a| a[0] <= a[1]));
    }

    #[test]
    fn test_common_prefix_len() {
        assert_eq!(common_prefix_len(b"", b"abc"), 0);
        assert_eq!(common_prefix_len(b"abc", b"abd"), 2);
        assert_eq!(common_prefix_len(b"ab", b"abcd"), 2);
        assert_eq!(common_prefix_len(b"\x00\x00\x00\x00", b"\x00\x00\x01\x00"), 2);
    }

    #[test]
    fn test_escaped_bytes() {
        assert_eq!(format!("{:?}", EscapedBytes(b"a\x01b")), "a\\x01b");
        assert_eq!(format!("{:?}", EscapedBytes(b"k\0\0\0\0\0\0")), "k…\\0*6");
    }
}
