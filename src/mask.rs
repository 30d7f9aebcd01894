/// Mask or unmask a payload in place.
///
/// Every byte `i` is XORed with `key[i % 4]`. The operation is an
/// involution: applying it twice with the same key restores the input,
/// which is how the decoder unmasks and the encoder masks with one
/// function.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        for (byte, k) in chunk.iter_mut().zip(key) {
            *byte ^= k;
        }
    }
    for (byte, k) in chunks.into_remainder().iter_mut().zip(key) {
        *byte ^= k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_mask() {
        let key = [0x6d, 0xb6, 0xb2, 0x80];
        let data = [
            0xf3, 0x00, 0x01, 0x02, 0x03, 0x80, 0x81, 0x82, 0xff, 0xfe, 0x00, 0x17, 0x74,
        ];

        // Check every length so both the chunked path and the remainder
        // path are exercised.
        for len in 0..=data.len() {
            let mut masked = data[..len].to_vec();
            apply_mask(&mut masked, key);

            for (i, byte) in masked.iter().enumerate() {
                assert_eq!(*byte, data[i] ^ key[i % 4], "mismatch at index {i}");
            }
        }
    }

    #[test]
    fn test_mask_involution() {
        let key = [0xAA, 0xBB, 0xCC, 0xDD];
        let original = b"Hello, World! This is a test message with various lengths.";

        let mut data = original.to_vec();
        apply_mask(&mut data, key);
        assert_ne!(&data[..], &original[..]);

        apply_mask(&mut data, key);
        assert_eq!(&data[..], &original[..]);
    }

    #[test]
    fn test_mask_zero_key_is_identity() {
        let mut data = b"unchanged".to_vec();
        apply_mask(&mut data, [0; 4]);
        assert_eq!(&data[..], b"unchanged");
    }

    #[test]
    fn test_mask_edge_cases() {
        let key = [0x12, 0x34, 0x56, 0x78];

        let mut empty: Vec<u8> = vec![];
        apply_mask(&mut empty, key);
        assert!(empty.is_empty());

        let mut single = vec![0xAB];
        apply_mask(&mut single, key);
        assert_eq!(single, vec![0xAB ^ 0x12]);

        let mut three = vec![0xAB, 0xCD, 0xEF];
        apply_mask(&mut three, key);
        assert_eq!(three, vec![0xAB ^ 0x12, 0xCD ^ 0x34, 0xEF ^ 0x56]);
    }

    #[test]
    fn test_mask_large_buffer() {
        let key = [0x01, 0x02, 0x03, 0x04];
        let mut data: Vec<u8> = (0..10_000).map(|i| (i % 256) as u8).collect();
        let original = data.clone();

        apply_mask(&mut data, key);

        for (i, byte) in data.iter().enumerate() {
            assert_eq!(*byte, original[i] ^ key[i % 4], "mismatch at index {i}");
        }
    }
}
