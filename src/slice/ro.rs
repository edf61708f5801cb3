use super::macros::{impl_read_encoding, impl_read_encodings, impl_slice_common, impl_slice_ro};

/// Read-only slice wrapper.
///
/// Provides read-only access to segment bytes with bounds-checked
/// decoders for 7-bit, nibble-packed and ASCII data.
#[derive(Debug, Clone, Copy)]
pub struct ROSlice<'a>(&'a [u8]);

impl<'a> ROSlice<'a> {
    /// Creates a new read-only slice wrapper.
    #[inline]
    pub fn new(slice: &'a [u8]) -> Self {
        Self(slice)
    }

    impl_slice_common!();
    impl_slice_ro!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_encodings() {
        let data = [0x05, 0x0A, 0x01, 0x02, 0x03, 0x04];
        let slice = ROSlice::new(&data);

        assert_eq!(slice.read_u7_at(0), 0x05);
        assert_eq!(slice.read_nibbles2_at(0), 0x5A);
        assert_eq!(slice.read_nibbles4_at(2), 0x1234);
        assert_eq!(slice.read_packed_at(2, 4), 0x1234);
        assert_eq!(slice.read_packed_at(1, 1), 0x0A);
    }

    #[test]
    fn read_ascii_masks_unprintable() {
        let data = *b"Kit\x00 1";
        let slice = ROSlice::new(&data);

        assert_eq!(slice.read_ascii_at(0, 6), "Kit? 1");
        assert_eq!(slice.read_ascii_at(4, 2), " 1");
    }

    #[test]
    fn copy_to_slice() {
        let data = [0x11, 0x22, 0x33, 0x44];
        let slice = ROSlice::new(&data);

        let mut dest = [0u8; 4];
        slice.copy_to_slice(&mut dest);
        assert_eq!(dest, data);
    }

    #[test]
    #[should_panic]
    fn copy_to_slice_length_mismatch() {
        let data = [0u8; 4];
        let mut dest = [0u8; 3];
        ROSlice::new(&data).copy_to_slice(&mut dest);
    }

    #[test]
    #[should_panic]
    fn read_out_of_bounds() {
        let data = [0u8; 4];
        ROSlice::new(&data).read_nibbles4_at(1);
    }

    #[test]
    #[should_panic]
    fn read_unsupported_width() {
        let data = [0u8; 4];
        ROSlice::new(&data).read_packed_at(0, 3);
    }
}
