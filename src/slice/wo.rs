use super::macros::{impl_slice_common, impl_slice_wo, impl_write_encoding, impl_write_encodings};

/// Write-only slice wrapper.
///
/// Provides write-only access to segment bytes with bounds-checked
/// encoders. The underlying data cannot be read through this wrapper.
#[derive(Debug)]
pub struct WOSlice<'a>(&'a mut [u8]);

impl<'a> WOSlice<'a> {
    /// Creates a new write-only slice wrapper.
    #[inline]
    pub fn new(slice: &'a mut [u8]) -> Self {
        Self(slice)
    }

    impl_slice_common!();
    impl_slice_wo!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wo_slice_operations() {
        let mut data = [0u8; 4];

        WOSlice::new(&mut data).copy_from_slice(&[0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(data, [0x0A, 0x0B, 0x0C, 0x0D]);

        WOSlice::new(&mut data).fill(0x7F);
        assert_eq!(data, [0x7F; 4]);

        WOSlice::new(&mut data).write_nibbles4_at(0, 0x1234);
        assert_eq!(data, [0x01, 0x02, 0x03, 0x04]);

        WOSlice::new(&mut data).write_nibbles2_at(2, 0xFF);
        assert_eq!(data, [0x01, 0x02, 0x0F, 0x0F]);

        WOSlice::new(&mut data).write_packed_at(0, 1, 0x40);
        assert_eq!(data[0], 0x40);
    }

    #[test]
    fn write_ascii_pads_with_spaces() {
        let mut data = [0u8; 6];
        WOSlice::new(&mut data).write_ascii_at(0, 6, "Kick");
        assert_eq!(&data, b"Kick  ");
    }

    #[test]
    #[should_panic]
    fn write_u7_rejects_high_bit() {
        let mut data = [0u8; 1];
        WOSlice::new(&mut data).write_u7_at(0, 0x80);
    }

    #[test]
    #[should_panic]
    fn write_nibbles_rejects_wide_value() {
        let mut data = [0u8; 2];
        WOSlice::new(&mut data).write_nibbles2_at(0, 0x100);
    }
}
