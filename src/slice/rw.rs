use super::macros::{
    impl_read_encoding, impl_read_encodings, impl_slice_common, impl_slice_ro, impl_slice_wo,
    impl_write_encoding, impl_write_encodings,
};

/// Read-write slice wrapper.
///
/// Provides both read and write access to segment bytes.
#[derive(Debug)]
pub struct RWSlice<'a>(&'a mut [u8]);

impl<'a> RWSlice<'a> {
    /// Creates a new read-write slice wrapper.
    #[inline]
    pub fn new(slice: &'a mut [u8]) -> Self {
        Self(slice)
    }

    impl_slice_common!();
    impl_slice_ro!();
    impl_slice_wo!();
}
