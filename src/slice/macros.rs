/// Generates read method(s) for a single data encoding.
macro_rules! impl_read_encoding {
    // Single 7-bit byte
    (u7) => {
        /// Reads a 7-bit data byte at the given offset.
        ///
        /// # Panics
        /// Panics if `offset >= len()`.
        #[inline]
        pub fn read_u7_at(&self, offset: usize) -> u8 {
            self.0[offset] & 0x7F
        }
    };
    // Nibble-packed values, `$n` bytes wide
    (nibbles, $n:literal) => {
        paste::paste! {
            #[doc = "Reads a value packed into " $n " nibbles at the given offset."]
            #[doc = ""]
            #[doc = "# Panics"]
            #[doc = "Panics if `offset + " $n " > len()`."]
            #[inline]
            pub fn [<read_nibbles $n _at>](&self, offset: usize) -> u32 {
                assert!(
                    offset + $n <= self.0.len(),
                    "read out of bounds: offset {} + size {} > len {}",
                    offset, $n, self.0.len()
                );
                self.0[offset..offset + $n]
                    .iter()
                    .fold(0u32, |acc, b| (acc << 4) | u32::from(b & 0x0F))
            }
        }
    };
}

/// Generates read methods for all supported encodings.
macro_rules! impl_read_encodings {
    () => {
        impl_read_encoding!(u7);
        impl_read_encoding!(nibbles, 2);
        impl_read_encoding!(nibbles, 4);

        /// Reads a raw value `width` bytes wide (1, 2 or 4).
        ///
        /// # Panics
        /// Panics on any other width or if the range exceeds slice bounds.
        #[inline]
        pub fn read_packed_at(&self, offset: usize, width: usize) -> u32 {
            match width {
                1 => u32::from(self.read_u7_at(offset)),
                2 => self.read_nibbles2_at(offset),
                4 => self.read_nibbles4_at(offset),
                _ => panic!("unsupported packed width {}", width),
            }
        }

        /// Reads `len` bytes of ASCII text, replacing non-printable bytes with `?`.
        ///
        /// # Panics
        /// Panics if the range exceeds slice bounds.
        pub fn read_ascii_at(&self, offset: usize, len: usize) -> String {
            self.0[offset..offset + len]
                .iter()
                .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '?' })
                .collect()
        }
    };
}

/// Generates write method(s) for a single data encoding.
macro_rules! impl_write_encoding {
    (u7) => {
        /// Writes a 7-bit data byte at the given offset.
        ///
        /// # Panics
        /// Panics if `offset >= len()` or `value > 0x7F`.
        #[inline]
        pub fn write_u7_at(&mut self, offset: usize, value: u8) {
            assert!(value <= 0x7F, "data byte out of range: {:#x}", value);
            self.0[offset] = value;
        }
    };
    (nibbles, $n:literal) => {
        paste::paste! {
            #[doc = "Writes a value packed into " $n " nibbles at the given offset."]
            #[doc = ""]
            #[doc = "# Panics"]
            #[doc = "Panics if `offset + " $n " > len()` or the value needs more than " $n " nibbles."]
            #[inline]
            pub fn [<write_nibbles $n _at>](&mut self, offset: usize, value: u32) {
                assert!(
                    offset + $n <= self.0.len(),
                    "write out of bounds: offset {} + size {} > len {}",
                    offset, $n, self.0.len()
                );
                assert!(
                    value >> (4 * $n) == 0,
                    "value {:#x} does not fit in {} nibbles",
                    value, $n
                );
                for (i, b) in self.0[offset..offset + $n].iter_mut().enumerate() {
                    *b = ((value >> (4 * ($n - 1 - i))) & 0x0F) as u8;
                }
            }
        }
    };
}

/// Generates write methods for all supported encodings.
macro_rules! impl_write_encodings {
    () => {
        impl_write_encoding!(u7);
        impl_write_encoding!(nibbles, 2);
        impl_write_encoding!(nibbles, 4);

        /// Writes a raw value `width` bytes wide (1, 2 or 4).
        ///
        /// # Panics
        /// Panics on any other width, if the value does not fit, or if the
        /// range exceeds slice bounds.
        #[inline]
        pub fn write_packed_at(&mut self, offset: usize, width: usize, value: u32) {
            match width {
                1 => self.write_u7_at(offset, value as u8),
                2 => self.write_nibbles2_at(offset, value),
                4 => self.write_nibbles4_at(offset, value),
                _ => panic!("unsupported packed width {}", width),
            }
        }

        /// Writes ASCII text at `offset`, padding with spaces to `len` bytes.
        ///
        /// # Panics
        /// Panics if the text is longer than `len` or the range exceeds slice bounds.
        pub fn write_ascii_at(&mut self, offset: usize, len: usize, text: &str) {
            assert!(text.len() <= len, "text longer than {} bytes", len);
            let dest = &mut self.0[offset..offset + len];
            dest.fill(b' ');
            dest[..text.len()].copy_from_slice(text.as_bytes());
        }
    };
}

/// Generates common slice methods (len, is_empty).
macro_rules! impl_slice_common {
    () => {
        /// Returns the length of the slice.
        #[inline]
        pub fn len(&self) -> usize {
            self.0.len()
        }

        /// Returns true if the slice is empty.
        #[inline]
        pub fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
    };
}

/// Generates read-only slice methods (copy_to_slice, as_bytes, decoders).
macro_rules! impl_slice_ro {
    () => {
        /// Copies the entire slice to the destination buffer.
        ///
        /// # Panics
        /// Panics if destination length doesn't match slice length.
        #[inline]
        pub fn copy_to_slice(&self, dest: &mut [u8]) {
            dest.copy_from_slice(self.0);
        }

        /// Returns the underlying bytes.
        #[inline]
        pub fn as_bytes(&self) -> &[u8] {
            self.0
        }

        impl_read_encodings!();
    };
}

/// Generates write-only slice methods (copy_from_slice, fill, encoders).
macro_rules! impl_slice_wo {
    () => {
        /// Copies the source buffer to the entire slice.
        ///
        /// # Panics
        /// Panics if source length doesn't match slice length.
        #[inline]
        pub fn copy_from_slice(&mut self, src: &[u8]) {
            self.0.copy_from_slice(src);
        }

        /// Fills the entire slice with the given value.
        #[inline]
        pub fn fill(&mut self, value: u8) {
            self.0.fill(value);
        }

        impl_write_encodings!();
    };
}

pub(super) use impl_read_encoding;
pub(super) use impl_read_encodings;
pub(super) use impl_slice_common;
pub(super) use impl_slice_ro;
pub(super) use impl_slice_wo;
pub(super) use impl_write_encoding;
pub(super) use impl_write_encodings;
