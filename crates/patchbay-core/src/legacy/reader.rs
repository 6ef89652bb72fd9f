//! Cursor over a legacy bank file
//!
//! Two primitives: length-prefixed names with leading padding, and fixed-size
//! binary blocks. Neither ever reads past the end of the buffer.

/// Highest byte value treated as padding in front of a name
pub const NAME_PADDING_MAX: u8 = 0x20;

/// Forward-only reader over a byte buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read a length-prefixed name
    ///
    /// The first byte is the length. Every following byte up to
    /// [`NAME_PADDING_MAX`] replaces it, so the length actually used is the
    /// last byte of that low-value run. The name is then read up to that
    /// length or the end of the buffer, whichever comes first. An exhausted
    /// reader yields an empty name.
    pub fn read_pascal_string(&mut self) -> String {
        let mut name = String::new();
        let Some(&first) = self.data.get(self.pos) else {
            return name;
        };
        self.pos += 1;

        let mut len = usize::from(first);
        while let Some(&byte) = self.data.get(self.pos) {
            if byte > NAME_PADDING_MAX {
                break;
            }
            len = usize::from(byte);
            self.pos += 1;
        }

        let end = (self.pos + len).min(self.data.len());
        name.extend(self.data[self.pos..end].iter().map(|&b| char::from(b)));
        self.pos = end;
        name
    }

    /// Read exactly `size` bytes
    ///
    /// Returns `None` without consuming anything if fewer bytes remain.
    pub fn read_block(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.remaining() < size {
            return None;
        }
        let block = &self.data[self.pos..self.pos + size];
        self.pos += size;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_pascal_string() {
        let data = [5, b'B', b'r', b'a', b's', b's', 0x7F];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_pascal_string(), "Brass");
        assert_eq!(reader.position(), 6);
    }

    #[test]
    fn test_padding_before_length() {
        // Padding bytes precede the real length; the last low byte wins
        let data = [0x00, 0x00, 0x03, b'P', b'a', b'd'];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_pascal_string(), "Pad");
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_leading_space_in_name_is_taken_as_length() {
        // A name starting with a space loses that character: 0x20 is read as
        // the new length and consumes the rest of the buffer
        let data = [0x04, b' ', b'S', b'u', b'b'];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_pascal_string(), "Sub");
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_name_cut_at_end_of_buffer() {
        let data = [0x08, b'S', b't'];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_pascal_string(), "St");
        assert!(reader.is_exhausted());
        assert_eq!(reader.read_pascal_string(), "");
    }

    #[test]
    fn test_read_block() {
        let data = [1, 2, 3, 4, 5];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_block(2), Some(&data[0..2]));
        assert_eq!(reader.read_block(4), None);
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.read_block(3), Some(&data[2..5]));
        assert!(reader.is_exhausted());
    }
}
