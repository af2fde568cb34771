//! Binary module format: constant pool plus instruction text.
//!
//! All integers are big-endian:
//! ```text
//! magic:4  const_origin:4  const_size:4  const_data:const_size
//! text_origin:4  text_size:4  text_data:text_size
//! ```
//! `const_size` and `text_size` are byte counts. Origins are carried
//! through but never used for addressing.

use std::io::Read;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{LoadError, Section};

/// A 32-bit machine word.
pub type Word = i32;

/// Expected first four bytes of every module.
pub const MAGIC_NUMBER: u32 = 0x1DEA_DFAD;

/// Fixed header words: magic, two origins, two sizes.
const HEADER_LEN: usize = 20;

/// Constant origin written when none is specified.
pub const DEFAULT_CONSTANT_ORIGIN: u32 = 0x0001_0000;

/// Text origin written when none is specified.
pub const DEFAULT_TEXT_ORIGIN: u32 = 0;

/// A loaded module. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Declared base of the constant pool.
    pub constant_origin: u32,
    /// Constant pool: literals and method header offsets.
    pub constants: Vec<Word>,
    /// Declared base of the text.
    pub text_origin: u32,
    /// Instruction bytes.
    pub text: Vec<u8>,
}

impl Module {
    /// Create a module with the default origins.
    pub fn new(constants: Vec<Word>, text: Vec<u8>) -> Self {
        Self {
            constant_origin: DEFAULT_CONSTANT_ORIGIN,
            constants,
            text_origin: DEFAULT_TEXT_ORIGIN,
            text,
        }
    }

    /// Decode a module from its binary form.
    ///
    /// Bytes after the text section are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, LoadError> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let magic = cursor.u32(Section::Magic)?;
        if magic != MAGIC_NUMBER {
            return Err(LoadError::InvalidMagic { found: magic });
        }

        let constant_origin = cursor.u32(Section::ConstantHeader)?;
        let constant_size = cursor.u32(Section::ConstantHeader)?;
        if !constant_size.is_multiple_of(4) {
            return Err(LoadError::MisalignedConstantPool {
                size: constant_size,
            });
        }
        let constant_bytes = cursor.take(constant_size as usize, Section::ConstantData)?;
        let mut constants = vec![0; constant_bytes.len() / 4];
        BigEndian::read_i32_into(constant_bytes, &mut constants);

        let text_origin = cursor.u32(Section::TextHeader)?;
        let text_size = cursor.u32(Section::TextHeader)?;
        let text = cursor.take(text_size as usize, Section::TextData)?.to_vec();

        Ok(Self {
            constant_origin,
            constants,
            text_origin,
            text,
        })
    }

    /// Read a whole module from `reader` and decode it.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, LoadError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::decode(&bytes)
    }

    /// Encode this module to its binary form.
    ///
    /// # Panics
    ///
    /// Panics if the constant pool or the text is larger than the 32-bit
    /// size fields can describe.
    pub fn encode(&self) -> Vec<u8> {
        let const_size = section_size(self.constants.len() * 4);
        let text_size = section_size(self.text.len());
        let text_start = HEADER_LEN + self.constants.len() * 4;

        let mut out = vec![0; text_start + self.text.len()];
        BigEndian::write_u32(&mut out[0..4], MAGIC_NUMBER);
        BigEndian::write_u32(&mut out[4..8], self.constant_origin);
        BigEndian::write_u32(&mut out[8..12], const_size);
        BigEndian::write_i32_into(&self.constants, &mut out[12..text_start - 8]);
        BigEndian::write_u32(&mut out[text_start - 8..text_start - 4], self.text_origin);
        BigEndian::write_u32(&mut out[text_start - 4..text_start], text_size);
        out[text_start..].copy_from_slice(&self.text);
        out
    }

    /// Constant pool entry at `index`, if present.
    pub fn constant(&self, index: usize) -> Option<Word> {
        self.constants.get(index).copied()
    }

    /// Read the two-field method header (`arg_count`, `local_count`) at `offset`.
    pub fn method_header(&self, offset: usize) -> Option<(u16, u16)> {
        let header = self.text.get(offset..offset.checked_add(4)?)?;
        Some((
            BigEndian::read_u16(&header[0..2]),
            BigEndian::read_u16(&header[2..4]),
        ))
    }
}

fn section_size(len: usize) -> u32 {
    u32::try_from(len)
        .unwrap_or_else(|_| panic!("section of {len} bytes does not fit a module size field"))
}

/// Length-checked reader over the raw module bytes.
struct Cursor<'b> {
    bytes: &'b [u8],
    pos: usize,
}

impl<'b> Cursor<'b> {
    fn take(&mut self, len: usize, section: Section) -> Result<&'b [u8], LoadError> {
        let available = self.bytes.len() - self.pos;
        if len > available {
            return Err(LoadError::TruncatedInput {
                section,
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self, section: Section) -> Result<u32, LoadError> {
        self.take(4, section).map(BigEndian::read_u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(constants: &[i32], text: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_NUMBER.to_be_bytes());
        bytes.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        bytes.extend_from_slice(&((constants.len() * 4) as u32).to_be_bytes());
        for c in constants {
            bytes.extend_from_slice(&c.to_be_bytes());
        }
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&(text.len() as u32).to_be_bytes());
        bytes.extend_from_slice(text);
        bytes
    }

    #[test]
    fn decode_minimal_module() {
        let bytes = header(&[42, -1], &[0x10, 0x07, 0xFF]);
        let module = Module::decode(&bytes).unwrap();
        assert_eq!(module.constants, vec![42, -1]);
        assert_eq!(module.text, vec![0x10, 0x07, 0xFF]);
        assert_eq!(module.constant_origin, 0x0001_0000);
        assert_eq!(module.text_origin, 0);
    }

    #[test]
    fn decode_empty_sections() {
        let module = Module::decode(&header(&[], &[])).unwrap();
        assert!(module.constants.is_empty());
        assert!(module.text.is_empty());
    }

    #[test]
    fn encode_matches_handwritten_layout() {
        let module = Module::new(vec![42, -1], vec![0x10, 0x07, 0xFF]);
        assert_eq!(module.encode(), header(&[42, -1], &[0x10, 0x07, 0xFF]));
    }

    #[test]
    fn encode_places_origins_and_sizes() {
        let module = Module {
            constant_origin: 0x0000_4000,
            constants: vec![7],
            text_origin: 0x0000_0040,
            text: vec![0xFF, 0x00],
        };
        let bytes = module.encode();
        assert_eq!(bytes.len(), HEADER_LEN + 4 + 2);
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x40, 0x00]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 4]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 7]);
        assert_eq!(&bytes[16..20], &[0x00, 0x00, 0x00, 0x40]);
        assert_eq!(&bytes[20..24], &[0, 0, 0, 2]);
        assert_eq!(Module::decode(&bytes), Ok(module));
    }

    #[test]
    fn encode_empty_module_is_header_only() {
        assert_eq!(Module::new(vec![], vec![]).encode(), header(&[], &[]));
    }

    #[test]
    fn invalid_magic() {
        let mut bytes = header(&[], &[0xFF]);
        bytes[..4].copy_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        assert_eq!(
            Module::decode(&bytes),
            Err(LoadError::InvalidMagic { found: 0xCAFE_BABE })
        );
    }

    #[test]
    fn empty_input_is_truncated_magic() {
        assert_eq!(
            Module::decode(&[]),
            Err(LoadError::TruncatedInput {
                section: Section::Magic,
                needed: 4,
                available: 0
            })
        );
    }

    #[test]
    fn truncated_constant_data() {
        let bytes = header(&[1, 2, 3], &[]);
        // Cut inside the third constant.
        let cut = &bytes[..12 + 10];
        assert_eq!(
            Module::decode(cut),
            Err(LoadError::TruncatedInput {
                section: Section::ConstantData,
                needed: 12,
                available: 10
            })
        );
    }

    #[test]
    fn truncated_text_data() {
        let bytes = header(&[], &[0x00, 0x00, 0xFF]);
        let cut = &bytes[..bytes.len() - 1];
        assert_eq!(
            Module::decode(cut),
            Err(LoadError::TruncatedInput {
                section: Section::TextData,
                needed: 3,
                available: 2
            })
        );
    }

    #[test]
    fn missing_text_header() {
        let bytes = header(&[5], &[]);
        let cut = &bytes[..16 + 2];
        assert_eq!(
            Module::decode(cut),
            Err(LoadError::TruncatedInput {
                section: Section::TextHeader,
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn misaligned_constant_pool() {
        let mut bytes = header(&[], &[]);
        bytes[8..12].copy_from_slice(&6u32.to_be_bytes());
        assert_eq!(
            Module::decode(&bytes),
            Err(LoadError::MisalignedConstantPool { size: 6 })
        );
    }

    #[test]
    fn huge_declared_size_does_not_allocate() {
        let mut bytes = header(&[], &[]);
        bytes[8..12].copy_from_slice(&0xFFFF_FFFCu32.to_be_bytes());
        assert!(matches!(
            Module::decode(&bytes),
            Err(LoadError::TruncatedInput {
                section: Section::ConstantData,
                ..
            })
        ));
    }

    #[test]
    fn trailing_bytes_ignored() {
        let mut bytes = header(&[7], &[0xFF]);
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let module = Module::decode(&bytes).unwrap();
        assert_eq!(module.text, vec![0xFF]);
    }

    #[test]
    fn read_from_reader() {
        let bytes = header(&[9], &[0x00, 0xFF]);
        let module = Module::read_from(&bytes[..]).unwrap();
        assert_eq!(module.constants, vec![9]);
    }

    #[test]
    fn method_header_fields() {
        let module = Module::new(vec![], vec![0xFF, 0x00, 0x02, 0x00, 0x01, 0xAC]);
        assert_eq!(module.method_header(1), Some((2, 1)));
        assert_eq!(module.method_header(3), None);
        assert_eq!(module.method_header(usize::MAX), None);
    }

    #[test]
    fn constant_lookup() {
        let module = Module::new(vec![3, 4], vec![]);
        assert_eq!(module.constant(1), Some(4));
        assert_eq!(module.constant(2), None);
    }
}
