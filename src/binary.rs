pub mod decode;
pub mod instr;
pub mod section;
pub mod ty;
pub mod value;

use decode::{ByteReader, Result};
use section::{
    CodeSection, CustomSection, DataSection, ExportSection, FuncSection, ImportSection,
    MemorySection, SectionId, TypeSection, parse_section,
};

use crate::error::DecodeError;

pub const MAGIC: &[u8; 4] = b"\0asm";
pub const VERSION: u32 = 1;

/// A decoded module. Every section borrows from the buffer it was decoded
/// from; sections that were not present stay `None`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Module<'a> {
    pub custom_sections: Vec<CustomSection<'a>>,
    pub type_section: Option<TypeSection>,
    pub import_section: Option<ImportSection<'a>>,
    pub func_section: Option<FuncSection>,
    pub memory_section: Option<MemorySection>,
    pub export_section: Option<ExportSection<'a>>,
    pub code_section: Option<CodeSection<'a>>,
    pub data_section: Option<DataSection<'a>>,
}

fn set_once<T>(slot: &mut Option<T>, section: T, id: SectionId) -> Result<()> {
    if slot.is_some() {
        return Err(DecodeError::InvalidByte(id as u8));
    }
    *slot = Some(section);
    Ok(())
}

impl<'a> Module<'a> {
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        let mut bytes = ByteReader::new(bytes);
        bytes
            .consume_constant(MAGIC)
            .map_err(|_| DecodeError::BadMagic)?;
        let version: u32 = bytes.next()?;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let mut module = Self::default();
        while !bytes.done() {
            if let Some(custom) = parse_section(&mut bytes)? {
                module.custom_sections.push(custom);
            } else if let Some(s) = parse_section(&mut bytes)? {
                set_once(&mut module.type_section, s, SectionId::Type)?;
            } else if let Some(s) = parse_section(&mut bytes)? {
                set_once(&mut module.import_section, s, SectionId::Import)?;
            } else if let Some(s) = parse_section(&mut bytes)? {
                set_once(&mut module.func_section, s, SectionId::Function)?;
            } else if let Some(s) = parse_section(&mut bytes)? {
                set_once(&mut module.memory_section, s, SectionId::Memory)?;
            } else if let Some(s) = parse_section(&mut bytes)? {
                set_once(&mut module.export_section, s, SectionId::Export)?;
            } else if let Some(s) = parse_section(&mut bytes)? {
                set_once(&mut module.code_section, s, SectionId::Code)?;
            } else if let Some(s) = parse_section(&mut bytes)? {
                set_once(&mut module.data_section, s, SectionId::Data)?;
            } else {
                let byte: u8 = bytes.next()?;
                let id = SectionId::from_u8(byte).ok_or(DecodeError::InvalidByte(byte))?;
                let skipped = bytes.next_buffer()?;
                log::debug!(
                    "skipping unsupported {id:?} section ({} bytes)",
                    skipped.remaining().len()
                );
            }
        }
        Ok(module)
    }
}
