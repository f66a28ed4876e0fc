use super::decode::{ByteReader, Decode, DecodeTag, Result};
use super::instr::{self, Instruction};
use super::ty::{FunctionType, GlobalType, MemoryType, TableType, ValueType};
use crate::error::DecodeError;

/// Upper bound on the locals one function body may declare.
pub const MAX_LOCALS: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
}

impl SectionId {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Custom,
            1 => Self::Type,
            2 => Self::Import,
            3 => Self::Function,
            4 => Self::Table,
            5 => Self::Memory,
            6 => Self::Global,
            7 => Self::Export,
            8 => Self::Start,
            9 => Self::Element,
            10 => Self::Code,
            11 => Self::Data,
            12 => Self::DataCount,
            _ => return None,
        })
    }
}

/// A section body that can be decoded on its own.
pub trait Section<'a>: Decode<'a, Tag = ()> {
    const ID: SectionId;
}

/// Attempts to decode one section with the given id.
///
/// If the next byte is a different id (or the buffer is exhausted) nothing is
/// consumed and `None` is returned. Otherwise the parser runs over a reader
/// bounded by the declared section length, and the outer reader moves past
/// the whole declared length no matter how much of it the parser used.
pub fn parse_section_with<'a, T>(
    bytes: &mut ByteReader<'a>,
    id: SectionId,
    parser: impl FnOnce(&mut ByteReader<'a>) -> Result<T>,
) -> Result<Option<T>> {
    if bytes.done() || bytes.peek::<u8>()? != id as u8 {
        return Ok(None);
    }
    bytes.next::<u8>()?;
    let mut section = bytes.next_buffer()?;
    log::debug!(
        "parsing {id:?} section ({} bytes) at offset 0x{:X}",
        section.remaining().len(),
        bytes.position()
    );
    parser(&mut section).map(Some)
}

pub fn parse_section<'a, S: Section<'a>>(bytes: &mut ByteReader<'a>) -> Result<Option<S>> {
    parse_section_with(bytes, S::ID, |section| section.decode())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection<'a> {
    pub name: &'a str,
    pub payload: &'a [u8],
}

impl<'a> Decode<'a> for CustomSection<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self {
            name: bytes.next_name()?,
            payload: bytes.rest(),
        })
    }
}

impl<'a> Section<'a> for CustomSection<'a> {
    const ID: SectionId = SectionId::Custom;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSection(pub Vec<FunctionType>);

impl<'a> Decode<'a> for TypeSection {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self(bytes.decode()?))
    }
}

impl<'a> Section<'a> for TypeSection {
    const ID: SectionId = SectionId::Type;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDesc {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

pub enum ImportDescTag {
    Func,
    Table,
    Memory,
    Global,
}

impl DecodeTag for ImportDescTag {
    fn decode_tag(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Func),
            0x01 => Some(Self::Table),
            0x02 => Some(Self::Memory),
            0x03 => Some(Self::Global),
            _ => None,
        }
    }
}

impl<'a> Decode<'a> for ImportDesc {
    type Tag = ImportDescTag;

    fn decode(bytes: &mut ByteReader<'a>, tag: Self::Tag) -> Result<Self> {
        Ok(match tag {
            ImportDescTag::Func => Self::Func(bytes.decode()?),
            ImportDescTag::Table => Self::Table(bytes.decode()?),
            ImportDescTag::Memory => Self::Memory(bytes.decode()?),
            ImportDescTag::Global => Self::Global(bytes.decode()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import<'a> {
    pub module: &'a str,
    pub name: &'a str,
    pub desc: ImportDesc,
}

impl<'a> Decode<'a> for Import<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self {
            module: bytes.next_name()?,
            name: bytes.next_name()?,
            desc: bytes.decode()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSection<'a>(pub Vec<Import<'a>>);

impl<'a> Decode<'a> for ImportSection<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self(bytes.decode()?))
    }
}

impl<'a> Section<'a> for ImportSection<'a> {
    const ID: SectionId = SectionId::Import;
}

/// Type indices of the defined functions, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSection(pub Vec<u32>);

impl<'a> Decode<'a> for FuncSection {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self(bytes.decode()?))
    }
}

impl<'a> Section<'a> for FuncSection {
    const ID: SectionId = SectionId::Function;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySection(pub Vec<MemoryType>);

impl<'a> Decode<'a> for MemorySection {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self(bytes.decode()?))
    }
}

impl<'a> Section<'a> for MemorySection {
    const ID: SectionId = SectionId::Memory;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportDesc {
    Func(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

impl<'a> Decode<'a> for ExportDesc {
    type Tag = ImportDescTag;

    fn decode(bytes: &mut ByteReader<'a>, tag: Self::Tag) -> Result<Self> {
        let index = bytes.decode()?;
        Ok(match tag {
            ImportDescTag::Func => Self::Func(index),
            ImportDescTag::Table => Self::Table(index),
            ImportDescTag::Memory => Self::Memory(index),
            ImportDescTag::Global => Self::Global(index),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export<'a> {
    pub name: &'a str,
    pub desc: ExportDesc,
}

impl<'a> Decode<'a> for Export<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self {
            name: bytes.next_name()?,
            desc: bytes.decode()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSection<'a>(pub Vec<Export<'a>>);

impl<'a> Decode<'a> for ExportSection<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self(bytes.decode()?))
    }
}

impl<'a> Section<'a> for ExportSection<'a> {
    const ID: SectionId = SectionId::Export;
}

/// A run of `count` locals sharing one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locals {
    pub count: u32,
    pub ty: ValueType,
}

impl<'a> Decode<'a> for Locals {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self {
            count: bytes.decode()?,
            ty: bytes.decode()?,
        })
    }
}

/// One function body. `code` borrows the module buffer and stops just before
/// the terminating `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDef<'a> {
    pub locals: Vec<Locals>,
    pub code: &'a [u8],
}

impl CodeDef<'_> {
    pub fn local_count(&self) -> u64 {
        self.locals.iter().map(|l| u64::from(l.count)).sum()
    }
}

impl<'a> Decode<'a> for CodeDef<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        let mut body = bytes.next_buffer()?;
        let def = Self::decode_body(&mut body).map_err(|err| match err {
            // the frame ended before its content did
            DecodeError::AbruptStop => DecodeError::WrongSize,
            err => err,
        })?;
        if !body.done() {
            return Err(DecodeError::WrongSize);
        }
        Ok(def)
    }
}

impl<'a> CodeDef<'a> {
    fn decode_body(body: &mut ByteReader<'a>) -> Result<Self> {
        let locals: Vec<Locals> = body.decode()?;
        let def = Self {
            locals,
            code: instr::read_expression(body)?,
        };
        if def.local_count() > MAX_LOCALS {
            return Err(DecodeError::TooManyLocals);
        }
        Ok(def)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSection<'a>(pub Vec<CodeDef<'a>>);

impl<'a> Decode<'a> for CodeSection<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self(bytes.decode()?))
    }
}

impl<'a> Section<'a> for CodeSection<'a> {
    const ID: SectionId = SectionId::Code;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Passive,
    Active { memory: u32, offset: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data<'a> {
    pub mode: DataMode,
    pub init: &'a [u8],
}

/// Reads a constant offset expression: `i32.const n` followed by `end`.
fn read_offset(bytes: &mut ByteReader<'_>) -> Result<u32> {
    let opcode: u8 = bytes.peek()?;
    match bytes.decode::<Instruction>()? {
        Instruction::I32Const(offset) => {
            bytes.consume_constant(&[0x0b])?;
            Ok(offset.cast_unsigned())
        }
        _ => Err(DecodeError::InvalidByte(opcode)),
    }
}

impl<'a> Decode<'a> for Data<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        let flags: u32 = bytes.decode()?;
        let mode = match flags {
            0 => DataMode::Active {
                memory: 0,
                offset: read_offset(bytes)?,
            },
            1 => DataMode::Passive,
            2 => DataMode::Active {
                memory: bytes.decode()?,
                offset: read_offset(bytes)?,
            },
            _ => return Err(DecodeError::InvalidByte(flags as u8)),
        };
        let len: u32 = bytes.decode()?;
        Ok(Self {
            mode,
            init: bytes.next_bytes(len as usize)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSection<'a>(pub Vec<Data<'a>>);

impl<'a> Decode<'a> for DataSection<'a> {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self(bytes.decode()?))
    }
}

impl<'a> Section<'a> for DataSection<'a> {
    const ID: SectionId = SectionId::Data;
}
