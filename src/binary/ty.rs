use super::decode::{ByteReader, Decode, DecodeTag, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Num(Number),
    Vec128,
    Ref(Reference),
}

impl DecodeTag for ValueType {
    fn decode_tag(byte: u8) -> Option<Self> {
        None.or_else(|| Number::decode_tag(byte).map(Self::Num))
            .or_else(|| (byte == 0x7b).then_some(Self::Vec128))
            .or_else(|| Reference::decode_tag(byte).map(Self::Ref))
    }
}

impl ValueType {
    pub const I32: Self = Self::Num(Number::I32);
    pub const I64: Self = Self::Num(Number::I64);
    pub const F32: Self = Self::Num(Number::F32);
    pub const F64: Self = Self::Num(Number::F64);

    /// The single-byte tag this type is encoded as.
    pub fn code(&self) -> u8 {
        match self {
            Self::Num(Number::I32) => 0x7f,
            Self::Num(Number::I64) => 0x7e,
            Self::Num(Number::F32) => 0x7d,
            Self::Num(Number::F64) => 0x7c,
            Self::Vec128 => 0x7b,
            Self::Ref(Reference::Func) => 0x70,
            Self::Ref(Reference::Extern) => 0x6f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Number {
    F64,
    F32,
    I64,
    I32,
}

impl DecodeTag for Number {
    fn decode_tag(byte: u8) -> Option<Self> {
        match byte {
            0x7c => Some(Self::F64),
            0x7d => Some(Self::F32),
            0x7e => Some(Self::I64),
            0x7f => Some(Self::I32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference {
    Func,
    Extern,
}

impl DecodeTag for Reference {
    fn decode_tag(byte: u8) -> Option<Self> {
        match byte {
            0x70 => Some(Self::Func),
            0x6f => Some(Self::Extern),
            _ => None,
        }
    }
}

/// Ordered parameter or result types.
pub type ResultType = Vec<ValueType>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub inputs: ResultType,
    pub outputs: ResultType,
}

pub struct FunctionTypeTag;

impl DecodeTag for FunctionTypeTag {
    fn decode_tag(byte: u8) -> Option<Self> {
        (byte == 0x60).then_some(Self)
    }
}

impl<'a> Decode<'a> for FunctionType {
    type Tag = FunctionTypeTag;

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self {
            inputs: bytes.decode()?,
            outputs: bytes.decode()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

pub enum LimitsTag {
    Unbounded,
    Bounded,
}

impl DecodeTag for LimitsTag {
    fn decode_tag(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Unbounded),
            0x01 => Some(Self::Bounded),
            _ => None,
        }
    }
}

impl<'a> Decode<'a> for Limits {
    type Tag = LimitsTag;

    fn decode(bytes: &mut ByteReader<'a>, tag: Self::Tag) -> Result<Self> {
        Ok(match tag {
            LimitsTag::Unbounded => Self {
                min: bytes.decode()?,
                max: None,
            },
            LimitsTag::Bounded => Self {
                min: bytes.decode()?,
                max: Some(bytes.decode()?),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub limits: Limits,
}

impl<'a> Decode<'a> for MemoryType {
    type Tag = LimitsTag;

    fn decode(bytes: &mut ByteReader<'a>, tag: Self::Tag) -> Result<Self> {
        Ok(Self {
            limits: bytes.decode_with_tag(tag)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub element: Reference,
    pub limits: Limits,
}

impl<'a> Decode<'a> for TableType {
    type Tag = Reference;

    fn decode(bytes: &mut ByteReader<'a>, element: Self::Tag) -> Result<Self> {
        Ok(Self {
            element,
            limits: bytes.decode()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub ty: ValueType,
    pub is_mutable: bool,
}

enum Mutability {
    Immutable,
    Mutable,
}

impl DecodeTag for Mutability {
    fn decode_tag(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Immutable),
            0x01 => Some(Self::Mutable),
            _ => None,
        }
    }
}

impl<'a> Decode<'a> for GlobalType {
    type Tag = ValueType;

    fn decode(bytes: &mut ByteReader<'a>, ty: Self::Tag) -> Result<Self> {
        Ok(Self {
            ty,
            is_mutable: matches!(bytes.decode::<Mutability>()?, Mutability::Mutable),
        })
    }
}
