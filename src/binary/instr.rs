use super::decode::{ByteReader, Decode, Result};
use super::ty::{Reference, ValueType};
use super::value::VarS;
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W32,
    W64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntUnary {
    Clz,
    Ctz,
    Popcnt,
    Extend8S,
    Extend16S,
    Extend32S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntBinary {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    Rotl,
    Rotr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntCompare {
    Eq,
    Ne,
    LtS,
    LtU,
    GtS,
    GtU,
    LeS,
    LeU,
    GeS,
    GeU,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatUnary {
    Abs,
    Neg,
    Ceil,
    Floor,
    Trunc,
    Nearest,
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatBinary {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Copysign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatCompare {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Load {
    I32,
    I64,
    F32,
    F64,
    I32S8,
    I32U8,
    I32S16,
    I32U16,
    I64S8,
    I64U8,
    I64S16,
    I64U16,
    I64S32,
    I64U32,
}

impl Load {
    /// Bytes touched in linear memory.
    pub fn width(&self) -> u64 {
        match self {
            Self::I32S8 | Self::I32U8 | Self::I64S8 | Self::I64U8 => 1,
            Self::I32S16 | Self::I32U16 | Self::I64S16 | Self::I64U16 => 2,
            Self::I32 | Self::F32 | Self::I64S32 | Self::I64U32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    I32,
    I64,
    F32,
    F64,
    I32As8,
    I32As16,
    I64As8,
    I64As16,
    I64As32,
}

impl Store {
    pub fn width(&self) -> u64 {
        match self {
            Self::I32As8 | Self::I64As8 => 1,
            Self::I32As16 | Self::I64As16 => 2,
            Self::I32 | Self::F32 | Self::I64As32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

const INT_COMPARE: [IntCompare; 10] = [
    IntCompare::Eq,
    IntCompare::Ne,
    IntCompare::LtS,
    IntCompare::LtU,
    IntCompare::GtS,
    IntCompare::GtU,
    IntCompare::LeS,
    IntCompare::LeU,
    IntCompare::GeS,
    IntCompare::GeU,
];

const FLOAT_COMPARE: [FloatCompare; 6] = [
    FloatCompare::Eq,
    FloatCompare::Ne,
    FloatCompare::Lt,
    FloatCompare::Gt,
    FloatCompare::Le,
    FloatCompare::Ge,
];

const INT_UNARY: [IntUnary; 3] = [IntUnary::Clz, IntUnary::Ctz, IntUnary::Popcnt];

const INT_BINARY: [IntBinary; 15] = [
    IntBinary::Add,
    IntBinary::Sub,
    IntBinary::Mul,
    IntBinary::DivS,
    IntBinary::DivU,
    IntBinary::RemS,
    IntBinary::RemU,
    IntBinary::And,
    IntBinary::Or,
    IntBinary::Xor,
    IntBinary::Shl,
    IntBinary::ShrS,
    IntBinary::ShrU,
    IntBinary::Rotl,
    IntBinary::Rotr,
];

const FLOAT_UNARY: [FloatUnary; 7] = [
    FloatUnary::Abs,
    FloatUnary::Neg,
    FloatUnary::Ceil,
    FloatUnary::Floor,
    FloatUnary::Trunc,
    FloatUnary::Nearest,
    FloatUnary::Sqrt,
];

const FLOAT_BINARY: [FloatBinary; 7] = [
    FloatBinary::Add,
    FloatBinary::Sub,
    FloatBinary::Mul,
    FloatBinary::Div,
    FloatBinary::Min,
    FloatBinary::Max,
    FloatBinary::Copysign,
];

// opcodes 0xa7..=0xbf, then the 0xfc 0..=7 saturating truncations
const CONVERSIONS: [Conversion; 33] = [
    Conversion::I32WrapI64,
    Conversion::I32TruncF32S,
    Conversion::I32TruncF32U,
    Conversion::I32TruncF64S,
    Conversion::I32TruncF64U,
    Conversion::I64ExtendI32S,
    Conversion::I64ExtendI32U,
    Conversion::I64TruncF32S,
    Conversion::I64TruncF32U,
    Conversion::I64TruncF64S,
    Conversion::I64TruncF64U,
    Conversion::F32ConvertI32S,
    Conversion::F32ConvertI32U,
    Conversion::F32ConvertI64S,
    Conversion::F32ConvertI64U,
    Conversion::F32DemoteF64,
    Conversion::F64ConvertI32S,
    Conversion::F64ConvertI32U,
    Conversion::F64ConvertI64S,
    Conversion::F64ConvertI64U,
    Conversion::F64PromoteF32,
    Conversion::I32ReinterpretF32,
    Conversion::I64ReinterpretF64,
    Conversion::F32ReinterpretI32,
    Conversion::F64ReinterpretI64,
    Conversion::I32TruncSatF32S,
    Conversion::I32TruncSatF32U,
    Conversion::I32TruncSatF64S,
    Conversion::I32TruncSatF64U,
    Conversion::I64TruncSatF32S,
    Conversion::I64TruncSatF32U,
    Conversion::I64TruncSatF64S,
    Conversion::I64TruncSatF64U,
];

const LOADS: [Load; 14] = [
    Load::I32,
    Load::I64,
    Load::F32,
    Load::F64,
    Load::I32S8,
    Load::I32U8,
    Load::I32S16,
    Load::I32U16,
    Load::I64S8,
    Load::I64U8,
    Load::I64S16,
    Load::I64U16,
    Load::I64S32,
    Load::I64U32,
];

const STORES: [Store; 9] = [
    Store::I32,
    Store::I64,
    Store::F32,
    Store::F64,
    Store::I32As8,
    Store::I32As16,
    Store::I64As8,
    Store::I64As16,
    Store::I64As32,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

impl<'a> Decode<'a> for MemArg {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(Self {
            align: bytes.decode()?,
            offset: bytes.decode()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValueType),
    Index(u32),
}

impl<'a> Decode<'a> for BlockType {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        let byte: u8 = bytes.peek()?;
        if byte == 0x40 {
            bytes.next::<u8>()?;
            return Ok(Self::Empty);
        }
        if let Some(ty) = <ValueType as super::decode::DecodeTag>::decode_tag(byte) {
            bytes.next::<u8>()?;
            return Ok(Self::Value(ty));
        }
        let index = bytes.decode::<VarS<33>>()?.0;
        u32::try_from(index)
            .map(Self::Index)
            .map_err(|_| DecodeError::InvalidByte(byte))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // control
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable { labels: Vec<u32>, default: u32 },
    Return,
    Call(u32),
    CallIndirect { ty: u32, table: u32 },

    // reference
    RefNull(Reference),
    RefIsNull,
    RefFunc(u32),

    // parametric
    Drop,
    Select(Option<ValueType>),

    // variable
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // table
    TableGet(u32),
    TableSet(u32),

    // memory
    Load(Load, MemArg),
    Store(Store, MemArg),
    MemorySize,
    MemoryGrow,
    MemoryCopy,
    MemoryFill,

    // numeric
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    IntEqz(Width),
    IntCompare(Width, IntCompare),
    IntUnary(Width, IntUnary),
    IntBinary(Width, IntBinary),
    FloatCompare(Width, FloatCompare),
    FloatUnary(Width, FloatUnary),
    FloatBinary(Width, FloatBinary),
    Convert(Conversion),
}

impl Instruction {
    /// Opens a structured block that a later `end` closes.
    pub fn opens_block(&self) -> bool {
        matches!(self, Self::Block(_) | Self::Loop(_) | Self::If(_))
    }
}

impl<'a> Decode<'a> for Instruction {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        use Instruction::*;
        use Width::*;
        Ok(match bytes.next::<u8>()? {
            0x00 => Unreachable,
            0x01 => Nop,
            0x02 => Block(bytes.decode()?),
            0x03 => Loop(bytes.decode()?),
            0x04 => If(bytes.decode()?),
            0x05 => Else,
            0x0b => End,
            0x0c => Br(bytes.decode()?),
            0x0d => BrIf(bytes.decode()?),
            0x0e => BrTable {
                labels: bytes.decode()?,
                default: bytes.decode()?,
            },
            0x0f => Return,
            0x10 => Call(bytes.decode()?),
            0x11 => CallIndirect {
                ty: bytes.decode()?,
                table: bytes.decode()?,
            },

            0x1a => Drop,
            0x1b => Select(None),
            0x1c => {
                let types: Vec<ValueType> = bytes.decode()?;
                match types.as_slice() {
                    [ty] => Select(Some(*ty)),
                    _ => return Err(DecodeError::InvalidByte(0x1c)),
                }
            }

            0x20 => LocalGet(bytes.decode()?),
            0x21 => LocalSet(bytes.decode()?),
            0x22 => LocalTee(bytes.decode()?),
            0x23 => GlobalGet(bytes.decode()?),
            0x24 => GlobalSet(bytes.decode()?),
            0x25 => TableGet(bytes.decode()?),
            0x26 => TableSet(bytes.decode()?),

            op @ 0x28..=0x35 => Load(LOADS[usize::from(op - 0x28)], bytes.decode()?),
            op @ 0x36..=0x3e => Store(STORES[usize::from(op - 0x36)], bytes.decode()?),
            0x3f => {
                bytes.consume_constant(&[0x00])?;
                MemorySize
            }
            0x40 => {
                bytes.consume_constant(&[0x00])?;
                MemoryGrow
            }

            0x41 => I32Const(bytes.decode::<VarS<32>>()?.0 as i32),
            0x42 => I64Const(bytes.decode::<VarS<64>>()?.0),
            0x43 => F32Const(bytes.next()?),
            0x44 => F64Const(bytes.next()?),

            0x45 => IntEqz(W32),
            op @ 0x46..=0x4f => IntCompare(W32, INT_COMPARE[usize::from(op - 0x46)]),
            0x50 => IntEqz(W64),
            op @ 0x51..=0x5a => IntCompare(W64, INT_COMPARE[usize::from(op - 0x51)]),
            op @ 0x5b..=0x60 => FloatCompare(W32, FLOAT_COMPARE[usize::from(op - 0x5b)]),
            op @ 0x61..=0x66 => FloatCompare(W64, FLOAT_COMPARE[usize::from(op - 0x61)]),

            op @ 0x67..=0x69 => IntUnary(W32, INT_UNARY[usize::from(op - 0x67)]),
            op @ 0x6a..=0x78 => IntBinary(W32, INT_BINARY[usize::from(op - 0x6a)]),
            op @ 0x79..=0x7b => IntUnary(W64, INT_UNARY[usize::from(op - 0x79)]),
            op @ 0x7c..=0x8a => IntBinary(W64, INT_BINARY[usize::from(op - 0x7c)]),

            op @ 0x8b..=0x91 => FloatUnary(W32, FLOAT_UNARY[usize::from(op - 0x8b)]),
            op @ 0x92..=0x98 => FloatBinary(W32, FLOAT_BINARY[usize::from(op - 0x92)]),
            op @ 0x99..=0x9f => FloatUnary(W64, FLOAT_UNARY[usize::from(op - 0x99)]),
            op @ 0xa0..=0xa6 => FloatBinary(W64, FLOAT_BINARY[usize::from(op - 0xa0)]),

            op @ 0xa7..=0xbf => Convert(CONVERSIONS[usize::from(op - 0xa7)]),

            0xc0 => IntUnary(W32, self::IntUnary::Extend8S),
            0xc1 => IntUnary(W32, self::IntUnary::Extend16S),
            0xc2 => IntUnary(W64, self::IntUnary::Extend8S),
            0xc3 => IntUnary(W64, self::IntUnary::Extend16S),
            0xc4 => IntUnary(W64, self::IntUnary::Extend32S),

            0xd0 => RefNull(bytes.decode()?),
            0xd1 => RefIsNull,
            0xd2 => RefFunc(bytes.decode()?),

            0xfc => match bytes.decode::<u32>()? {
                sub @ 0..=7 => Convert(CONVERSIONS[25 + sub as usize]),
                10 => {
                    bytes.consume_constant(&[0x00, 0x00])?;
                    MemoryCopy
                }
                11 => {
                    bytes.consume_constant(&[0x00])?;
                    MemoryFill
                }
                _ => return Err(DecodeError::InvalidByte(0xfc)),
            },

            byte => return Err(DecodeError::InvalidByte(byte)),
        })
    }
}

/// Walks an instruction stream up to the `end` that closes the outermost
/// block and returns the bytes before it. The closing `end` is consumed but
/// not included.
pub fn read_expression<'a>(bytes: &mut ByteReader<'a>) -> Result<&'a [u8]> {
    let start = bytes.remaining();
    let start_offset = bytes.position();
    let mut depth = 0usize;
    loop {
        let end_offset = bytes.position();
        let instr: Instruction = bytes.decode()?;
        if instr.opens_block() {
            depth += 1;
        } else if matches!(instr, Instruction::End) {
            if depth == 0 {
                return Ok(&start[..end_offset - start_offset]);
            }
            depth -= 1;
        }
    }
}
