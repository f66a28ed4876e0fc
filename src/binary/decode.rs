use super::value::VarU;
use crate::error::DecodeError;

pub type Result<T> = std::result::Result<T, DecodeError>;

pub trait Decode<'a>: Sized {
    type Tag: Decode<'a>;

    fn decode(bytes: &mut ByteReader<'a>, tag: Self::Tag) -> Result<Self>;
}

pub trait DecodeTag: Sized {
    fn decode_tag(byte: u8) -> Option<Self>;
}

impl<'a, T: DecodeTag> Decode<'a> for T {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        let byte: u8 = bytes.next()?;
        Self::decode_tag(byte).ok_or(DecodeError::InvalidByte(byte))
    }
}

impl<'a> Decode<'a> for () {
    type Tag = ();

    fn decode(_bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        Ok(())
    }
}

impl<'a> Decode<'a> for u8 {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        bytes.next()
    }
}

impl<'a, D: Decode<'a>> Decode<'a> for Vec<D>
where
    D::Tag: Decode<'a, Tag = ()>,
{
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        bytes.next_vector()
    }
}

impl<'a> Decode<'a> for u32 {
    type Tag = ();

    fn decode(bytes: &mut ByteReader<'a>, _: Self::Tag) -> Result<Self> {
        match bytes.encoding {
            IntEncoding::Leb128 => bytes.decode::<VarU<32>>().map(|v| v.0 as u32),
            IntEncoding::FixedWidth => bytes.next(),
        }
    }
}

/// How count, index and size fields are laid out on the wire.
///
/// Real modules use [`IntEncoding::Leb128`]. [`IntEncoding::FixedWidth`] reads
/// them as plain little-endian `u32`s, which some hand-built buffers use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IntEncoding {
    #[default]
    Leb128,
    FixedWidth,
}

/// A fixed-width value that can be read straight off the wire.
///
/// The wire format is little-endian; `from_le` produces the numerically
/// correct value on any host, floats included.
pub trait Scalar: Sized + Copy {
    const WIDTH: usize;

    fn from_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn from_le(bytes: &[u8]) -> Self {
                    let mut buf = [0; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Scalar for [u8; 16] {
    const WIDTH: usize = 16;

    fn from_le(bytes: &[u8]) -> Self {
        let mut buf = [0; 16];
        buf.copy_from_slice(bytes);
        buf
    }
}

/// Positional read-only view over an immutable byte buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    encoding: IntEncoding,
}

impl<'a> From<&'a [u8]> for ByteReader<'a> {
    fn from(value: &'a [u8]) -> Self {
        Self::new(value)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for ByteReader<'a> {
    fn from(value: &'a [u8; N]) -> Self {
        Self::new(value)
    }
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_encoding(bytes, IntEncoding::default())
    }

    pub fn with_encoding(bytes: &'a [u8], encoding: IntEncoding) -> Self {
        Self {
            bytes,
            offset: 0,
            encoding,
        }
    }

    pub fn encoding(&self) -> IntEncoding {
        self.encoding
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }

    /// True iff every byte of the buffer has been consumed.
    pub fn done(&self) -> bool {
        self.offset == self.bytes.len()
    }

    pub fn peek<T: Scalar>(&self) -> Result<T> {
        let end = self
            .offset
            .checked_add(T::WIDTH)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::AbruptStop)?;
        Ok(T::from_le(&self.bytes[self.offset..end]))
    }

    pub fn next<T: Scalar>(&mut self) -> Result<T> {
        let value = self.peek()?;
        self.offset += T::WIDTH;
        Ok(value)
    }

    pub fn next_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::AbruptStop)?;
        let bytes = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    /// Everything left in the buffer, consuming it.
    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = self.remaining();
        self.offset = self.bytes.len();
        bytes
    }

    /// Reads a `u32` length prefix, then that many elements. Any element
    /// failure aborts the whole vector.
    pub fn next_vector<D: Decode<'a>>(&mut self) -> Result<Vec<D>>
    where
        D::Tag: Decode<'a, Tag = ()>,
    {
        let len: u32 = self.decode()?;
        // every element takes at least one byte
        let hint = (len as usize).min(self.remaining().len());
        let mut vec = Vec::new();
        vec.try_reserve(hint).map_err(|_| DecodeError::OutOfMemory)?;
        for _ in 0..len {
            vec.push(self.decode()?);
        }
        Ok(vec)
    }

    pub fn next_name(&mut self) -> Result<&'a str> {
        let len: u32 = self.decode()?;
        let bytes = self.next_bytes(len as usize)?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::MalformedName)
    }

    /// Reads a `u32` byte length and returns a reader over exactly that many
    /// bytes. The outer reader moves past the whole region.
    pub fn next_buffer(&mut self) -> Result<ByteReader<'a>> {
        let len: u32 = self.decode()?;
        let bytes = self.next_bytes(len as usize)?;
        Ok(ByteReader::with_encoding(bytes, self.encoding))
    }

    pub fn decode<D: Decode<'a>>(&mut self) -> Result<D>
    where
        D::Tag: Decode<'a, Tag = ()>,
    {
        let tag = self.decode_with_tag(())?;
        self.decode_with_tag(tag)
    }

    pub fn decode_with_tag<D: Decode<'a>>(&mut self, tag: D::Tag) -> Result<D> {
        let start_offset = self.offset;
        D::decode(self, tag).inspect_err(|err| {
            log::trace!(
                "failed to decode `{}` at byte offset 0x{:0>8X}: {err}",
                std::any::type_name::<D>(),
                start_offset,
            );
        })
    }

    pub fn consume_constant(&mut self, expecteds: &[u8]) -> Result<()> {
        let actuals = self.next_bytes(expecteds.len())?;
        match expecteds.iter().zip(actuals).find(|(e, a)| e != a) {
            Some((_, actual)) => Err(DecodeError::InvalidByte(*actual)),
            None => Ok(()),
        }
    }
}
