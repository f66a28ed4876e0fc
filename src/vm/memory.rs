use crate::binary::section::{Data, DataMode};
use crate::binary::ty::MemoryType;
use crate::error::{LinkError, Trap};

pub const PAGE_SIZE: usize = 65536;

/// The instance's linear memory: one growable byte buffer measured in
/// 64 KiB pages.
#[derive(Debug, Default)]
pub struct Memory {
    bytes: Vec<u8>,
    max_pages: u32,
}

impl Memory {
    /// `limit` caps growth on top of whatever maximum the module declares.
    /// A declared minimum the limit cannot hold fails instead of shrinking.
    pub fn new(ty: Option<MemoryType>, limit: u32) -> Result<Self, LinkError> {
        let (min, max) = ty.map_or((0, limit), |ty| {
            (ty.limits.min, ty.limits.max.unwrap_or(limit).min(limit))
        });
        if min > max {
            return Err(LinkError::MemoryLimit(min));
        }
        let len = (min as usize)
            .checked_mul(PAGE_SIZE)
            .ok_or(LinkError::OutOfMemory)?;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| LinkError::OutOfMemory)?;
        bytes.resize(len, 0);
        Ok(Self {
            bytes,
            max_pages: max,
        })
    }

    pub fn pages(&self) -> u32 {
        (self.bytes.len() / PAGE_SIZE) as u32
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Grows by `delta` pages, returning the previous size in pages, or
    /// `None` if the new size would exceed the maximum.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old = self.pages();
        let new = old.checked_add(delta).filter(|new| *new <= self.max_pages)?;
        self.bytes
            .try_reserve_exact((new - old) as usize * PAGE_SIZE)
            .ok()?;
        self.bytes.resize(new as usize * PAGE_SIZE, 0);
        log::debug!("memory grown from {old} to {new} pages");
        Some(old)
    }

    fn range(&self, base: u32, offset: u32, len: u64) -> Result<std::ops::Range<usize>, Trap> {
        // computed in u64 so base + offset + len cannot wrap
        let start = u64::from(base) + u64::from(offset);
        let end = start + len;
        if end > self.bytes.len() as u64 {
            return Err(Trap::MemoryOutOfBounds);
        }
        Ok(start as usize..end as usize)
    }

    pub fn load<const N: usize>(&self, base: u32, offset: u32) -> Result<[u8; N], Trap> {
        let range = self.range(base, offset, N as u64)?;
        let mut buf = [0; N];
        buf.copy_from_slice(&self.bytes[range]);
        Ok(buf)
    }

    pub fn store(&mut self, base: u32, offset: u32, value: &[u8]) -> Result<(), Trap> {
        let range = self.range(base, offset, value.len() as u64)?;
        self.bytes[range].copy_from_slice(value);
        Ok(())
    }

    pub fn fill(&mut self, dst: u32, value: u8, len: u32) -> Result<(), Trap> {
        let range = self.range(dst, 0, len.into())?;
        self.bytes[range].fill(value);
        Ok(())
    }

    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), Trap> {
        let src = self.range(src, 0, len.into())?;
        let dst = self.range(dst, 0, len.into())?;
        self.bytes.copy_within(src, dst.start);
        Ok(())
    }

    /// Copies every active segment into place.
    pub fn initialize(&mut self, data: &[Data<'_>]) -> Result<(), LinkError> {
        for (index, segment) in data.iter().enumerate() {
            let DataMode::Active { memory, offset } = segment.mode else {
                continue;
            };
            let out_of_bounds = LinkError::DataSegmentOutOfBounds(index as u32);
            // only memory 0 exists
            if memory != 0 {
                return Err(out_of_bounds);
            }
            self.store(offset, 0, segment.init)
                .map_err(|_| out_of_bounds)?;
        }
        Ok(())
    }
}
