use crate::error::Trap;

/// A stack whose storage is allocated once, up front. Growing past the
/// capacity is a trap, never a reallocation.
#[derive(Debug)]
pub struct Stack<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> Stack<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Slots still available before the stack overflows.
    pub fn headroom(&self) -> usize {
        self.capacity - self.items.len()
    }

    pub fn push(&mut self, item: T) -> Result<(), Trap> {
        if self.items.len() == self.capacity {
            return Err(Trap::StackOverflow);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, Trap> {
        self.items.pop().ok_or(Trap::StackUnderflow)
    }

    pub fn last(&self) -> Result<&T, Trap> {
        self.items.last().ok_or(Trap::StackUnderflow)
    }

    pub fn last_mut(&mut self) -> Result<&mut T, Trap> {
        self.items.last_mut().ok_or(Trap::StackUnderflow)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    /// Removes the top `n` items, bottom-most first.
    pub fn pop_n(&mut self, n: usize) -> Result<std::vec::Drain<'_, T>, Trap> {
        let start = self
            .items
            .len()
            .checked_sub(n)
            .ok_or(Trap::StackUnderflow)?;
        Ok(self.items.drain(start..))
    }

    /// Drops everything between `base` and the top `keep` items, so the
    /// kept items end up starting at `base`.
    pub fn unwind(&mut self, base: usize, keep: usize) -> Result<(), Trap> {
        let top = self.items.len();
        if top < base + keep {
            return Err(Trap::StackUnderflow);
        }
        self.items.drain(base..top - keep);
        Ok(())
    }

    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn overflow_and_underflow() -> anyhow::Result<()> {
        let mut stack = Stack::<u32>::with_capacity(2);
        assert_eq!(Err(Trap::StackUnderflow), stack.pop());
        stack.push(1)?;
        stack.push(2)?;
        assert_eq!(Err(Trap::StackOverflow), stack.push(3));
        assert_eq!(&[1, 2], stack.as_slice());
        assert_eq!(2, stack.pop()?);
        assert_eq!(1, stack.headroom());
        Ok(())
    }

    #[test]
    fn pop_n_keeps_order() -> anyhow::Result<()> {
        let mut stack = Stack::<u32>::with_capacity(4);
        for i in 0..4 {
            stack.push(i)?;
        }
        assert_eq!(vec![1, 2, 3], stack.pop_n(3)?.collect::<Vec<_>>());
        assert_eq!(&[0], stack.as_slice());
        assert!(stack.pop_n(2).is_err());
        assert_eq!(&[0], stack.as_slice());
        Ok(())
    }

    #[test]
    fn unwind_keeps_results() -> anyhow::Result<()> {
        let mut stack = Stack::<u32>::with_capacity(8);
        for i in 0..6 {
            stack.push(i)?;
        }
        stack.unwind(2, 1)?;
        assert_eq!(&[0, 1, 5], stack.as_slice());
        assert_eq!(Err(Trap::StackUnderflow), stack.unwind(2, 2));
        assert_eq!(&[0, 1, 5], stack.as_slice());
        Ok(())
    }

    proptest! {
        #[test]
        fn failed_operations_do_not_mutate(items in proptest::collection::vec(any::<u32>(), 0..32)) {
            let mut stack = Stack::with_capacity(items.len());
            for item in &items {
                stack.push(*item)?;
            }
            prop_assert_eq!(Err(Trap::StackOverflow), stack.push(0));
            prop_assert_eq!(stack.as_slice(), items.as_slice());

            for _ in 0..items.len() {
                stack.pop()?;
            }
            prop_assert_eq!(Err(Trap::StackUnderflow), stack.pop());
            prop_assert!(stack.is_empty());
            prop_assert_eq!(items.len(), stack.capacity());
        }
    }
}
