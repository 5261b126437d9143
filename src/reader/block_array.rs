use thiserror::Error;

/// Default number of items per block.
pub const DEFAULT_BLOCK_CAPACITY: usize = 32 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid line index {index} (count {count})")]
    InvalidIndex { index: usize, count: usize },
}

/// Append-only array split into fixed-capacity blocks.
///
/// Growing never moves existing items: a full block stays where it is and a
/// new block is allocated for the next item. Item `i` lives in block
/// `i / capacity` at slot `i % capacity`.
#[derive(Debug)]
pub struct BlockArray<T> {
    blocks: Vec<Vec<T>>,
    capacity: usize,
    len: usize,
}

impl<T> Default for BlockArray<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_CAPACITY)
    }
}

impl<T> BlockArray<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: Vec::new(),
            capacity: capacity.max(1),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Append an item, allocating a new block when the last one is full.
    pub fn push(&mut self, item: T) {
        if self.len == self.blocks.len() * self.capacity {
            self.blocks.push(Vec::with_capacity(self.capacity));
        }
        let block = self.len / self.capacity;
        self.blocks[block].push(item);
        self.len += 1;
    }

    pub fn get(&self, index: usize) -> Result<&T, StoreError> {
        if index >= self.len {
            return Err(self.invalid(index));
        }
        Ok(&self.blocks[index / self.capacity][index % self.capacity])
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, StoreError> {
        if index >= self.len {
            return Err(self.invalid(index));
        }
        let capacity = self.capacity;
        Ok(&mut self.blocks[index / capacity][index % capacity])
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.blocks.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.blocks.iter_mut().flatten()
    }

    fn invalid(&self, index: usize) -> StoreError {
        StoreError::InvalidIndex {
            index,
            count: self.len,
        }
    }
}
