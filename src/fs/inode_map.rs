use bitvec::prelude::*;

use crate::error::{FsError, Result};

/// free/used map over the inode slots, one byte per slot on disk
///
/// A set bit means the slot is free. There is one slot per cluster.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InodeMap {
    slots: BitVec<u8, Lsb0>,
}

impl InodeMap {
    pub fn empty(size: usize) -> Self {
        InodeMap {
            slots: BitVec::repeat(true, size),
        }
    }

    pub fn read(image: &[u8], offset: usize, inode_num: usize) -> Result<Self> {
        let raw = image
            .get(offset..offset + inode_num)
            .ok_or_else(|| FsError::Corrupted("inode map out of bounds".into()))?;
        Ok(InodeMap {
            slots: raw.iter().map(|b| *b != 0).collect(),
        })
    }

    pub fn write(&self, image: &mut [u8], offset: usize) -> Result<()> {
        let raw = image
            .get_mut(offset..offset + self.slots.len())
            .ok_or_else(|| FsError::Corrupted("inode map out of bounds".into()))?;
        for (byte, free) in raw.iter_mut().zip(self.slots.iter()) {
            *byte = u8::from(*free);
        }
        Ok(())
    }

    /// the lowest free slot
    ///
    /// # Panics
    /// when no slot is free. Slots are provisioned one per cluster and
    /// callers claim a cluster first, so this cannot happen on a sound volume.
    pub fn get_free_inode(&self) -> i32 {
        let index = self
            .slots
            .first_one()
            .expect("inode slots are provisioned one per cluster");
        index as i32
    }

    pub fn set(&mut self, index: i32, free: bool) {
        self.slots.set(index as usize, free);
    }

    pub fn is_free(&self, index: i32) -> bool {
        self.slots.get(index as usize).as_deref() == Some(&true)
    }

    pub fn count_free(&self) -> usize {
        self.slots.count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_free_inode_is_lowest() {
        let mut map = InodeMap::empty(10);
        assert_eq!(map.get_free_inode(), 0);
        map.set(0, false);
        map.set(1, false);
        map.set(3, false);
        assert_eq!(map.get_free_inode(), 2);
        map.set(2, false);
        assert_eq!(map.get_free_inode(), 4);
        map.set(1, true);
        assert_eq!(map.get_free_inode(), 1);
        assert_eq!(map.count_free(), 7);
    }

    #[test]
    #[should_panic]
    fn test_exhausted_map_panics() {
        let mut map = InodeMap::empty(2);
        map.set(0, false);
        map.set(1, false);
        map.get_free_inode();
    }

    #[test]
    fn test_one_byte_per_slot() -> anyhow::Result<()> {
        let mut map = InodeMap::empty(5);
        map.set(1, false);
        map.set(4, false);
        let mut image = vec![7u8; 8];
        map.write(&mut image, 2)?;
        assert_eq!(image, vec![7, 7, 1, 0, 1, 1, 0, 7]);
        let restored = InodeMap::read(&image, 2, 5)?;
        assert_eq!(restored, map);
        assert!(restored.is_free(0));
        assert!(!restored.is_free(4));
        Ok(())
    }
}
