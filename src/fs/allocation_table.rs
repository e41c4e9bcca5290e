//! the FAT-style next-pointer array over all clusters
use log::warn;

use crate::error::{FsError, Result};

use super::{SuperBlock, END_OF_CHAIN, FREE_CLUSTER};

const ENTRY_SIZE: usize = std::mem::size_of::<i32>();

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AllocationTable {
    entries: Vec<i32>,
    /// lowest free index, if any
    next_free: Option<usize>,
}

/// for serialize and deserialize
impl AllocationTable {
    pub fn empty(size: usize) -> Self {
        AllocationTable::new(vec![FREE_CLUSTER; size])
    }

    pub fn read(image: &[u8], offset: usize, cluster_num: usize) -> Result<Self> {
        let raw = image
            .get(offset..offset + cluster_num * ENTRY_SIZE)
            .ok_or_else(|| FsError::Corrupted("allocation table out of bounds".into()))?;
        let entries = raw
            .chunks_exact(ENTRY_SIZE)
            .map(|entry| i32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]))
            .collect();
        Ok(AllocationTable::new(entries))
    }

    pub fn write(&self, image: &mut [u8], offset: usize) -> Result<()> {
        let raw = image
            .get_mut(offset..offset + self.entries.len() * ENTRY_SIZE)
            .ok_or_else(|| FsError::Corrupted("allocation table out of bounds".into()))?;
        for (slot, entry) in raw.chunks_exact_mut(ENTRY_SIZE).zip(&self.entries) {
            slot.copy_from_slice(&entry.to_le_bytes());
        }
        Ok(())
    }

    fn new(entries: Vec<i32>) -> Self {
        let mut table = AllocationTable {
            entries,
            next_free: None,
        };
        table.next_free = table.first_free_from(0);
        table
    }
}

impl AllocationTable {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// the entry of `index`, `None` outside the table
    #[inline]
    pub fn get(&self, index: i32) -> Option<i32> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.entries.get(index))
            .copied()
    }

    /// update one entry, moving the superblock's free counter on every
    /// transition into or out of the free state
    ///
    /// Callers pass indices taken from the table itself or from
    /// [AllocationTable::get_free_cluster].
    pub(crate) fn set(&mut self, superblock: &mut SuperBlock, index: i32, value: i32) {
        let index = index as usize;
        let before = std::mem::replace(&mut self.entries[index], value);
        if before == FREE_CLUSTER && value != FREE_CLUSTER {
            superblock.decrement();
            if self.next_free == Some(index) {
                self.next_free = self.first_free_from(index + 1);
            }
        } else if before != FREE_CLUSTER && value == FREE_CLUSTER {
            superblock.increment();
            if self.next_free.map_or(true, |free| index < free) {
                self.next_free = Some(index);
            }
        }
    }

    /// the lowest free cluster; it stays free until [AllocationTable::set] claims it
    pub fn get_free_cluster(&self) -> Result<i32> {
        self.next_free
            .map(|index| index as i32)
            .ok_or(FsError::NoFreeClusters)
    }

    /// follow next-pointers from `first` up to the end-of-chain marker
    pub fn get_clusters_chain(&self, first: i32) -> Result<Vec<i32>> {
        match self.walk(first)? {
            (chain, None) => Ok(chain),
            (_, Some(current)) => Err(FsError::Corrupted(format!(
                "chain from {first} runs into free cluster {current}"
            ))),
        }
    }

    /// like [AllocationTable::get_clusters_chain], but a free entry ends the
    /// chain instead of failing
    ///
    /// Clusters linked since the last unmount are free in a table that was
    /// never flushed while their content is already on disk; the cluster
    /// holding the free entry is the last one returned.
    pub fn get_clusters_chain_until_free(&self, first: i32) -> Result<Vec<i32>> {
        let (chain, free) = self.walk(first)?;
        if let Some(current) = free {
            warn!("chain from {first} ends at free cluster {current}, allocation table is stale");
        }
        Ok(chain)
    }

    /// the clusters from `first` on, and the cluster whose entry was free if
    /// the walk stopped there
    fn walk(&self, first: i32) -> Result<(Vec<i32>, Option<i32>)> {
        let mut chain = Vec::new();
        let mut current = first;
        loop {
            let next = self
                .get(current)
                .ok_or_else(|| FsError::Corrupted(format!("cluster {current} out of range")))?;
            chain.push(current);
            match next {
                END_OF_CHAIN => return Ok((chain, None)),
                FREE_CLUSTER => return Ok((chain, Some(current))),
                _ if chain.len() >= self.entries.len() => {
                    return Err(FsError::Corrupted(format!("chain from {first} has a cycle")))
                }
                _ => current = next,
            }
        }
    }

    pub fn count_free(&self) -> usize {
        self.entries.iter().filter(|e| **e == FREE_CLUSTER).count()
    }

    fn first_free_from(&self, start: usize) -> Option<usize> {
        self.entries
            .iter()
            .skip(start)
            .position(|e| *e == FREE_CLUSTER)
            .map(|p| p + start)
    }
}
