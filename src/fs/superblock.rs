use serde::{Deserialize, Serialize};

use crate::error::{FsError, Result};
use crate::utils::fs_size_calculator;

use super::{CLUSTER_SIZE, SUPERBLOCK_SIZE};

/// The superblock of this filesystem
///
/// Every field is a 4-byte integer on disk; the cluster size is a constant
/// and is not stored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    cluster_num: i32,
    /// live counter, kept equal to the number of free allocation table entries
    free_cluster_num: i32,
    inode_map_offset: i32,
    inode_array_offset: i32,
    first_cluster_offset: i32,
}

impl SuperBlock {
    /// lay out a volume with room for `total_size / CLUSTER_SIZE` clusters
    ///
    /// `first_cluster_offset` and `free_cluster_num` stay zero until
    /// [SuperBlock::seal_layout] runs after the inode table is written.
    /// Fails with [FsError::VolumeTooLarge] when the cluster region would
    /// start beyond what a 4-byte offset can address.
    pub fn default(total_size: u64) -> Result<Self> {
        let cluster_num = fs_size_calculator::cluster_count(total_size);
        // every other offset lies below the start of the cluster region
        if fs_size_calculator::first_cluster_offset(cluster_num) > i32::MAX as usize {
            return Err(FsError::VolumeTooLarge {
                clusters: cluster_num,
            });
        }
        Ok(SuperBlock {
            cluster_num: cluster_num as i32,
            free_cluster_num: 0,
            inode_map_offset: fs_size_calculator::inode_map_offset(cluster_num) as i32,
            inode_array_offset: fs_size_calculator::inode_array_offset(cluster_num) as i32,
            first_cluster_offset: 0,
        })
    }

    /// fix the start of the cluster region; every allocation table entry starts free
    pub(crate) fn seal_layout(&mut self, first_cluster_offset: usize) {
        self.first_cluster_offset = first_cluster_offset as i32;
        self.free_cluster_num = self.cluster_num;
    }

    pub fn read(image: &[u8]) -> Result<Self> {
        let header = image
            .get(..SUPERBLOCK_SIZE)
            .ok_or_else(|| FsError::Corrupted("image shorter than a superblock".into()))?;
        let (superblock, _) = bincode::serde::decode_from_slice(header, bincode::config::legacy())?;
        Ok(superblock)
    }

    pub fn write(&self, image: &mut [u8]) -> Result<()> {
        let header = image
            .get_mut(..SUPERBLOCK_SIZE)
            .ok_or_else(|| FsError::Corrupted("image shorter than a superblock".into()))?;
        bincode::serde::encode_into_slice(self, header, bincode::config::legacy())?;
        Ok(())
    }

    /// check that the stored offsets describe the layout this crate writes
    /// and that the backing image is long enough to hold every cluster
    pub fn validate(&self, image_len: u64) -> Result<()> {
        let cluster_num = self.cluster_num();
        let consistent = self.cluster_num > 0
            && self.free_cluster_num >= 0
            && self.free_cluster_num < self.cluster_num
            && self.inode_map_offset() == fs_size_calculator::inode_map_offset(cluster_num)
            && self.inode_array_offset() == fs_size_calculator::inode_array_offset(cluster_num)
            && self.first_cluster_offset() == fs_size_calculator::first_cluster_offset(cluster_num);
        if !consistent {
            return Err(FsError::Corrupted(format!("inconsistent superblock {self:?}")));
        }
        let needed = fs_size_calculator::image_size(cluster_num);
        if image_len < needed {
            return Err(FsError::Corrupted(format!(
                "image is {image_len} bytes, layout needs {needed}"
            )));
        }
        Ok(())
    }
}

/// free cluster counter, driven by the allocation table only
impl SuperBlock {
    pub(crate) fn increment(&mut self) {
        self.free_cluster_num += 1;
    }

    pub(crate) fn decrement(&mut self) {
        self.free_cluster_num -= 1;
    }
}

/// geometry accessors
impl SuperBlock {
    #[inline]
    pub fn cluster_num(&self) -> usize {
        self.cluster_num as usize
    }

    #[inline]
    pub fn free_cluster_num(&self) -> usize {
        self.free_cluster_num as usize
    }

    #[inline]
    pub const fn fat_offset(&self) -> usize {
        SUPERBLOCK_SIZE
    }

    #[inline]
    pub fn inode_map_offset(&self) -> usize {
        self.inode_map_offset as usize
    }

    #[inline]
    pub fn inode_array_offset(&self) -> usize {
        self.inode_array_offset as usize
    }

    #[inline]
    pub fn first_cluster_offset(&self) -> usize {
        self.first_cluster_offset as usize
    }

    #[inline]
    pub fn cluster_position(&self, cluster: i32) -> usize {
        self.first_cluster_offset() + cluster as usize * CLUSTER_SIZE
    }
}
