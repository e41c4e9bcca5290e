//! This module contains functions to calculate the offsets of different fs regions
//!
//! The regions are laid out back to back:
//! superblock, allocation table, inode map, inode table, and finally the
//! cluster-aligned cluster region.

use crate::fs::{CLUSTER_SIZE, INODE_SIZE, SUPERBLOCK_SIZE};

/// calculate how many clusters a volume of `size` bytes holds
/// # Example
/// ```
/// use clusterfs::utils::fs_size_calculator::cluster_count;
/// assert_eq!(cluster_count(4096 * 10 + 100), 10);
/// ```
pub const fn cluster_count(size: u64) -> usize {
    (size / CLUSTER_SIZE as u64) as usize
}

/// calculate where the inode map starts
/// # Arguments
/// - `cluster_num`: the number of clusters
/// # Example
/// ```
/// use clusterfs::utils::fs_size_calculator::inode_map_offset;
/// assert_eq!(inode_map_offset(16), 20 + 16 * 4);
/// ```
pub const fn inode_map_offset(cluster_num: usize) -> usize {
    SUPERBLOCK_SIZE + cluster_num * std::mem::size_of::<i32>()
}

/// calculate where the inode table starts, right after one byte per inode slot
/// # Example
/// ```
/// use clusterfs::utils::fs_size_calculator::inode_array_offset;
/// assert_eq!(inode_array_offset(16), 20 + 16 * 4 + 16);
/// ```
pub const fn inode_array_offset(cluster_num: usize) -> usize {
    inode_map_offset(cluster_num) + cluster_num
}

/// calculate where the inode table ends
pub const fn inode_table_end(cluster_num: usize) -> usize {
    inode_array_offset(cluster_num) + cluster_num * INODE_SIZE
}

/// round the end of the inode table up to the next cluster boundary
/// # Example
/// ```
/// use clusterfs::utils::fs_size_calculator::first_cluster_offset;
/// assert_eq!(first_cluster_offset(16), 4096);
/// // 20 + 33 * 1024 = 33812 bytes of metadata
/// assert_eq!(first_cluster_offset(1024), 4096 * 9);
/// ```
pub const fn first_cluster_offset(cluster_num: usize) -> usize {
    inode_table_end(cluster_num).div_ceil(CLUSTER_SIZE) * CLUSTER_SIZE
}

/// calculate the length of the backing file, so that every cluster is backed
/// # Example
/// ```
/// use clusterfs::utils::fs_size_calculator::image_size;
/// assert_eq!(image_size(16), 4096 + 16 * 4096);
/// ```
pub const fn image_size(cluster_num: usize) -> u64 {
    (first_cluster_offset(cluster_num) + cluster_num * CLUSTER_SIZE) as u64
}
