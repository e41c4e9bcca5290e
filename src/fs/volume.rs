//! the memory-mapped backing file together with the metadata that is
//! buffered in memory for the whole mount
use log::{debug, trace};
use memmap2::MmapMut;
use std::{fs::OpenOptions, path::Path};

use crate::error::{FsError, Result};
use crate::utils::fs_size_calculator;

use super::{
    AllocationTable, Inode, InodeMap, SuperBlock, CLUSTER_SIZE, END_OF_CHAIN, FREE_CLUSTER,
    MIN_CLUSTERS,
};

#[derive(Debug)]
pub(crate) struct Volume {
    /// image file mapping, written through for clusters and inodes
    image: MmapMut,
    pub(crate) superblock: SuperBlock,
    pub(crate) fat: AllocationTable,
    pub(crate) inode_map: InodeMap,
}

impl Volume {
    /// create a new image file at `image_path` and lay out empty metadata in it
    ///
    /// Nothing but the inode table is on disk until [Volume::flush].
    pub(crate) fn format<P>(image_path: P, total_size: u64) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let mut superblock = SuperBlock::default(total_size)?;
        let cluster_num = superblock.cluster_num();
        if cluster_num < MIN_CLUSTERS {
            return Err(FsError::VolumeTooSmall {
                clusters: cluster_num,
            });
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(image_path.as_ref())?;
        // all other regions are set to zero by `set_len`
        file.set_len(fs_size_calculator::image_size(cluster_num))?;

        // Safety
        // the mapping is private to this mount; concurrent mounts of one
        // image are not supported
        let mut image = unsafe { MmapMut::map_mut(&file)? };
        for id in 0..cluster_num as i32 {
            Inode::empty(id).write_at(&mut image, superblock.inode_array_offset())?;
        }
        superblock.seal_layout(fs_size_calculator::first_cluster_offset(cluster_num));
        debug!(
            "formatted {:?}: {} clusters, cluster region at {}",
            image_path.as_ref(),
            cluster_num,
            superblock.first_cluster_offset()
        );

        Ok(Volume {
            image,
            fat: AllocationTable::empty(cluster_num),
            inode_map: InodeMap::empty(cluster_num),
            superblock,
        })
    }

    /// map an existing image and load the buffered metadata from it
    pub(crate) fn open<P>(image_path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        // open the "device" for read and write
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(image_path.as_ref())?;
        let image_len = file.metadata()?.len();
        let image = unsafe { MmapMut::map_mut(&file)? };

        let superblock = SuperBlock::read(&image)?;
        superblock.validate(image_len)?;
        let fat = AllocationTable::read(&image, superblock.fat_offset(), superblock.cluster_num())?;
        let inode_map = InodeMap::read(
            &image,
            superblock.inode_map_offset(),
            superblock.cluster_num(),
        )?;
        if fat.count_free() != superblock.free_cluster_num() {
            return Err(FsError::Corrupted(format!(
                "superblock counts {} free clusters, allocation table has {}",
                superblock.free_cluster_num(),
                fat.count_free()
            )));
        }
        Ok(Volume {
            image,
            superblock,
            fat,
            inode_map,
        })
    }

    /// write superblock, allocation table and inode map back and sync the mapping
    pub(crate) fn flush(&mut self) -> Result<()> {
        self.superblock.write(&mut self.image)?;
        self.fat.write(&mut self.image, self.superblock.fat_offset())?;
        self.inode_map
            .write(&mut self.image, self.superblock.inode_map_offset())?;
        Ok(self.image.flush()?)
    }
}

/// [Inode] records are written through immediately
impl Volume {
    pub(crate) fn read_inode(&self, id: i32) -> Result<Inode> {
        self.check_inode(id)?;
        Inode::read_at(&self.image, self.superblock.inode_array_offset(), id)
    }

    pub(crate) fn write_inode(&mut self, inode: &Inode) -> Result<()> {
        self.check_inode(inode.id)?;
        inode.write_at(&mut self.image, self.superblock.inode_array_offset())
    }

    fn check_inode(&self, id: i32) -> Result<()> {
        if id < 0 || id as usize >= self.superblock.cluster_num() {
            return Err(FsError::Corrupted(format!("inode id {id} out of range")));
        }
        Ok(())
    }
}

/// cluster data access
impl Volume {
    pub(crate) fn cluster(&self, cluster: i32) -> Result<&[u8]> {
        let range = self.cluster_range(cluster)?;
        Ok(&self.image[range])
    }

    pub(crate) fn cluster_mut(&mut self, cluster: i32) -> Result<&mut [u8]> {
        let range = self.cluster_range(cluster)?;
        Ok(&mut self.image[range])
    }

    /// write `data` at `offset` inside one cluster
    pub(crate) fn write_cluster(&mut self, cluster: i32, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset + data.len();
        if end > CLUSTER_SIZE {
            return Err(FsError::Corrupted(format!(
                "write of {} bytes at {offset} overruns cluster {cluster}",
                data.len()
            )));
        }
        self.cluster_mut(cluster)?[offset..end].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn zero_cluster(&mut self, cluster: i32) -> Result<()> {
        self.cluster_mut(cluster)?.fill(0);
        Ok(())
    }

    fn cluster_range(&self, cluster: i32) -> Result<std::ops::Range<usize>> {
        if cluster < 0 || cluster as usize >= self.superblock.cluster_num() {
            return Err(FsError::Corrupted(format!("cluster {cluster} out of range")));
        }
        let start = self.superblock.cluster_position(cluster);
        Ok(start..start + CLUSTER_SIZE)
    }
}

/// chain allocation, every change going through [AllocationTable::set]
impl Volume {
    /// claim the lowest free cluster as a one-cluster chain
    pub(crate) fn allocate_cluster(&mut self) -> Result<i32> {
        let cluster = self.fat.get_free_cluster()?;
        self.fat.set(&mut self.superblock, cluster, END_OF_CHAIN);
        trace!(
            "allocated cluster {cluster}, {} free",
            self.superblock.free_cluster_num()
        );
        Ok(cluster)
    }

    /// claim a cluster and link it after `tail`
    pub(crate) fn extend_chain(&mut self, tail: i32) -> Result<i32> {
        let cluster = self.allocate_cluster()?;
        self.fat.set(&mut self.superblock, tail, cluster);
        Ok(cluster)
    }

    pub(crate) fn chain(&self, first: i32) -> Result<Vec<i32>> {
        self.fat.get_clusters_chain(first)
    }

    /// a directory bucket chain; bucket heads are written through, so the
    /// chain may end in a cluster a stale allocation table still calls free
    pub(crate) fn bucket_chain(&self, head: i32) -> Result<Vec<i32>> {
        self.fat.get_clusters_chain_until_free(head)
    }

    /// keep the first `keep` clusters of `chain` and free the rest
    pub(crate) fn truncate_chain(&mut self, chain: &[i32], keep: usize) {
        if keep == 0 || keep >= chain.len() {
            return;
        }
        self.fat
            .set(&mut self.superblock, chain[keep - 1], END_OF_CHAIN);
        for cluster in &chain[keep..] {
            self.fat.set(&mut self.superblock, *cluster, FREE_CLUSTER);
        }
        trace!(
            "released {} clusters, {} free",
            chain.len() - keep,
            self.superblock.free_cluster_num()
        );
    }

    pub(crate) fn release_chain(&mut self, first: i32) -> Result<()> {
        for cluster in self.chain(first)? {
            self.fat.set(&mut self.superblock, cluster, FREE_CLUSTER);
        }
        trace!(
            "released chain from {first}, {} free",
            self.superblock.free_cluster_num()
        );
        Ok(())
    }
}
