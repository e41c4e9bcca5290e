//! what does our filesystem look like in the memory
use log::{info, warn};
use std::path::Path;

use crate::error::{FsError, Result};
use crate::utils::digest::Argon2PasswordHasher;

use super::{AllocationTable, Directory, Inode, PasswordHasher, SuperBlock, Volume};

/// a mounted volume
///
/// Mounting loads the superblock, the allocation table and the inode map
/// into memory and rebuilds the directory cache. Directory slots and inode
/// records are written through on every operation; the other three
/// structures reach the disk only in [ClusterFs::unmount] (or when a
/// still-mounted instance is dropped).
///
/// The mount assumes exclusive access to the image file: mounting the same
/// image twice at once, from one process or several, is not supported.
/// Sharing one mount between threads needs one lock around the whole
/// [ClusterFs].
pub struct ClusterFs {
    pub(super) volume: Volume,
    pub(super) directory: Directory,
    pub(super) hasher: Box<dyn PasswordHasher>,
    /// cleared once the buffered metadata has been flushed by `unmount`
    mounted: bool,
}

impl ClusterFs {
    /// mount an image created by [mkfs](crate::mkfs::mkfs)
    /// # Params
    /// - `image_path`: the path of the image file
    /// # Return
    /// a [Result] which contains a [ClusterFs] instance if the operation is successful
    pub fn mount<P>(image_path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        ClusterFs::mount_with_hasher(image_path, Argon2PasswordHasher)
    }

    /// mount with a custom password digest for the user registry
    pub fn mount_with_hasher<P, H>(image_path: P, hasher: H) -> Result<Self>
    where
        P: AsRef<Path>,
        H: PasswordHasher + 'static,
    {
        info!("mount() called with image: {:?}", image_path.as_ref());
        let volume = Volume::open(image_path)?;
        let directory = Directory::open(&volume)?;
        Ok(ClusterFs {
            volume,
            directory,
            hasher: Box::new(hasher),
            mounted: true,
        })
    }

    /// write superblock, allocation table and inode map back to the image
    pub fn unmount(mut self) -> Result<()> {
        info!(
            "unmount() called, {} of {} clusters free",
            self.free_cluster_num(),
            self.cluster_num()
        );
        self.volume.flush()?;
        self.mounted = false;
        Ok(())
    }
}

impl Drop for ClusterFs {
    fn drop(&mut self) {
        if self.mounted {
            if let Err(e) = self.volume.flush() {
                warn!("flushing volume metadata on drop failed: {e}");
            }
        }
    }
}

/// get [SuperBlock], [AllocationTable] and [Directory] state of this filesystem
impl ClusterFs {
    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.volume.superblock
    }

    #[inline]
    pub fn allocation_table(&self) -> &AllocationTable {
        &self.volume.fat
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    #[inline]
    pub fn free_cluster_num(&self) -> usize {
        self.volume.superblock.free_cluster_num()
    }

    #[inline]
    pub fn cluster_num(&self) -> usize {
        self.volume.superblock.cluster_num()
    }

    /// the directory's own inode, whose size counts the clusters it holds
    pub fn directory_inode(&self) -> Result<Inode> {
        self.volume.read_inode(super::DIRECTORY_INODE)
    }

    /// metadata of one file, from the directory cache
    pub fn stat(&self, name: &str) -> Result<Inode> {
        self.directory.get(name).copied().ok_or(FsError::FileNotFound)
    }

    /// every file with its inode, sorted by name
    pub fn list(&self) -> Vec<(String, Inode)> {
        let mut files: Vec<_> = self
            .directory
            .entries()
            .map(|(name, inode)| (name.clone(), *inode))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        files
    }

    /// the clusters holding the data of `name`, in file order
    pub fn clusters_chain(&self, name: &str) -> Result<Vec<i32>> {
        let inode = self.stat(name)?;
        self.volume.chain(inode.first_cluster)
    }
}
