//! the hashed directory: 1024 bucket heads in cluster 0, each bucket a
//! chain of clusters holding 64-byte slots, mirrored by an in-memory cache
use log::{debug, trace};
use std::collections::HashMap;

use crate::error::{FsError, Result};
use crate::utils::{digest::bucket_of, time_util};

use super::{
    Inode, Volume, BUCKET_COUNT, CLUSTER_SIZE, DIRECTORY_CLUSTER, DIRECTORY_INODE, END_OF_CHAIN,
    FREE_CLUSTER, MAX_NAME_LEN, SLOTS_PER_CLUSTER, SLOT_SIZE, SUPERUSER,
};

const HEAD_SIZE: usize = std::mem::size_of::<i32>();
const LEN_OFFSET: usize = MAX_NAME_LEN;
const ID_OFFSET: usize = MAX_NAME_LEN + 1;

/// where a slot lives: the cluster holding it and its index inside the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotPosition {
    cluster: i32,
    slot: usize,
}

impl SlotPosition {
    fn range(&self) -> std::ops::Range<usize> {
        self.slot * SLOT_SIZE..(self.slot + 1) * SLOT_SIZE
    }
}

/// split a slot record into its name bytes and inode id, `None` for a free slot
fn decode_slot(record: &[u8]) -> Option<(&[u8], i32)> {
    let len = record[LEN_OFFSET] as usize;
    if len == 0 {
        return None;
    }
    let id = i32::from_le_bytes([
        record[ID_OFFSET],
        record[ID_OFFSET + 1],
        record[ID_OFFSET + 2],
        record[ID_OFFSET + 3],
    ]);
    Some((&record[..len.min(MAX_NAME_LEN)], id))
}

fn encode_slot(name: &str, id: i32) -> [u8; SLOT_SIZE] {
    let mut record = [0u8; SLOT_SIZE];
    record[..name.len()].copy_from_slice(name.as_bytes());
    record[LEN_OFFSET] = name.len() as u8;
    record[ID_OFFSET..].copy_from_slice(&id.to_le_bytes());
    record
}

/// names are stored in 59 bytes behind a non-zero length prefix
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct Directory {
    /// write-through mirror of the slots on disk
    cache: HashMap<String, Inode>,
}

impl Directory {
    /// reserve cluster 0 and inode 0 on a freshly formatted volume and
    /// mark every bucket empty
    pub(crate) fn format(volume: &mut Volume) -> Result<()> {
        let now = time_util::now();
        let inode = Inode {
            id: DIRECTORY_INODE,
            uid: SUPERUSER,
            size: CLUSTER_SIZE as i32,
            ctime: now,
            mtime: now,
            first_cluster: DIRECTORY_CLUSTER,
            ..Inode::empty(DIRECTORY_INODE)
        };
        volume.write_inode(&inode)?;
        volume.inode_map.set(DIRECTORY_INODE, false);
        volume
            .fat
            .set(&mut volume.superblock, DIRECTORY_CLUSTER, END_OF_CHAIN);
        let heads = volume.cluster_mut(DIRECTORY_CLUSTER)?;
        for head in heads.chunks_exact_mut(HEAD_SIZE).take(BUCKET_COUNT) {
            head.copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        }
        Ok(())
    }

    /// load the directory of a mounted volume
    pub(crate) fn open(volume: &Volume) -> Result<Self> {
        let mut directory = Directory::default();
        directory.rebuild_cache(volume)?;
        Ok(directory)
    }

    /// walk every bucket chain and cache each non-empty slot with its inode
    pub(crate) fn rebuild_cache(&mut self, volume: &Volume) -> Result<()> {
        self.cache.clear();
        for bucket in 0..BUCKET_COUNT {
            let head = Self::bucket_head(volume, bucket)?;
            if head == END_OF_CHAIN {
                continue;
            }
            for cluster in volume.bucket_chain(head)? {
                let data = volume.cluster(cluster)?;
                for record in data.chunks_exact(SLOT_SIZE) {
                    let Some((name, id)) = decode_slot(record) else {
                        continue;
                    };
                    let name = String::from_utf8(name.to_vec()).map_err(|_| {
                        FsError::Corrupted(format!("slot in cluster {cluster} holds a non UTF-8 name"))
                    })?;
                    let inode = volume.read_inode(id)?;
                    self.cache.insert(name, inode);
                }
            }
        }
        debug!("directory cache rebuilt with {} entries", self.cache.len());
        Ok(())
    }
}

/// cache lookups
impl Directory {
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Inode> {
        self.cache.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Inode)> {
        self.cache.iter()
    }
}

/// on-disk slot operations, each one mirrored into the cache
impl Directory {
    /// store `name -> inode` in the first free slot of its bucket, growing
    /// the bucket chain by one cluster when it is full
    ///
    /// The inode record is written too, so the cache never holds an inode
    /// the table does not.
    pub(crate) fn add(&mut self, volume: &mut Volume, name: &str, inode: &Inode) -> Result<()> {
        validate_name(name)?;
        if self.cache.contains_key(name) {
            return Err(FsError::FileExists);
        }
        let bucket = bucket_of(name);
        let head = Self::bucket_head(volume, bucket)?;
        let position = if head == END_OF_CHAIN {
            let cluster = volume.allocate_cluster()?;
            Self::claim_directory_cluster(volume, cluster)?;
            Self::set_bucket_head(volume, bucket, cluster)?;
            SlotPosition { cluster, slot: 0 }
        } else {
            let chain = volume.bucket_chain(head)?;
            match Self::first_free_slot(volume, &chain)? {
                Some(position) => position,
                None => {
                    let tail = chain[chain.len() - 1];
                    if volume.fat.get(tail) == Some(FREE_CLUSTER) {
                        // claim a stale tail before the allocator can hand it out as the new link
                        volume.fat.set(&mut volume.superblock, tail, END_OF_CHAIN);
                    }
                    let cluster = volume.extend_chain(tail)?;
                    Self::claim_directory_cluster(volume, cluster)?;
                    SlotPosition { cluster, slot: 0 }
                }
            }
        };
        trace!("add {name:?} to bucket {bucket} at {position:?}");

        let range = position.range();
        volume.cluster_mut(position.cluster)?[range].copy_from_slice(&encode_slot(name, inode.id));
        volume.write_inode(inode)?;
        self.cache.insert(name.to_owned(), *inode);
        Ok(())
    }

    /// find `name` by walking its bucket chain on disk
    pub fn read(&self, volume: &Volume, name: &str) -> Result<Inode> {
        let (_, id) = Self::find_slot(volume, name)?.ok_or(FsError::FileNotFound)?;
        volume.read_inode(id)
    }

    /// zero the slot holding `name`, leaving it free for reuse
    pub(crate) fn delete(&mut self, volume: &mut Volume, name: &str) -> Result<()> {
        let (position, _) = Self::find_slot(volume, name)?.ok_or(FsError::FileNotFound)?;
        let range = position.range();
        volume.cluster_mut(position.cluster)?[range].fill(0);
        self.cache.remove(name);
        trace!("deleted {name:?} at {position:?}");
        Ok(())
    }

    /// rewrite the inode record of `name` and refresh its cache entry
    pub(crate) fn update_inode(&mut self, volume: &mut Volume, name: &str, inode: &Inode) -> Result<()> {
        let cached = self.cache.get_mut(name).ok_or(FsError::FileNotFound)?;
        volume.write_inode(inode)?;
        *cached = *inode;
        Ok(())
    }
}

/// bucket table and slot scanning
impl Directory {
    fn bucket_head(volume: &Volume, bucket: usize) -> Result<i32> {
        let heads = volume.cluster(DIRECTORY_CLUSTER)?;
        let raw = &heads[bucket * HEAD_SIZE..(bucket + 1) * HEAD_SIZE];
        Ok(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn set_bucket_head(volume: &mut Volume, bucket: usize, cluster: i32) -> Result<()> {
        volume.write_cluster(DIRECTORY_CLUSTER, bucket * HEAD_SIZE, &cluster.to_le_bytes())
    }

    /// wipe a cluster that just joined a bucket chain and account for it in
    /// the directory inode's size
    fn claim_directory_cluster(volume: &mut Volume, cluster: i32) -> Result<()> {
        volume.zero_cluster(cluster)?;
        let mut inode = volume.read_inode(DIRECTORY_INODE)?;
        inode.size += CLUSTER_SIZE as i32;
        inode.set_mtime();
        volume.write_inode(&inode)
    }

    fn first_free_slot(volume: &Volume, chain: &[i32]) -> Result<Option<SlotPosition>> {
        for cluster in chain {
            let data = volume.cluster(*cluster)?;
            let free = (0..SLOTS_PER_CLUSTER).find(|slot| data[slot * SLOT_SIZE + LEN_OFFSET] == 0);
            if let Some(slot) = free {
                return Ok(Some(SlotPosition {
                    cluster: *cluster,
                    slot,
                }));
            }
        }
        Ok(None)
    }

    fn find_slot(volume: &Volume, name: &str) -> Result<Option<(SlotPosition, i32)>> {
        let head = Self::bucket_head(volume, bucket_of(name))?;
        if head == END_OF_CHAIN {
            return Ok(None);
        }
        for cluster in volume.bucket_chain(head)? {
            let data = volume.cluster(cluster)?;
            for (slot, record) in data.chunks_exact(SLOT_SIZE).enumerate() {
                match decode_slot(record) {
                    Some((stored, id)) if stored == name.as_bytes() => {
                        return Ok(Some((SlotPosition { cluster, slot }, id)))
                    }
                    _ => {}
                }
            }
        }
        Ok(None)
    }
}
