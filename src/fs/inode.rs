use serde::{Deserialize, Serialize};

use crate::error::{FsError, Result};
use crate::utils::time_util;

use super::{Uid, END_OF_CHAIN, INODE_SIZE, SUPERUSER};

/// access flags of a file, packed into a two-digit code only on disk
///
/// The tens digit belongs to the owner and the units digit to everybody
/// else; inside a digit, 2 means read and 1 means write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub owner_read: bool,
    pub owner_write: bool,
    pub other_read: bool,
    pub other_write: bool,
}

impl Permissions {
    pub const fn new(owner_read: bool, owner_write: bool, other_read: bool, other_write: bool) -> Self {
        Permissions {
            owner_read,
            owner_write,
            other_read,
            other_write,
        }
    }

    pub fn to_code(self) -> i32 {
        let digit = |read: bool, write: bool| i32::from(read) * 2 + i32::from(write);
        digit(self.owner_read, self.owner_write) * 10 + digit(self.other_read, self.other_write)
    }

    pub fn from_code(code: i32) -> Self {
        let owner = code / 10;
        let other = code % 10;
        Permissions {
            owner_read: owner & 2 != 0,
            owner_write: owner & 1 != 0,
            other_read: other & 2 != 0,
            other_write: other & 1 != 0,
        }
    }
}

/// owner read/write, others read
pub const DEFAULT_PERMISSIONS: Permissions = Permissions::new(true, true, true, false);

/// the 7 integers an inode occupies in the inode table
#[derive(Serialize, Deserialize)]
struct RawInode {
    id: i32,
    uid: i32,
    permissions: i32,
    size: i32,
    ctime: i32,
    mtime: i32,
    first_cluster: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(from = "RawInode", into = "RawInode")]
pub struct Inode {
    pub id: i32,
    pub uid: Uid,
    pub permissions: Permissions,
    pub size: i32,
    pub ctime: i32,
    pub mtime: i32,
    /// [END_OF_CHAIN] while the slot is unallocated
    pub first_cluster: i32,
}

impl From<RawInode> for Inode {
    fn from(raw: RawInode) -> Self {
        Inode {
            id: raw.id,
            uid: raw.uid,
            permissions: Permissions::from_code(raw.permissions),
            size: raw.size,
            ctime: raw.ctime,
            mtime: raw.mtime,
            first_cluster: raw.first_cluster,
        }
    }
}

impl From<Inode> for RawInode {
    fn from(inode: Inode) -> Self {
        RawInode {
            id: inode.id,
            uid: inode.uid,
            permissions: inode.permissions.to_code(),
            size: inode.size,
            ctime: inode.ctime,
            mtime: inode.mtime,
            first_cluster: inode.first_cluster,
        }
    }
}

impl Inode {
    /// an unallocated record, as written into every slot at format time
    pub fn empty(id: i32) -> Self {
        Inode {
            id,
            uid: SUPERUSER,
            permissions: Permissions::default(),
            size: 0,
            ctime: 0,
            mtime: 0,
            first_cluster: END_OF_CHAIN,
        }
    }

    /// a freshly created file owned by `uid`
    pub fn new(id: i32, uid: Uid, first_cluster: i32) -> Self {
        let now = time_util::now();
        Inode {
            id,
            uid,
            permissions: DEFAULT_PERMISSIONS,
            size: 0,
            ctime: now,
            mtime: now,
            first_cluster,
        }
    }

    pub fn set_permissions(
        &mut self,
        owner_read: bool,
        owner_write: bool,
        other_read: bool,
        other_write: bool,
    ) {
        self.permissions = Permissions::new(owner_read, owner_write, other_read, other_write);
    }

    pub fn set_mtime(&mut self) {
        self.mtime = time_util::now();
    }
}

/// This block is about access checks; the superuser passes all of them
impl Inode {
    pub fn can_read(&self, uid: Uid) -> bool {
        uid == SUPERUSER
            || if self.uid == uid {
                self.permissions.owner_read
            } else {
                self.permissions.other_read
            }
    }

    pub fn can_write(&self, uid: Uid) -> bool {
        uid == SUPERUSER
            || if self.uid == uid {
                self.permissions.owner_write
            } else {
                self.permissions.other_write
            }
    }
}

// This block is about positional (de)serialization inside the inode table
impl Inode {
    pub fn read_at(image: &[u8], inode_array_offset: usize, id: i32) -> Result<Self> {
        let position = inode_array_offset + id as usize * INODE_SIZE;
        let record = image
            .get(position..position + INODE_SIZE)
            .ok_or_else(|| FsError::Corrupted(format!("inode {id} out of bounds")))?;
        let (inode, _): (Inode, usize) =
            bincode::serde::decode_from_slice(record, bincode::config::legacy())?;
        Ok(inode)
    }

    pub fn write_at(&self, image: &mut [u8], inode_array_offset: usize) -> Result<()> {
        let position = inode_array_offset + self.id as usize * INODE_SIZE;
        let record = image
            .get_mut(position..position + INODE_SIZE)
            .ok_or_else(|| FsError::Corrupted(format!("inode {} out of bounds", self.id)))?;
        bincode::serde::encode_into_slice(self, record, bincode::config::legacy())?;
        Ok(())
    }
}
