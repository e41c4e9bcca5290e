//! our custom filesystem
pub mod allocation_table;
pub mod directory;
pub mod fs_layout;
pub mod inode;
pub mod inode_map;
pub mod superblock;
pub mod users;
pub mod volume;
mod fs_api_impl;
pub use allocation_table::*;
pub use directory::*;
pub use fs_layout::*;
pub use inode::*;
pub use inode_map::*;
pub use superblock::*;
pub use users::*;
pub(crate) use volume::*;

/// user id as stored in inodes and in the `users` registry
pub type Uid = i32;

pub const CLUSTER_SIZE: usize = 4096;
/// size of the serialized [SuperBlock], which is also where the allocation table starts
pub const SUPERBLOCK_SIZE: usize = 20;
pub const INODE_SIZE: usize = 28;
pub const BUCKET_COUNT: usize = 1024;
pub const SLOT_SIZE: usize = 64;
pub const SLOTS_PER_CLUSTER: usize = CLUSTER_SIZE / SLOT_SIZE;
pub const MAX_NAME_LEN: usize = 59;
/// the bucket-head table lives here and the allocator never hands it out
pub const DIRECTORY_CLUSTER: i32 = 0;
pub const DIRECTORY_INODE: i32 = 0;
/// allocation table entry for a free cluster
pub const FREE_CLUSTER: i32 = 0;
/// allocation table entry (and bucket head) terminating a chain
pub const END_OF_CHAIN: i32 = -1;
pub const SUPERUSER: Uid = 0;
pub const USERS_FILE: &str = "users";
pub const DEFAULT_ADMIN_LOGIN: &str = "admin";
/// directory cluster + one file cluster + one bucket cluster for `users` + one spare
pub const MIN_CLUSTERS: usize = 4;
pub const DEFAULT_VOLUME_SIZE: u64 = 50 * 1024 * 1024;
