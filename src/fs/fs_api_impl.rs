//! the file operations of a mounted volume
//!
//! Every operation takes the acting user id; [SUPERUSER] passes every
//! permission check. Checks run in one order for all of them: the file
//! must exist (or must not, for creation), then the permission bits, then
//! the name and the free space.
use log::{info, warn};

use crate::error::{FsError, Result};

use super::{validate_name, ClusterFs, Inode, Uid, CLUSTER_SIZE, SUPERUSER};

/// how [ClusterFs::store] places new data relative to the old
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// replace the whole content
    Overwrite,
    /// continue after the current end of data
    Append,
}

impl ClusterFs {
    /// create an empty file owned by `uid`, readable by others
    pub fn create(&mut self, uid: Uid, name: &str) -> Result<Inode> {
        info!("create() called with name: {:?}, uid: {:?}", name, uid);
        if self.directory.contains(name) {
            return Err(FsError::FileExists);
        }
        validate_name(name)?;
        if self.free_cluster_num() == 0 {
            return Err(FsError::NoFreeClusters);
        }

        let first_cluster = self.volume.allocate_cluster()?;
        let id = self.volume.inode_map.get_free_inode();
        let inode = Inode::new(id, uid, first_cluster);
        // the bucket may need a cluster of its own; give the data cluster back if it can't have one
        if let Err(e) = self.directory.add(&mut self.volume, name, &inode) {
            self.volume.release_chain(first_cluster)?;
            return Err(e);
        }
        self.volume.inode_map.set(id, false);
        Ok(inode)
    }

    /// the whole content of `name`
    pub fn read(&self, uid: Uid, name: &str) -> Result<Vec<u8>> {
        info!("read() called with name: {:?}, uid: {:?}", name, uid);
        let inode = self.stat(name)?;
        if !inode.can_read(uid) {
            return Err(FsError::PermissionDenied);
        }

        let chain = self.volume.chain(inode.first_cluster)?;
        let mut data = Vec::with_capacity(chain.len() * CLUSTER_SIZE);
        for cluster in chain {
            data.extend_from_slice(self.volume.cluster(cluster)?);
        }
        data.truncate(inode.size as usize);
        Ok(data)
    }

    /// replace the content of `name` with `data`, creating the file if needed
    ///
    /// When clusters run out half way, the bytes that fit stay written and
    /// the shorter size is committed before [FsError::NoFreeClusters] is
    /// returned.
    pub fn write(&mut self, uid: Uid, name: &str, data: &[u8]) -> Result<()> {
        info!(
            "write() called with name: {:?}, uid: {:?}, {} bytes",
            name,
            uid,
            data.len()
        );
        self.store(uid, name, data, Placement::Overwrite)
    }

    /// add `data` after the current end of `name`, creating the file if needed
    ///
    /// Runs out of clusters the same way [ClusterFs::write] does.
    pub fn append(&mut self, uid: Uid, name: &str, data: &[u8]) -> Result<()> {
        info!(
            "append() called with name: {:?}, uid: {:?}, {} bytes",
            name,
            uid,
            data.len()
        );
        self.store(uid, name, data, Placement::Append)
    }

    /// read `src`, create `dst` and write the content into it
    ///
    /// Not atomic: if the write fails, `dst` stays behind.
    pub fn copy(&mut self, uid: Uid, src: &str, dst: &str) -> Result<()> {
        info!("copy() called with src: {:?}, dst: {:?}, uid: {:?}", src, dst, uid);
        let data = self.read(uid, src)?;
        self.create(uid, dst)?;
        self.write(uid, dst, &data)
    }

    /// remove `name` and release its inode and every cluster of its chain
    pub fn delete(&mut self, uid: Uid, name: &str) -> Result<()> {
        info!("delete() called with name: {:?}, uid: {:?}", name, uid);
        let inode = self.stat(name)?;
        if !inode.can_write(uid) {
            return Err(FsError::PermissionDenied);
        }

        self.directory.delete(&mut self.volume, name)?;
        self.volume.release_chain(inode.first_cluster)?;
        self.volume.write_inode(&Inode::empty(inode.id))?;
        self.volume.inode_map.set(inode.id, true);
        Ok(())
    }

    /// move the directory entry of `src` to `dst`; inode and data stay where they are
    pub fn rename(&mut self, uid: Uid, src: &str, dst: &str) -> Result<()> {
        info!("rename() called with src: {:?}, dst: {:?}, uid: {:?}", src, dst, uid);
        let inode = self.stat(src)?;
        if !inode.can_write(uid) {
            return Err(FsError::PermissionDenied);
        }
        if self.directory.contains(dst) {
            return Err(FsError::FileExists);
        }
        // add first, so a full volume leaves `src` untouched
        self.directory.add(&mut self.volume, dst, &inode)?;
        self.directory.delete(&mut self.volume, src)
    }

    pub fn set_permissions(
        &mut self,
        uid: Uid,
        name: &str,
        owner_read: bool,
        owner_write: bool,
        other_read: bool,
        other_write: bool,
    ) -> Result<()> {
        info!(
            "set_permissions() called with name: {:?}, uid: {:?}, flags: {:?}",
            name,
            uid,
            (owner_read, owner_write, other_read, other_write)
        );
        let mut inode = self.stat(name)?;
        if !inode.can_write(uid) {
            return Err(FsError::PermissionDenied);
        }
        inode.set_permissions(owner_read, owner_write, other_read, other_write);
        self.directory.update_inode(&mut self.volume, name, &inode)
    }

    /// hand `name` over to the registered user `new_owner_login`
    pub fn set_owner(&mut self, uid: Uid, name: &str, new_owner_login: &str) -> Result<()> {
        info!(
            "set_owner() called with name: {:?}, uid: {:?}, new owner: {:?}",
            name, uid, new_owner_login
        );
        let mut inode = self.stat(name)?;
        if !inode.can_write(uid) {
            return Err(FsError::PermissionDenied);
        }
        let new_owner = self
            .users(uid)?
            .into_iter()
            .find(|user| user.login == new_owner_login)
            .ok_or(FsError::UserNotFound)?;
        inode.uid = new_owner.id;
        self.directory.update_inode(&mut self.volume, name, &inode)
    }

    /// give every file owned by `old_owner` to the superuser
    pub(super) fn reassign_files(&mut self, old_owner: Uid) -> Result<usize> {
        let owned: Vec<(String, Inode)> = self
            .directory
            .entries()
            .filter(|(_, inode)| inode.uid == old_owner)
            .map(|(name, inode)| (name.clone(), *inode))
            .collect();
        for (name, mut inode) in owned.iter().cloned() {
            inode.uid = SUPERUSER;
            self.directory.update_inode(&mut self.volume, &name, &inode)?;
        }
        Ok(owned.len())
    }

    fn store(&mut self, uid: Uid, name: &str, data: &[u8], placement: Placement) -> Result<()> {
        if !self.directory.contains(name) {
            self.create(uid, name)?;
        }
        let mut inode = self.stat(name)?;
        if !inode.can_write(uid) {
            return Err(FsError::PermissionDenied);
        }

        let start = match placement {
            Placement::Overwrite => 0,
            Placement::Append => inode.size as usize,
        };
        let end = start + data.len();
        let size = i32::try_from(end).map_err(|_| FsError::FileTooLarge)?;
        let chain = self.volume.chain(inode.first_cluster)?;
        let mut tail = chain[chain.len() - 1];
        let mut position = start;
        let mut written = 0;

        while written < data.len() {
            let index = position / CLUSTER_SIZE;
            let cluster = if let Some(cluster) = chain.get(index) {
                *cluster
            } else {
                match self.volume.extend_chain(tail) {
                    Ok(cluster) => cluster,
                    Err(FsError::NoFreeClusters) => {
                        // everything before `position` is on disk: keep it
                        warn!(
                            "short write to {:?}: {} of {} bytes stored",
                            name,
                            position,
                            end
                        );
                        inode.size = position as i32;
                        inode.set_mtime();
                        self.directory.update_inode(&mut self.volume, name, &inode)?;
                        return Err(FsError::NoFreeClusters);
                    }
                    Err(e) => return Err(e),
                }
            };
            tail = cluster;
            let offset = position % CLUSTER_SIZE;
            let len = (CLUSTER_SIZE - offset).min(data.len() - written);
            self.volume
                .write_cluster(cluster, offset, &data[written..written + len])?;
            written += len;
            position += len;
        }

        if placement == Placement::Overwrite {
            let needed = end.div_ceil(CLUSTER_SIZE).max(1);
            self.volume.truncate_chain(&chain, needed);
        }
        inode.size = size;
        inode.set_mtime();
        self.directory.update_inode(&mut self.volume, name, &inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fs::{DEFAULT_ADMIN_LOGIN, END_OF_CHAIN, FREE_CLUSTER, USERS_FILE},
        mkfs::mkfs,
        utils::digest::bucket_of,
    };
    use std::path::PathBuf;

    const ALICE: Uid = 1;
    const BOB: Uid = 2;

    fn image(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("fs.img")
    }

    fn mounted(dir: &tempfile::TempDir, clusters: usize) -> anyhow::Result<ClusterFs> {
        mkfs(image(dir), (clusters * CLUSTER_SIZE) as u64, "123456")?;
        Ok(ClusterFs::mount(image(dir))?)
    }

    /// `len` bytes that differ from one cluster to the next
    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_end_to_end_scenario() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let users = fs.users(SUPERUSER)?;
        assert_eq!(users[0].login, DEFAULT_ADMIN_LOGIN);
        assert_eq!(users[0].id, SUPERUSER);

        fs.create(SUPERUSER, "a")?;
        fs.write(SUPERUSER, "a", b"hello")?;
        assert_eq!(fs.read(SUPERUSER, "a")?, b"hello");
        fs.append(SUPERUSER, "a", b"!")?;
        assert_eq!(fs.read(SUPERUSER, "a")?, b"hello!");
        fs.delete(SUPERUSER, "a")?;
        assert!(matches!(fs.read(SUPERUSER, "a"), Err(FsError::FileNotFound)));
        Ok(())
    }

    #[test]
    fn test_write_then_read_returns_data() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        for len in [0, 1, CLUSTER_SIZE - 1, CLUSTER_SIZE, CLUSTER_SIZE + 1, 3 * CLUSTER_SIZE + 5] {
            let data = pattern(len);
            fs.write(ALICE, "file", &data)?;
            assert_eq!(fs.read(ALICE, "file")?, data, "length {len}");
            assert_eq!(fs.stat("file")?.size as usize, len);
            assert_eq!(fs.clusters_chain("file")?.len(), len.div_ceil(CLUSTER_SIZE).max(1));
        }
        let longest = "n".repeat(59);
        fs.write(ALICE, &longest, b"max name")?;
        assert_eq!(fs.read(ALICE, &longest)?, b"max name");
        Ok(())
    }

    #[test]
    fn test_create_twice_fails_without_changes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let inode = fs.create(ALICE, "twice")?;
        let free = fs.free_cluster_num();
        let files = fs.list();

        assert!(matches!(fs.create(BOB, "twice"), Err(FsError::FileExists)));
        assert_eq!(fs.free_cluster_num(), free);
        assert_eq!(fs.list(), files);
        assert_eq!(fs.stat("twice")?, inode);
        Ok(())
    }

    #[test]
    fn test_long_name_allocates_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let free = fs.free_cluster_num();
        assert!(matches!(
            fs.create(ALICE, &"x".repeat(60)),
            Err(FsError::InvalidName)
        ));
        assert!(matches!(
            fs.write(ALICE, &"y".repeat(61), b"data"),
            Err(FsError::InvalidName)
        ));
        assert_eq!(fs.free_cluster_num(), free);
        assert_eq!(fs.list().len(), 1);
        Ok(())
    }

    #[test]
    fn test_delete_releases_inode_and_clusters() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        // let the bucket cluster of "victim" exist before measuring
        fs.create(ALICE, "victim")?;
        fs.delete(ALICE, "victim")?;
        let free = fs.free_cluster_num();

        let inode = fs.create(ALICE, "victim")?;
        fs.write(ALICE, "victim", &pattern(3 * CLUSTER_SIZE))?;
        assert_eq!(fs.free_cluster_num(), free - 3);
        fs.delete(ALICE, "victim")?;
        assert_eq!(fs.free_cluster_num(), free);
        assert!(matches!(fs.read(ALICE, "victim"), Err(FsError::FileNotFound)));
        assert!(matches!(fs.delete(ALICE, "victim"), Err(FsError::FileNotFound)));

        let reused = fs.create(ALICE, "other")?;
        assert_eq!(reused.id, inode.id);
        assert_eq!(reused.first_cluster, inode.first_cluster);
        Ok(())
    }

    #[test]
    fn test_free_counter_moves_by_one_per_cluster() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        fs.create(ALICE, "grow")?;
        let mut free = fs.free_cluster_num();
        for clusters in 2..=5 {
            fs.write(ALICE, "grow", &pattern(clusters * CLUSTER_SIZE))?;
            assert_eq!(fs.free_cluster_num(), free - 1);
            free = fs.free_cluster_num();
        }
        for clusters in (1..5).rev() {
            fs.write(ALICE, "grow", &pattern(clusters * CLUSTER_SIZE))?;
            assert_eq!(fs.free_cluster_num(), free + 1);
            free = fs.free_cluster_num();
        }
        assert_eq!(fs.allocation_table().count_free(), fs.free_cluster_num());
        assert!(fs.free_cluster_num() <= fs.cluster_num() - 1);
        Ok(())
    }

    #[test]
    fn test_permission_matrix() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        fs.write(ALICE, "private", b"alice only")?;
        fs.set_permissions(ALICE, "private", true, true, false, false)?;
        assert!(matches!(fs.read(BOB, "private"), Err(FsError::PermissionDenied)));
        assert_eq!(fs.read(ALICE, "private")?, b"alice only");
        assert_eq!(fs.read(SUPERUSER, "private")?, b"alice only");

        fs.set_permissions(ALICE, "private", true, false, true, true)?;
        assert!(matches!(
            fs.write(ALICE, "private", b"no"),
            Err(FsError::PermissionDenied)
        ));
        assert!(matches!(
            fs.append(ALICE, "private", b"no"),
            Err(FsError::PermissionDenied)
        ));
        assert!(matches!(fs.delete(ALICE, "private"), Err(FsError::PermissionDenied)));
        // others have write access that the owner lacks
        fs.append(BOB, "private", b", bob too")?;
        assert_eq!(fs.read(ALICE, "private")?, b"alice only, bob too");

        fs.set_permissions(SUPERUSER, "private", false, false, false, false)?;
        fs.write(SUPERUSER, "private", b"root")?;
        assert_eq!(fs.read(SUPERUSER, "private")?, b"root");
        assert!(matches!(fs.read(ALICE, "private"), Err(FsError::PermissionDenied)));
        assert!(matches!(
            fs.set_permissions(ALICE, "private", true, true, true, true),
            Err(FsError::PermissionDenied)
        ));
        fs.delete(SUPERUSER, "private")?;
        Ok(())
    }

    #[test]
    fn test_default_permissions_of_new_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let inode = fs.create(ALICE, "shared")?;
        assert_eq!(inode.uid, ALICE);
        assert_eq!(inode.permissions.to_code(), 32);
        assert!(inode.ctime > 0 && inode.ctime == inode.mtime);
        fs.write(ALICE, "shared", b"read me")?;
        assert_eq!(fs.read(BOB, "shared")?, b"read me");
        assert!(matches!(fs.write(BOB, "shared", b"no"), Err(FsError::PermissionDenied)));
        assert!(matches!(fs.rename(BOB, "shared", "mine"), Err(FsError::PermissionDenied)));
        Ok(())
    }

    #[test]
    fn test_rename_keeps_inode_and_data() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let data = pattern(2 * CLUSTER_SIZE + 10);
        fs.write(ALICE, "old", &data)?;
        let before = fs.stat("old")?;
        let free = fs.free_cluster_num();

        fs.rename(ALICE, "old", "new")?;
        let after = fs.stat("new")?;
        assert_eq!(after.id, before.id);
        assert_eq!(after.size, before.size);
        assert_eq!(after.first_cluster, before.first_cluster);
        assert_eq!(fs.read(ALICE, "new")?, data);
        assert!(matches!(fs.read(ALICE, "old"), Err(FsError::FileNotFound)));
        // at most one new bucket cluster for the new name
        assert!(free - fs.free_cluster_num() <= 1);

        fs.create(ALICE, "taken")?;
        assert!(matches!(fs.rename(ALICE, "new", "taken"), Err(FsError::FileExists)));
        assert!(matches!(fs.rename(ALICE, "gone", "x"), Err(FsError::FileNotFound)));
        assert!(matches!(
            fs.rename(ALICE, "new", &"z".repeat(60)),
            Err(FsError::InvalidName)
        ));
        assert_eq!(fs.read(ALICE, "new")?, data);
        Ok(())
    }

    #[test]
    fn test_chain_grows_by_one_cluster() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let n = 3;
        fs.write(ALICE, "chain", &pattern(n * CLUSTER_SIZE))?;
        let chain = fs.clusters_chain("chain")?;
        assert_eq!(chain.len(), n);

        fs.write(ALICE, "chain", &pattern(n * CLUSTER_SIZE + 1))?;
        let grown = fs.clusters_chain("chain")?;
        assert_eq!(grown.len(), n + 1);
        assert_eq!(&grown[..n], &chain[..]);
        assert_eq!(fs.allocation_table().get(grown[n]), Some(END_OF_CHAIN));
        Ok(())
    }

    #[test]
    fn test_append_across_cluster_boundary() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let mut expected = pattern(CLUSTER_SIZE - 3);
        fs.write(ALICE, "log", &expected)?;
        let tail = pattern(CLUSTER_SIZE + 7);
        fs.append(ALICE, "log", &tail)?;
        expected.extend_from_slice(&tail);
        assert_eq!(fs.read(ALICE, "log")?, expected);
        assert_eq!(fs.clusters_chain("log")?.len(), 3);

        // appending to an absent file creates it
        fs.append(ALICE, "fresh", b"new")?;
        assert_eq!(fs.read(ALICE, "fresh")?, b"new");
        Ok(())
    }

    #[test]
    fn test_short_write_is_committed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 16)?;
        fs.create(ALICE, "big")?;
        let free = fs.free_cluster_num();
        let data = pattern((free + 3) * CLUSTER_SIZE);

        assert!(matches!(fs.write(ALICE, "big", &data), Err(FsError::NoFreeClusters)));
        assert_eq!(fs.free_cluster_num(), 0);
        let stored = (free + 1) * CLUSTER_SIZE;
        assert_eq!(fs.stat("big")?.size as usize, stored);
        assert_eq!(fs.read(ALICE, "big")?, &data[..stored]);

        assert!(matches!(fs.create(ALICE, "more"), Err(FsError::NoFreeClusters)));
        assert!(matches!(fs.append(ALICE, "big", b"x"), Err(FsError::NoFreeClusters)));
        assert_eq!(fs.stat("big")?.size as usize, stored);

        // the committed size survives a remount
        fs.unmount()?;
        let fs = ClusterFs::mount(image(&dir))?;
        assert_eq!(fs.read(ALICE, "big")?, &data[..stored]);
        Ok(())
    }

    #[test]
    fn test_short_append_is_committed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 16)?;
        let head = pattern(10);
        fs.write(ALICE, "log", &head)?;
        let free = fs.free_cluster_num();
        let tail = vec![7u8; (free + 2) * CLUSTER_SIZE];

        assert!(matches!(fs.append(ALICE, "log", &tail), Err(FsError::NoFreeClusters)));
        let stored = (free + 1) * CLUSTER_SIZE;
        let content = fs.read(ALICE, "log")?;
        assert_eq!(content.len(), stored);
        assert_eq!(&content[..10], &head[..]);
        assert!(content[10..].iter().all(|b| *b == 7));
        Ok(())
    }

    #[test]
    fn test_create_fails_cleanly_when_bucket_cannot_grow() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 16)?;
        fs.create(ALICE, "filler")?;
        // leave exactly one free cluster
        let free = fs.free_cluster_num();
        fs.write(ALICE, "filler", &pattern(free * CLUSTER_SIZE))?;
        assert_eq!(fs.free_cluster_num(), 1);

        // a name in an unused bucket needs a bucket cluster besides its data cluster
        let used: Vec<usize> = fs.list().iter().map(|(name, _)| bucket_of(name)).collect();
        let name = (0..)
            .map(|i| format!("n{i}"))
            .find(|name| !used.contains(&bucket_of(name)))
            .unwrap();
        assert!(matches!(fs.create(ALICE, &name), Err(FsError::NoFreeClusters)));
        assert_eq!(fs.free_cluster_num(), 1);
        assert!(matches!(fs.stat(&name), Err(FsError::FileNotFound)));
        Ok(())
    }

    #[test]
    fn test_size_beyond_i32_is_refused_before_writing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        fs.write(ALICE, "huge", b"head")?;
        let mut inode = fs.stat("huge")?;
        inode.size = i32::MAX - 10;
        fs.directory.update_inode(&mut fs.volume, "huge", &inode)?;
        let free = fs.free_cluster_num();

        assert!(matches!(
            fs.append(ALICE, "huge", &[7u8; 20]),
            Err(FsError::FileTooLarge)
        ));
        assert_eq!(fs.free_cluster_num(), free);
        assert_eq!(fs.stat("huge")?.size, i32::MAX - 10);
        assert_eq!(fs.clusters_chain("huge")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_copy() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let data = pattern(CLUSTER_SIZE + 100);
        fs.write(ALICE, "src", &data)?;
        fs.copy(BOB, "src", "dst")?;
        assert_eq!(fs.read(BOB, "dst")?, data);
        assert_eq!(fs.stat("dst")?.uid, BOB);
        assert_ne!(fs.stat("dst")?.first_cluster, fs.stat("src")?.first_cluster);

        assert!(matches!(fs.copy(BOB, "src", "dst"), Err(FsError::FileExists)));
        assert!(matches!(fs.copy(BOB, "nope", "dst2"), Err(FsError::FileNotFound)));
        assert!(matches!(fs.stat("dst2"), Err(FsError::FileNotFound)));
        Ok(())
    }

    #[test]
    fn test_copy_leaves_destination_after_short_write() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 16)?;
        fs.create(ALICE, "src")?;
        let free = fs.free_cluster_num();
        fs.write(ALICE, "src", &pattern((free - 1) * CLUSTER_SIZE))?;
        assert_eq!(fs.free_cluster_num(), 2);
        assert!(matches!(fs.copy(ALICE, "src", "dst"), Err(FsError::NoFreeClusters)));
        assert!(fs.stat("dst").is_ok());
        assert_eq!(fs.free_cluster_num(), 0);
        Ok(())
    }

    #[test]
    fn test_set_owner() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        let alice = fs.add_user(SUPERUSER, "alice", "pw")?;
        let bob = fs.add_user(SUPERUSER, "bob", "pw")?;
        fs.write(alice, "gift", b"for bob")?;

        assert!(matches!(
            fs.set_owner(bob, "gift", "bob"),
            Err(FsError::PermissionDenied)
        ));
        assert!(matches!(
            fs.set_owner(alice, "gift", "nobody"),
            Err(FsError::UserNotFound)
        ));
        fs.set_owner(alice, "gift", "bob")?;
        assert_eq!(fs.stat("gift")?.uid, bob);
        // alice is now "other": read yes, write no
        assert_eq!(fs.read(alice, "gift")?, b"for bob");
        assert!(matches!(fs.write(alice, "gift", b"x"), Err(FsError::PermissionDenied)));
        fs.write(bob, "gift", b"mine")?;
        Ok(())
    }

    #[test]
    fn test_state_survives_remount() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        for i in 0..10 {
            fs.write(ALICE, &format!("f{i}"), &pattern(i * 1000))?;
        }
        fs.delete(ALICE, "f3")?;
        fs.rename(ALICE, "f4", "four")?;
        fs.set_permissions(ALICE, "f5", true, false, false, false)?;
        let free = fs.free_cluster_num();
        let files = fs.list();
        fs.unmount()?;

        let fs = ClusterFs::mount(image(&dir))?;
        assert_eq!(fs.free_cluster_num(), free);
        assert_eq!(fs.list(), files);
        assert_eq!(fs.read(ALICE, "four")?, pattern(4000));
        assert!(!fs.stat("f5")?.permissions.owner_write);
        assert!(matches!(fs.stat("f3"), Err(FsError::FileNotFound)));
        Ok(())
    }

    #[test]
    fn test_drop_flushes_like_unmount() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 64)?;
        fs.write(ALICE, "kept", &pattern(2 * CLUSTER_SIZE))?;
        let free = fs.free_cluster_num();
        drop(fs);

        let fs = ClusterFs::mount(image(&dir))?;
        assert_eq!(fs.free_cluster_num(), free);
        assert_eq!(fs.read(ALICE, "kept")?, pattern(2 * CLUSTER_SIZE));
        Ok(())
    }

    /// mount the image, write one file named `name` and skip the flush, as a crash would
    fn crash_after_write(dir: &tempfile::TempDir, name: &str) -> anyhow::Result<()> {
        let mut fs = ClusterFs::mount(image(dir))?;
        fs.write(ALICE, name, b"on disk")?;
        std::mem::forget(fs);
        Ok(())
    }

    #[test]
    fn test_unclean_termination_in_existing_bucket() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let free = mounted(&dir, 64)?.free_cluster_num();

        // share the bucket of the registry, whose chain is already on disk
        let name = (0..)
            .map(|i| format!("orphan{i}"))
            .find(|name| bucket_of(name) == bucket_of(USERS_FILE))
            .unwrap();
        crash_after_write(&dir, &name)?;

        let fs = ClusterFs::mount(image(&dir))?;
        // the slot and the inode were written through, the allocation was not
        let orphan = fs.stat(&name)?;
        assert_eq!(orphan.size, 7);
        assert_eq!(fs.free_cluster_num(), free);
        assert_eq!(fs.allocation_table().get(orphan.first_cluster), Some(FREE_CLUSTER));
        assert!(!fs.read(SUPERUSER, USERS_FILE)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unclean_termination_in_new_bucket() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let free = mounted(&dir, 64)?.free_cluster_num();

        let name = (0..)
            .map(|i| format!("n{i}"))
            .find(|name| bucket_of(name) != bucket_of(USERS_FILE))
            .unwrap();
        crash_after_write(&dir, &name)?;

        let mut fs = ClusterFs::mount(image(&dir))?;
        assert_eq!(fs.free_cluster_num(), free);
        assert_eq!(fs.stat(&name)?.size, 7);
        // its data chain was never recorded, so the content is out of reach
        assert!(matches!(fs.read(ALICE, &name), Err(FsError::Corrupted(_))));
        assert_eq!(fs.users(SUPERUSER)?.len(), 1);

        // the volume stays usable
        fs.write(ALICE, "after", b"still works")?;
        assert_eq!(fs.read(ALICE, "after")?, b"still works");
        fs.unmount()?;
        let fs = ClusterFs::mount(image(&dir))?;
        assert_eq!(fs.read(ALICE, "after")?, b"still works");
        Ok(())
    }

    #[test]
    fn test_many_files_in_hashed_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut fs = mounted(&dir, 1024)?;
        for i in 0..300 {
            fs.create(ALICE, &i.to_string())?;
        }
        for i in 0..300 {
            fs.write(ALICE, &i.to_string(), i.to_string().as_bytes())?;
        }
        for i in 0..300 {
            assert_eq!(fs.read(ALICE, &i.to_string())?, i.to_string().as_bytes());
        }
        fs.unmount()?;

        let fs = ClusterFs::mount(image(&dir))?;
        assert_eq!(fs.list().len(), 301);
        for i in (0..300).step_by(7) {
            assert_eq!(fs.read(ALICE, &i.to_string())?, i.to_string().as_bytes());
            assert_eq!(fs.directory().read(&fs.volume, &i.to_string())?, fs.stat(&i.to_string())?);
        }
        assert!(fs.stat(USERS_FILE).is_ok());
        Ok(())
    }
}
