//! create our filesystem
use log::info;
use std::path::Path;

use crate::error::Result;
use crate::fs::{
    format_registry, ClusterFs, Directory, PasswordHasher, UserRecord, Volume,
    DEFAULT_ADMIN_LOGIN, SUPERUSER, USERS_FILE,
};
use crate::utils::digest::Argon2PasswordHasher;

/// create a new filesystem, given the path of the image file and the size of its cluster region
/// # Params
/// - `image_file_path`: the path of the image file, which must not exist yet
/// - `size`: bytes available for clusters; metadata regions come on top of it
/// - `admin_password`: password of the `admin` superuser written into `users`
///
/// # Return
/// a [Result] type to indicate whether the operation is successful
pub fn mkfs<P>(image_file_path: P, size: u64, admin_password: &str) -> Result<()>
where
    P: AsRef<Path>,
{
    mkfs_with_hasher(image_file_path, size, admin_password, Argon2PasswordHasher)
}

/// [mkfs] with a custom password digest
pub fn mkfs_with_hasher<P, H>(image_file_path: P, size: u64, admin_password: &str, hasher: H) -> Result<()>
where
    P: AsRef<Path>,
    H: PasswordHasher + 'static,
{
    let image_file_path = image_file_path.as_ref();
    info!("mkfs() called with image: {:?}, size: {}", image_file_path, size);

    let mut volume = Volume::format(image_file_path, size)?;
    Directory::format(&mut volume)?;
    volume.flush()?;
    drop(volume);

    // the registry is an ordinary file, so it is written through a mount
    let admin = UserRecord {
        id: SUPERUSER,
        login: DEFAULT_ADMIN_LOGIN.to_owned(),
        password_hash: hasher.hash(admin_password)?,
    };
    let mut fs = ClusterFs::mount_with_hasher(image_file_path, hasher)?;
    fs.create(SUPERUSER, USERS_FILE)?;
    fs.write(SUPERUSER, USERS_FILE, format_registry(&[admin]).as_bytes())?;
    fs.unmount()
}
