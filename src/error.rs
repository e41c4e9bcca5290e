//! errors reported by the filesystem engine
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("a file with this name already exists")]
    FileExists,
    #[error("no file with this name")]
    FileNotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("no free clusters left")]
    NoFreeClusters,
    #[error("name must be 1 to 59 bytes long and logins must not contain whitespace")]
    InvalidName,
    #[error("a user with this login already exists")]
    UserExists,
    #[error("no user with this login")]
    UserNotFound,
    #[error("volume of {clusters} clusters is too small")]
    VolumeTooSmall { clusters: usize },
    #[error("volume of {clusters} clusters is too large for 4-byte offsets")]
    VolumeTooLarge { clusters: usize },
    #[error("file size would exceed {} bytes", i32::MAX)]
    FileTooLarge,
    #[error("volume is corrupted: {0}")]
    Corrupted(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
