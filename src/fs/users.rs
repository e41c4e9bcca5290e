//! the user registry, kept in the ordinary file `users` as
//! `<id> <login> <password_hash>` rows
use log::info;
use std::fmt;

use crate::error::{FsError, Result};

use super::{ClusterFs, Uid, SUPERUSER, USERS_FILE};

/// password digest used by the registry; digests must not contain whitespace
pub trait PasswordHasher {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, digest: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uid,
    pub login: String,
    pub password_hash: String,
}

impl fmt::Display for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.id, self.login, self.password_hash)
    }
}

impl UserRecord {
    fn parse(row: &str) -> Result<Self> {
        let malformed = || FsError::Corrupted(format!("malformed registry row {row:?}"));
        let mut fields = row.split_whitespace();
        let id = fields
            .next()
            .and_then(|id| id.parse().ok())
            .ok_or_else(malformed)?;
        let login = fields.next().ok_or_else(malformed)?;
        let password_hash = fields.next().ok_or_else(malformed)?;
        if fields.next().is_some() {
            return Err(malformed());
        }
        Ok(UserRecord {
            id,
            login: login.to_owned(),
            password_hash: password_hash.to_owned(),
        })
    }
}

/// parse registry text, accepting both LF and CRLF row separators
pub fn parse_registry(text: &str) -> Result<Vec<UserRecord>> {
    text.lines()
        .map(str::trim)
        .filter(|row| !row.is_empty())
        .map(UserRecord::parse)
        .collect()
}

pub fn format_registry(users: &[UserRecord]) -> String {
    users
        .iter()
        .map(UserRecord::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// logins are single whitespace-free words
fn validate_login(login: &str) -> Result<()> {
    if login.is_empty() || login.contains(char::is_whitespace) {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

/// registry maintenance, done through the ordinary read/write path so it
/// is subject to the permission bits of `users`
impl ClusterFs {
    pub fn users(&self, uid: Uid) -> Result<Vec<UserRecord>> {
        let raw = self.read(uid, USERS_FILE)?;
        let text = String::from_utf8(raw)
            .map_err(|_| FsError::Corrupted("registry is not UTF-8".into()))?;
        parse_registry(&text)
    }

    /// register `login` and return its new id, one above the highest in use
    pub fn add_user(&mut self, uid: Uid, login: &str, password: &str) -> Result<Uid> {
        info!("add_user() called with login: {:?}, uid: {:?}", login, uid);
        validate_login(login)?;
        let mut users = self.users(uid)?;
        if users.iter().any(|user| user.login == login) {
            return Err(FsError::UserExists);
        }
        let id = users.iter().map(|user| user.id).max().unwrap_or(SUPERUSER) + 1;
        users.push(UserRecord {
            id,
            login: login.to_owned(),
            password_hash: self.hasher.hash(password)?,
        });
        self.write(uid, USERS_FILE, format_registry(&users).as_bytes())?;
        Ok(id)
    }

    /// unregister `login`; the files it owns go to the superuser first
    pub fn del_user(&mut self, uid: Uid, login: &str) -> Result<()> {
        info!("del_user() called with login: {:?}, uid: {:?}", login, uid);
        let mut users = self.users(uid)?;
        let index = users
            .iter()
            .position(|user| user.login == login)
            .ok_or(FsError::UserNotFound)?;
        let id = users[index].id;
        if id == SUPERUSER || !self.stat(USERS_FILE)?.can_write(uid) {
            return Err(FsError::PermissionDenied);
        }

        let reassigned = self.reassign_files(id)?;
        info!("{reassigned} files of {login:?} now belong to the superuser");
        users.remove(index);
        self.write(uid, USERS_FILE, format_registry(&users).as_bytes())
    }

    /// check `password` against the registry and return the user id of `login`
    pub fn authenticate(&self, login: &str, password: &str) -> Result<Uid> {
        let user = self
            .users(SUPERUSER)?
            .into_iter()
            .find(|user| user.login == login)
            .ok_or(FsError::UserNotFound)?;
        if !self.hasher.verify(password, &user.password_hash) {
            return Err(FsError::PermissionDenied);
        }
        Ok(user.id)
    }
}
