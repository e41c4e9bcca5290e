use byte_unit::Byte;
use clap::Parser;

use crate::fs::{Permissions, DEFAULT_ADMIN_LOGIN, DEFAULT_VOLUME_SIZE};

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub enum Cli {
    /// create a new file system
    Mkfs(MkfsArgs),
    /// list every file with its permissions, owner and size
    Ls(SessionArgs),
    /// print the content of a file
    Cat(FileArgs),
    /// create an empty file
    Create(FileArgs),
    /// replace the content of a file
    Write(WriteArgs),
    /// add content at the end of a file
    Append(WriteArgs),
    /// copy a file
    Cp(TwoFileArgs),
    /// delete a file
    Rm(FileArgs),
    /// rename a file
    Mv(TwoFileArgs),
    /// change the permissions of a file
    Chmod(ChmodArgs),
    /// hand a file over to another user
    Chown(ChownArgs),
    /// register a new user
    Useradd(UserArgs),
    /// remove a user, giving its files to the superuser
    Userdel(UserArgs),
    /// show how many clusters are used and free
    Df(SessionArgs),
}

///make a new fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "make a new file system")]
pub struct MkfsArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the size of the cluster region, e.g. `50MiB` or `8388608`
    #[clap(short, long, default_value_t = DEFAULT_VOLUME_SIZE, value_parser = parse_size)]
    pub size: u64,
}

/// the image to mount and who is acting on it
#[derive(clap::Args, Debug, PartialEq)]
pub struct SessionArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the login to authenticate as
    #[clap(short, long, default_value = DEFAULT_ADMIN_LOGIN)]
    pub user: String,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct FileArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    pub name: String,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct WriteArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    pub name: String,
    /// the new content; read from stdin when absent
    pub content: Option<String>,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct TwoFileArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    pub src: String,
    pub dst: String,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct ChmodArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    pub name: String,
    /// two digits, owner then others; in each digit 2 is read and 1 is write
    #[arg(value_parser = parse_mode)]
    pub mode: Permissions,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct ChownArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    pub name: String,
    /// login of the new owner
    pub owner: String,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct UserArgs {
    #[command(flatten)]
    pub session: SessionArgs,
    pub login: String,
}

impl Cli {
    /// the session of every subcommand that works on a mounted image
    pub fn session(&self) -> Option<&SessionArgs> {
        match self {
            Cli::Mkfs(_) => None,
            Cli::Ls(args) | Cli::Df(args) => Some(args),
            Cli::Cat(args) | Cli::Create(args) | Cli::Rm(args) => Some(&args.session),
            Cli::Write(args) | Cli::Append(args) => Some(&args.session),
            Cli::Cp(args) | Cli::Mv(args) => Some(&args.session),
            Cli::Chmod(args) => Some(&args.session),
            Cli::Chown(args) => Some(&args.session),
            Cli::Useradd(args) | Cli::Userdel(args) => Some(&args.session),
        }
    }
}

fn parse_size(size: &str) -> Result<u64, String> {
    let bytes = Byte::from_str(size).map_err(|e| e.to_string())?;
    u64::try_from(bytes.get_bytes()).map_err(|e| e.to_string())
}

fn parse_mode(mode: &str) -> Result<Permissions, String> {
    let valid = mode.len() == 2 && mode.bytes().all(|digit| (b'0'..=b'3').contains(&digit));
    if !valid {
        return Err(format!("{mode:?} is not two digits between 0 and 3"));
    }
    mode.parse()
        .map(Permissions::from_code)
        .map_err(|e: std::num::ParseIntError| e.to_string())
}
