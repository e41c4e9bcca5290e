use std::io::{Read, Write};

use byte_unit::Byte;
use clap::Parser;
use clusterfs::cli_interface::{Cli, WriteArgs};
use clusterfs::{ClusterFs, Uid, CLUSTER_SIZE};

/// a one-shot CLI over a filesystem image: create one with `mkfs`,
/// or mount it, run a single operation as an authenticated user and unmount.
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = Cli::parse();
    //if it is a `mkfs` subcommand
    if let Cli::Mkfs(args) = &args {
        let admin_password =
            rpassword::prompt_password("Please input a password for the admin user: ")?;
        clusterfs::mkfs::mkfs(&args.image_file_path, args.size, &admin_password)?;
        println!(
            "created {} with {} of cluster space",
            args.image_file_path,
            human(args.size)
        );
        return Ok(());
    }
    let Some(session) = args.session() else {
        return Ok(());
    };

    let mut fs = ClusterFs::mount(&session.image_file_path)?;
    let password =
        rpassword::prompt_password(format!("Please input the password of {}: ", session.user))?;
    let uid = fs.authenticate(&session.user, &password)?;
    let outcome = run(&mut fs, uid, &args);
    // flush the bookkeeping even when the operation failed half way
    fs.unmount()?;
    outcome
}

fn run(fs: &mut ClusterFs, uid: Uid, args: &Cli) -> anyhow::Result<()> {
    match args {
        Cli::Mkfs(_) => anyhow::bail!("mkfs does not run on a mounted image"),
        Cli::Ls(_) => {
            for (name, inode) in fs.list() {
                println!(
                    "{:02} {:>5} {:>12} {}",
                    inode.permissions.to_code(),
                    inode.uid,
                    human(inode.size as u64),
                    name
                );
            }
        }
        Cli::Cat(args) => {
            let data = fs.read(uid, &args.name)?;
            std::io::stdout().write_all(&data)?;
        }
        Cli::Create(args) => {
            fs.create(uid, &args.name)?;
        }
        Cli::Write(args) => {
            let data = content(args)?;
            fs.write(uid, &args.name, &data)?;
        }
        Cli::Append(args) => {
            let data = content(args)?;
            fs.append(uid, &args.name, &data)?;
        }
        Cli::Cp(args) => fs.copy(uid, &args.src, &args.dst)?,
        Cli::Rm(args) => fs.delete(uid, &args.name)?,
        Cli::Mv(args) => fs.rename(uid, &args.src, &args.dst)?,
        Cli::Chmod(args) => {
            let mode = args.mode;
            fs.set_permissions(
                uid,
                &args.name,
                mode.owner_read,
                mode.owner_write,
                mode.other_read,
                mode.other_write,
            )?;
        }
        Cli::Chown(args) => fs.set_owner(uid, &args.name, &args.owner)?,
        Cli::Useradd(args) => {
            let password = rpassword::prompt_password(format!(
                "Please input a password for the new user {}: ",
                args.login
            ))?;
            let id = fs.add_user(uid, &args.login, &password)?;
            println!("added user {} with id {}", args.login, id);
        }
        Cli::Userdel(args) => fs.del_user(uid, &args.login)?,
        Cli::Df(_) => {
            let total = fs.cluster_num() * CLUSTER_SIZE;
            let free = fs.free_cluster_num() * CLUSTER_SIZE;
            println!(
                "{} clusters, {} used, {} free ({} files)",
                fs.cluster_num(),
                human((total - free) as u64),
                human(free as u64),
                fs.list().len()
            );
        }
    }
    Ok(())
}

/// the bytes to store: the positional argument, or all of stdin
fn content(args: &WriteArgs) -> anyhow::Result<Vec<u8>> {
    match &args.content {
        Some(content) => Ok(content.as_bytes().to_vec()),
        None => {
            let mut data = Vec::new();
            std::io::stdin().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}

fn human(bytes: u64) -> String {
    Byte::from_bytes(bytes.into())
        .get_appropriate_unit(true)
        .to_string()
}
