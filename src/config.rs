//! CLI arguments and server configuration defaults.

use clap::{Args as ClapArgs, Parser, Subcommand};
use shadow_rs::formatcp;
use std::path::PathBuf;
use std::time::Duration;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;
pub const PENDING_UPLOAD_CAPACITY: usize = 10;
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
pub const PROGRESS_REFRESH_HZ: u8 = 15;
pub const PROGRESS_BAR_WIDTH: usize = 40;
pub const TEMP_FILE_PREFIX: &str = "lanshare-";
pub const MULTI_ARCHIVE_NAME: &str = "shared-files.zip";

/// CLI arguments and environment configuration.
#[derive(Parser, Debug)]
#[command(
    name = "lanshare",
    version = VERSION_INFO,
    about = "Share files quickly over a local network using a temporary link or QR code"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive files from other devices on your network.
    Receive(ReceiveArgs),
    /// Share files or directories over the local network.
    Share(ShareArgs),
}

/// 两种模式共用的监听参数。
#[derive(ClapArgs, Debug, Clone)]
pub struct ServerArgs {
    #[arg(
        short = 'p',
        long,
        env = "LANSHARE_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Port to run the server on"
    )]
    pub port: u16,
    #[arg(
        short = 'b',
        long = "bind",
        env = "LANSHARE_BIND",
        default_value = DEFAULT_BIND,
        help = "Bind address"
    )]
    pub host: String,
}

#[derive(ClapArgs, Debug)]
pub struct ReceiveArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    #[arg(
        short = 'd',
        long,
        env = "LANSHARE_SAVE_DIR",
        help = "Directory accepted files are saved to (defaults to the working directory)"
    )]
    pub save_dir: Option<PathBuf>,
    #[arg(
        long,
        env = "LANSHARE_TEMP_DIR",
        help = "Directory for staging incoming uploads (defaults to the OS temp dir)"
    )]
    pub temp_dir: Option<PathBuf>,
    #[arg(
        long,
        env = "LANSHARE_MAX_UPLOAD_SIZE",
        default_value_t = MAX_UPLOAD_SIZE,
        help = "Max request body size in bytes"
    )]
    pub max_upload_size: u64,
}

#[derive(ClapArgs, Debug)]
pub struct ShareArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    #[arg(
        help = "Files or directories to share; several paths are zipped. Omit to pick one interactively"
    )]
    pub paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_defaults() {
        let args = Args::try_parse_from(["lanshare", "receive"]).expect("parse");
        let Command::Receive(receive) = args.command else {
            panic!("expected receive command");
        };
        assert_eq!(receive.server.port, DEFAULT_PORT);
        assert_eq!(receive.server.host, DEFAULT_BIND);
        assert_eq!(receive.max_upload_size, MAX_UPLOAD_SIZE);
        assert!(receive.save_dir.is_none());
    }

    #[test]
    fn share_paths_are_optional() {
        let args = Args::try_parse_from(["lanshare", "share"]).expect("parse");
        let Command::Share(share) = args.command else {
            panic!("expected share command");
        };
        assert!(share.paths.is_empty());

        let args =
            Args::try_parse_from(["lanshare", "share", "-p", "9000", "a.txt", "dir"]).expect("parse");
        let Command::Share(share) = args.command else {
            panic!("expected share command");
        };
        assert_eq!(share.server.port, 9000);
        assert_eq!(share.paths.len(), 2);
    }
}
