use std::path::PathBuf;

use crate::takeout_core::cli::{AlbumBehavior, Cli, DateDivision, FixExtensions};
use crate::takeout_core::error::{Result, TakeoutError};

/// 64 MiB. Files larger than this are treated as unique for hashing/EXIF purposes
/// when `limit_filesize` is set.
pub const FILE_SIZE_LIMIT: u64 = 64 * 1024 * 1024;

/// Immutable, validated pipeline configuration threaded through every stage.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub albums: AlbumBehavior,
    pub divide_to_dates: DateDivision,
    pub fix_extensions: FixExtensions,
    pub write_exif: bool,
    pub skip_extras: bool,
    pub guess_from_name: bool,
    pub transform_pixel_mp: bool,
    pub update_creation_time: bool,
    pub limit_filesize: bool,
    pub divide_partner_shared: bool,
    pub concurrency: usize,
    pub batch_size: usize,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.input.as_os_str().is_empty() {
            return Err(TakeoutError::Config("--input must not be empty".into()));
        }
        if cli.output.as_os_str().is_empty() {
            return Err(TakeoutError::Config("--output must not be empty".into()));
        }
        if cli.concurrency == 0 {
            return Err(TakeoutError::Config("--concurrency must be at least 1".into()));
        }
        if cli.batch_size == 0 {
            return Err(TakeoutError::Config("--batch-size must be at least 1".into()));
        }

        Ok(Config {
            input: cli.input.clone(),
            output: cli.output.clone(),
            albums: cli.albums,
            divide_to_dates: cli.divide_to_dates,
            fix_extensions: cli.fix_extensions,
            write_exif: cli.write_exif,
            skip_extras: cli.skip_extras,
            guess_from_name: cli.guess_from_name,
            transform_pixel_mp: cli.transform_pixel_mp,
            update_creation_time: cli.update_creation_time,
            limit_filesize: cli.limit_filesize,
            divide_partner_shared: cli.divide_partner_shared,
            concurrency: cli.concurrency,
            batch_size: cli.batch_size,
        })
    }

    pub fn is_solo_extension_fix(&self) -> bool {
        matches!(self.fix_extensions, FixExtensions::Solo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["takeout-sort"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut c = cli(&["--input", "a", "--output", "b"]);
        c.concurrency = 0;
        assert!(Config::from_cli(&c).is_err());
    }

    #[test]
    fn accepts_minimal_args() {
        let c = cli(&["--input", "a", "--output", "b"]);
        let cfg = Config::from_cli(&c).unwrap();
        assert_eq!(cfg.input, PathBuf::from("a"));
        assert_eq!(cfg.output, PathBuf::from("b"));
        assert!(cfg.write_exif);
        assert!(cfg.guess_from_name);
    }
}
