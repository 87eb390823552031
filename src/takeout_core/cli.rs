use clap::{Parser, ValueEnum};
use simplelog::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Reorganize a Google Photos Takeout export into a clean library")]
pub struct Cli {
    /// Directory containing the extracted Takeout export
    #[arg(long, required = true)]
    pub input: PathBuf,

    /// Directory the reorganized library is written to
    #[arg(long, required = true)]
    pub output: PathBuf,

    /// How albums are represented in the output tree
    #[arg(long, value_enum, default_value_t = AlbumBehavior::Shortcut)]
    pub albums: AlbumBehavior,

    /// How deep to split ALL_PHOTOS by date
    #[arg(long = "divide-to-dates", value_enum, default_value_t = DateDivision::None)]
    pub divide_to_dates: DateDivision,

    /// Extension-correction mode run as stage 1
    #[arg(long = "fix-extensions", value_enum, default_value_t = FixExtensions::Standard)]
    pub fix_extensions: FixExtensions,

    /// Write recovered DateTime/GPS EXIF tags back into media files
    #[arg(long = "write-exif", default_value_t = true, action = clap::ArgAction::Set)]
    pub write_exif: bool,

    /// Skip "extra"/edited-variant files entirely during discovery
    #[arg(long)]
    pub skip_extras: bool,

    /// Attempt to extract a date from the filename when other sources fail
    #[arg(long = "guess-from-name", default_value_t = true, action = clap::ArgAction::Set)]
    pub guess_from_name: bool,

    /// Rename Pixel motion photos (.MP/.MV) to .mp4
    #[arg(long = "transform-pixel-mp")]
    pub transform_pixel_mp: bool,

    /// Patch filesystem creation time to the recovered date (platform-gated)
    #[arg(long = "update-creation-time")]
    pub update_creation_time: bool,

    /// Skip hashing/writing files larger than 64 MiB
    #[arg(long = "limit-filesize")]
    pub limit_filesize: bool,

    /// Route partner-shared media under PARTNER_SHARED instead of ALL_PHOTOS
    #[arg(long = "divide-partner-shared")]
    pub divide_partner_shared: bool,

    /// Raise terminal log verbosity to Info
    #[arg(long)]
    pub verbose: bool,

    /// Also write a log file at this path
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Log level for the file logger
    #[arg(long, default_value_t = LevelFilter::Debug)]
    pub log_level: LevelFilter,

    /// Maximum concurrent file operations in stages 3/6/7
    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,

    /// Batch size for stages 3/6/7
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlbumBehavior {
    Shortcut,
    ReverseShortcut,
    DuplicateCopy,
    Json,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DateDivision {
    #[value(alias = "0")]
    None,
    #[value(alias = "1")]
    Year,
    #[value(alias = "2")]
    Month,
    #[value(alias = "3")]
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FixExtensions {
    None,
    Standard,
    Conservative,
    Solo,
}
