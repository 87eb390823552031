//! Stage 2: walk the input tree, classify directories, and build the initial Media
//! Collection (§3 Folder Classification, §4.8 stage table).

use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

use crate::takeout_core::config::Config;
use crate::takeout_core::media::{is_extra_file, is_media_file, Media};

pub const SPECIAL_FOLDERS: &[&str] = &["Archive", "Trash", "Screenshots", "Camera"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderClass {
    Year,
    Special,
    Album,
    Other,
}

fn year_folder_re() -> Regex {
    Regex::new(r"^Photos from (18|19|20)\d{2}$").unwrap()
}

/// Classify a directory by name and contents (album detection needs a contents probe
/// because any non-reserved directory holding media counts as an album).
pub fn classify_folder(dir: &Path) -> FolderClass {
    let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if year_folder_re().is_match(name) {
        return FolderClass::Year;
    }
    if SPECIAL_FOLDERS.contains(&name) {
        return FolderClass::Special;
    }

    let has_media = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false) && is_media_file(&e.path()))
        })
        .unwrap_or(false);

    if has_media {
        FolderClass::Album
    } else {
        FolderClass::Other
    }
}

/// The album label a media file should carry, given the directory it was discovered in.
/// Year/Special/Other folders contribute no album label (canonical/NONE only); only
/// genuine album folders do.
pub fn album_label_for(dir: &Path) -> Option<String> {
    match classify_folder(dir) {
        FolderClass::Album => dir.file_name().map(|n| n.to_string_lossy().into_owned()),
        _ => None,
    }
}

/// Walk `config.input`, returning one `Media` per discovered media file (sidecars and
/// non-media files are skipped; extras are skipped entirely when `--skip-extras` is set).
pub fn discover(config: &Config) -> Vec<Media> {
    let mut out = Vec::new();

    for entry in WalkDir::new(&config.input).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_media_file(path) {
            continue;
        }
        if config.skip_extras && is_extra_file(path) {
            continue;
        }

        let mut media = Media::new(path.to_path_buf());
        if let Some(parent) = path.parent()
            && let Some(label) = album_label_for(parent) {
                media.files.clear();
                media.files.insert(label, path.to_path_buf());
            }
        out.push(media);
    }

    out
}
