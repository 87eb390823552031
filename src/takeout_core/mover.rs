//! Stage 7: materialize the output tree (§4.7). Dispatches on the configured album
//! behavior; batches entities through a rayon thread pool sized to `config.concurrency`
//! to cap file-handle pressure, mirroring the teacher's copy-phase progress/failure
//! bookkeeping. The canonical placement always consumes its source (`move_file`); any
//! additional album/symlink destinations are independent copies or links made from that
//! placed file, never from the original input path.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use log::error;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use time::OffsetDateTime;

use crate::takeout_core::cli::{AlbumBehavior, DateDivision};
use crate::takeout_core::config::Config;
use crate::takeout_core::media::Media;

const ALL_PHOTOS: &str = "ALL_PHOTOS";
const ALBUMS: &str = "ALBUMS";
const PARTNER_SHARED: &str = "PARTNER_SHARED";

#[derive(Debug, Default)]
pub struct MoveFailures(Vec<(PathBuf, PathBuf, String)>);

impl MoveFailures {
    fn add(&mut self, source: PathBuf, destination: PathBuf, error: String) {
        self.0.push((source, destination, error));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Summary line per §4.7: up to five errors then "... and N more".
    pub fn summary(&self) -> String {
        let shown: Vec<String> = self
            .0
            .iter()
            .take(5)
            .map(|(src, dst, err)| format!("{} -> {}: {}", src.display(), dst.display(), err))
            .collect();
        let mut out = shown.join("\n");
        if self.0.len() > 5 {
            out.push_str(&format!("\n... and {} more", self.0.len() - 5));
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct MoveStats {
    pub moved: usize,
    pub failures: MoveFailures,
    /// Final on-disk path per input entity, indexed in parallel with the `collection`
    /// slice passed to `run`. `None` for entities dropped (e.g. `nothing` album-only).
    pub placements: Vec<Option<PathBuf>>,
}

#[derive(Serialize)]
struct JsonIndexEntry {
    path: String,
    albums: Vec<String>,
    date_taken: Option<String>,
    coordinates: Option<(f64, f64)>,
    is_partner_shared: bool,
}

fn date_path(date: Option<OffsetDateTime>, division: DateDivision) -> PathBuf {
    match (date, division) {
        (_, DateDivision::None) => PathBuf::new(),
        (None, DateDivision::Year) => PathBuf::from("UNKNOWN_DATE"),
        (None, DateDivision::Month) => PathBuf::from("UNKNOWN_DATE/UNKNOWN_MONTH"),
        (None, DateDivision::Day) => PathBuf::from("UNKNOWN_DATE/UNKNOWN_MONTH/UNKNOWN_DAY"),
        (Some(d), DateDivision::Year) => PathBuf::from(format!("{:04}", d.year())),
        (Some(d), DateDivision::Month) => {
            PathBuf::from(format!("{:04}/{:02}", d.year(), u8::from(d.month())))
        }
        (Some(d), DateDivision::Day) => PathBuf::from(format!(
            "{:04}/{:02}/{:02}",
            d.year(),
            u8::from(d.month()),
            d.day()
        )),
    }
}

/// Resolve name collisions by appending ` (1)`, ` (2)`, ... before the extension.
fn unique_destination(dest: &Path, reserved: &Mutex<HashSet<PathBuf>>) -> PathBuf {
    let mut guard = reserved.lock().unwrap();
    if !dest.exists() && !guard.contains(dest) {
        guard.insert(dest.to_path_buf());
        return dest.to_path_buf();
    }

    let stem = dest.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = dest.extension().and_then(|s| s.to_str());
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));

    let mut n = 1;
    loop {
        let candidate_name = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() && !guard.contains(&candidate) {
            guard.insert(candidate.clone());
            return candidate;
        }
        n += 1;
    }
}

fn root_for(media: &Media, config: &Config) -> &'static str {
    if config.divide_partner_shared && media.is_partner_shared {
        PARTNER_SHARED
    } else {
        ALL_PHOTOS
    }
}

fn canonical_destination(media: &Media, config: &Config) -> PathBuf {
    let root = root_for(media, config);
    let filename = media
        .canonical_path()
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_default();
    config
        .output
        .join(root)
        .join(date_path(media.date_taken, config.divide_to_dates))
        .join(filename)
}

/// Move one entity under the `shortcut` strategy: canonical file under ALL_PHOTOS,
/// symlinks from ALBUMS/<label>/ pointing back into it. Returns the final path holding
/// the bytes, for downstream stages (e.g. creation-time sync) that run after the move.
fn move_shortcut(media: &Media, config: &Config, reserved: &Mutex<HashSet<PathBuf>>) -> Result<PathBuf, String> {
    let canonical_src = media.canonical_path();
    let canonical_dst = unique_destination(&canonical_destination(media, config), reserved);
    move_file(canonical_src, &canonical_dst)?;

    for label in media.album_labels() {
        let filename = canonical_dst.file_name().map(PathBuf::from).unwrap_or_default();
        let link_path = unique_destination(
            &config.output.join(ALBUMS).join(label).join(&filename),
            reserved,
        );
        symlink_relative(&canonical_dst, &link_path)?;
    }
    Ok(canonical_dst)
}

/// `reverse-shortcut`: canonical file lives under the first album, duplicated into
/// every other album; ALL_PHOTOS holds a symlink back. The source is consumed into the
/// primary album slot; every other album copy is made from that placed file. Returns
/// the primary album path, which is where the actual bytes now live.
fn move_reverse_shortcut(
    media: &Media,
    config: &Config,
    reserved: &Mutex<HashSet<PathBuf>>,
) -> Result<PathBuf, String> {
    let canonical_src = media.canonical_path();
    let labels: Vec<&str> = media.album_labels().collect();

    let Some(first) = labels.first() else {
        return move_shortcut(media, config, reserved); // no albums: behaves like shortcut
    };

    let filename = canonical_src.file_name().map(PathBuf::from).unwrap_or_default();
    let primary_dst = unique_destination(
        &config.output.join(ALBUMS).join(first).join(&filename),
        reserved,
    );
    move_file(canonical_src, &primary_dst)?;

    for label in &labels[1..] {
        let dst = unique_destination(
            &config.output.join(ALBUMS).join(label).join(&filename),
            reserved,
        );
        copy_file(&primary_dst, &dst)?;
    }

    if media.has_none() || !labels.is_empty() {
        let all_photos_dst = unique_destination(&canonical_destination(media, config), reserved);
        symlink_relative(&primary_dst, &all_photos_dst)?;
    }
    Ok(primary_dst)
}

/// `duplicate-copy`: an independent byte copy at every destination, including a
/// canonical copy under ALL_PHOTOS even for entities with no NONE entry (§8 scenario 2).
/// The source is consumed into the ALL_PHOTOS slot; every album copy is made from that
/// placed file, so each destination still ends up holding an independent byte copy.
fn move_duplicate_copy(media: &Media, config: &Config, reserved: &Mutex<HashSet<PathBuf>>) -> Result<PathBuf, String> {
    let canonical_src = media.canonical_path();

    let dst = unique_destination(&canonical_destination(media, config), reserved);
    move_file(canonical_src, &dst)?;

    for label in media.album_labels() {
        let filename = dst.file_name().map(PathBuf::from).unwrap_or_default();
        let album_dst = unique_destination(
            &config.output.join(ALBUMS).join(label).join(&filename),
            reserved,
        );
        copy_file(&dst, &album_dst)?;
    }
    Ok(dst)
}

/// `json`: flat placement under ALL_PHOTOS; album membership recorded in metadata.json
/// instead of directory structure.
fn move_json(media: &Media, config: &Config, reserved: &Mutex<HashSet<PathBuf>>) -> Result<PathBuf, String> {
    let canonical_src = media.canonical_path();
    let dst = unique_destination(&canonical_destination(media, config), reserved);
    move_file(canonical_src, &dst)?;
    Ok(dst)
}

/// `nothing`: only entities carrying the NONE sentinel get moved; album-only entities
/// are intentionally dropped (§4.7's sole data-loss behavior). Per the §9 Open Question
/// decision, content sourced solely from Archive/Trash is dropped too, even though those
/// folders contribute no album label and so still carry a NONE entry from discovery.
/// Returns `Ok(None)` for a dropped entity so the caller doesn't count it as a move.
fn move_nothing(media: &Media, config: &Config, reserved: &Mutex<HashSet<PathBuf>>) -> Result<Option<PathBuf>, String> {
    if !media.has_none() || is_special_folder_only(media) {
        return Ok(None);
    }
    let canonical_src = media.canonical_path();
    let dst = unique_destination(&canonical_destination(media, config), reserved);
    move_file(canonical_src, &dst)?;
    Ok(Some(dst))
}

/// True when every source path backing this entity sits directly under an Archive or
/// Trash folder, i.e. it has no presence outside the Special folders (§3).
fn is_special_folder_only(media: &Media) -> bool {
    media.files.values().all(|path| {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(|name| name == "Archive" || name == "Trash")
            .unwrap_or(false)
    })
}

/// Consumes `source`: renames it into place, falling back to copy-then-remove when the
/// destination sits on a different filesystem (`fs::rename` returns `EXDEV`).
fn move_file(source: &Path, destination: &Path) -> Result<(), String> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    fs::copy(source, destination).map_err(|e| e.to_string())?;
    fs::remove_file(source).map_err(|e| e.to_string())
}

fn copy_file(source: &Path, destination: &Path) -> Result<(), String> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::copy(source, destination).map(|_| ()).map_err(|e| e.to_string())
}

fn symlink_relative(target: &Path, link: &Path) -> Result<(), String> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let relative = pathdiff(link.parent().unwrap_or(Path::new(".")), target);
    symlink::symlink_file(&relative, link).map_err(|e| e.to_string())
}

/// Minimal relative-path diff: target expressed relative to `from`.
fn pathdiff(from: &Path, target: &Path) -> PathBuf {
    let from_components: Vec<_> = from.components().collect();
    let target_components: Vec<_> = target.components().collect();
    let mut common = 0;
    while common < from_components.len()
        && common < target_components.len()
        && from_components[common] == target_components[common]
    {
        common += 1;
    }
    let mut result = PathBuf::new();
    for _ in common..from_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component.as_os_str());
    }
    result
}

/// Runs stage 7 over the collection, returning move statistics. For `json` album
/// behavior also writes `metadata.json` at the output root once all moves land.
pub fn run(collection: &[Media], config: &Config) -> MoveStats {
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.concurrency)
        .build()
        .expect("thread pool construction should not fail for a positive thread count");

    let bar_style = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(collection.len() as u64).with_style(bar_style);
    bar.set_message("Moving files");

    let reserved: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());
    let failures: Mutex<MoveFailures> = Mutex::new(MoveFailures::default());
    let moved = Mutex::new(0usize);
    let placements: Mutex<Vec<Option<PathBuf>>> = Mutex::new(vec![None; collection.len()]);

    let indexed: Vec<(usize, &Media)> = collection.iter().enumerate().collect();
    for batch in indexed.chunks(config.batch_size) {
        pool.install(|| {
            use rayon::prelude::*;
            batch.par_iter().for_each(|&(idx, media)| {
                let result = match config.albums {
                    AlbumBehavior::Shortcut => move_shortcut(media, config, &reserved).map(Some),
                    AlbumBehavior::ReverseShortcut => {
                        move_reverse_shortcut(media, config, &reserved).map(Some)
                    }
                    AlbumBehavior::DuplicateCopy => {
                        move_duplicate_copy(media, config, &reserved).map(Some)
                    }
                    AlbumBehavior::Json => move_json(media, config, &reserved).map(Some),
                    AlbumBehavior::Nothing => move_nothing(media, config, &reserved),
                };
                match result {
                    Ok(Some(path)) => {
                        *moved.lock().unwrap() += 1;
                        placements.lock().unwrap()[idx] = Some(path);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("failed to move {}: {}", media.canonical_path().display(), e);
                        failures.lock().unwrap().add(
                            media.canonical_path().to_path_buf(),
                            config.output.clone(),
                            e,
                        );
                    }
                }
                bar.inc(1);
            });
        });
    }
    bar.finish_with_message("Move complete");

    if matches!(config.albums, AlbumBehavior::Json)
        && let Err(e) = write_json_index(collection, config) {
            error!("failed to write metadata.json: {e}");
        }

    MoveStats {
        moved: moved.into_inner().unwrap(),
        failures: failures.into_inner().unwrap(),
        placements: placements.into_inner().unwrap(),
    }
}

fn write_json_index(collection: &[Media], config: &Config) -> std::io::Result<()> {
    let entries: Vec<JsonIndexEntry> = collection
        .iter()
        .map(|m| JsonIndexEntry {
            path: canonical_destination(m, config).to_string_lossy().into_owned(),
            albums: m.album_labels().map(|s| s.to_string()).collect(),
            date_taken: m.date_taken.map(|d| d.to_string()),
            coordinates: m.coordinates,
            is_partner_shared: m.is_partner_shared,
        })
        .collect();
    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(config.output.join("metadata.json"), json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeout_core::cli::FixExtensions;
    use std::fs;
    use tempfile::tempdir;

    fn test_config(output: PathBuf, albums: AlbumBehavior) -> Config {
        Config {
            input: PathBuf::new(),
            output,
            albums,
            divide_to_dates: DateDivision::None,
            fix_extensions: FixExtensions::Standard,
            write_exif: false,
            skip_extras: false,
            guess_from_name: true,
            transform_pixel_mp: false,
            update_creation_time: false,
            limit_filesize: false,
            divide_partner_shared: false,
            concurrency: 2,
            batch_size: 10,
        }
    }

    #[test]
    fn name_collision_appends_counter() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        let reserved = Mutex::new(HashSet::new());
        let first = unique_destination(&dir.path().join("a.jpg"), &reserved);
        assert_eq!(first, dir.path().join("a (1).jpg"));
    }

    #[test]
    fn duplicate_copy_places_file_in_every_album_and_all_photos() {
        let src_dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        let media_path = src_dir.path().join("a.jpg");
        fs::write(&media_path, b"bytes").unwrap();

        let mut media = Media::new(media_path.clone());
        media.files.insert("Vacation".to_string(), media_path.clone());
        media.files.insert("Trip".to_string(), media_path);

        let config = test_config(out_dir.path().to_path_buf(), AlbumBehavior::DuplicateCopy);
        let stats = run(&[media], &config);

        assert!(stats.failures.is_empty());
        assert!(out_dir.path().join("ALL_PHOTOS/a.jpg").exists());
        assert!(out_dir.path().join("ALBUMS/Vacation/a.jpg").exists());
        assert!(out_dir.path().join("ALBUMS/Trip/a.jpg").exists());
    }

    #[test]
    fn shortcut_behavior_consumes_the_source_file() {
        let src_dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        let media_path = src_dir.path().join("a.jpg");
        fs::write(&media_path, b"bytes").unwrap();

        let media = Media::new(media_path.clone());
        let config = test_config(out_dir.path().to_path_buf(), AlbumBehavior::Shortcut);
        let stats = run(&[media], &config);

        assert!(stats.failures.is_empty());
        assert!(out_dir.path().join("ALL_PHOTOS/a.jpg").exists());
        assert!(!media_path.exists());
    }

    #[test]
    fn nothing_behavior_skips_album_only_entities() {
        let src_dir = tempdir().unwrap();
        let out_dir = tempdir().unwrap();
        let media_path = src_dir.path().join("a.jpg");
        fs::write(&media_path, b"bytes").unwrap();

        let mut media = Media::new(media_path.clone());
        media.files.clear();
        media.files.insert("Vacation".to_string(), media_path);

        let config = test_config(out_dir.path().to_path_buf(), AlbumBehavior::Nothing);
        let stats = run(&[media], &config);

        assert_eq!(stats.moved, 0);
        assert!(!out_dir.path().join("ALL_PHOTOS").exists());
    }
}
