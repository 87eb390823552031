//! Stage 8 driver (§4.8). Threads `Config` through stages 1-8 in strict sequence,
//! recording per-stage timing and counts, and produces the final run summary.

use std::time::{Duration, Instant};

use filetime_creation::FileTime;
use log::{info, warn};

use crate::takeout_core::cli::AlbumBehavior;
use crate::takeout_core::config::Config;
use crate::takeout_core::error::{Result, TakeoutError};
use crate::takeout_core::exif::{LittleExifWriter, MetadataWriter};
use crate::takeout_core::media::{AccuracyTier, Media, NONE_LABEL};
use crate::takeout_core::{album, dates, dedup, discovery, extension, mover};

#[derive(Debug, Default)]
pub struct StageTiming {
    pub name: &'static str,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub extensions_fixed: usize,
    pub discovered: usize,
    pub duplicates_removed: usize,
    pub datetimes_written: usize,
    pub coordinates_written: usize,
    pub creation_times_updated: usize,
    pub moved: usize,
    pub move_failures: usize,
    pub tier_histogram: [usize; 5],
    pub stage_timings: Vec<StageTiming>,
}

impl RunStats {
    fn record_tier(&mut self, tier: AccuracyTier) {
        self.tier_histogram[tier as usize] += 1;
    }

    /// Matches the reference crate's `Summary:`-block style (see `scan.rs`/`push.rs`).
    pub fn print_summary(&self) {
        println!("\n─────────────────────────────────");
        println!("Run Summary:");
        println!("  Extensions fixed:        {}", self.extensions_fixed);
        println!("  Media discovered:        {}", self.discovered);
        println!("  Duplicates removed:      {}", self.duplicates_removed);
        println!("  Datetimes written:       {}", self.datetimes_written);
        println!("  Coordinates written:     {}", self.coordinates_written);
        println!("  Creation times updated:  {}", self.creation_times_updated);
        println!("  Files moved:             {}", self.moved);
        println!("  Move failures:           {}", self.move_failures);
        println!(
            "  Date sources: json={} exif={} guess-name={} json-tryhard={} folder-year={}",
            self.tier_histogram[0],
            self.tier_histogram[1],
            self.tier_histogram[2],
            self.tier_histogram[3],
            self.tier_histogram[4],
        );
        for stage in &self.stage_timings {
            println!("  {:<24} {:.2?}", format!("{}:", stage.name), stage.elapsed);
        }
        println!("─────────────────────────────────\n");
    }
}

/// Runs the full pipeline. Returns `Ok(stats)` on success (including runs that hit
/// non-fatal per-file failures); `Err` only for stage-fatal conditions (§7).
pub fn run(config: &Config) -> Result<RunStats> {
    if !config.input.is_dir() {
        return Err(TakeoutError::InputNotFound(config.input.clone()));
    }

    let mut stats = RunStats::default();

    info!("stage 1: extension correction");
    let t = Instant::now();
    stats.extensions_fixed = extension::fix_extensions(config);
    stats.stage_timings.push(StageTiming { name: "Extension correction", elapsed: t.elapsed() });
    info!("fixed {} extensions", stats.extensions_fixed);

    if config.is_solo_extension_fix() {
        info!("solo mode: stopping after extension correction");
        return Ok(stats);
    }

    if config.transform_pixel_mp {
        let renamed = transform_pixel_motion_photos(config);
        info!("renamed {renamed} Pixel motion photos to .mp4");
    }

    info!("stage 2: discovery");
    let t = Instant::now();
    let mut collection = discovery::discover(config);
    stats.stage_timings.push(StageTiming { name: "Discovery", elapsed: t.elapsed() });
    stats.discovered = collection.len();
    if collection.is_empty() {
        return Err(TakeoutError::NoMediaFound(config.input.clone()));
    }
    info!("discovered {} media entities", collection.len());

    info!("stage 3: deduplication");
    let t = Instant::now();
    stats.duplicates_removed = dedup::dedupe(&mut collection, config);
    stats.stage_timings.push(StageTiming { name: "Deduplication", elapsed: t.elapsed() });
    info!("removed {} duplicates", stats.duplicates_removed);

    info!("stage 4: date extraction");
    let t = Instant::now();
    for media in collection.iter_mut() {
        let path = media.canonical_path().to_path_buf();
        if let Some((date, tier)) = dates::extract_date(&path, config.guess_from_name) {
            media.set_date(date, tier);
            stats.record_tier(tier);
        }
        if let Some(sidecar_path) = crate::takeout_core::sidecar::find_sidecar(&path, false)
            && let Some(json) = dates::parse_sidecar(&sidecar_path) {
                if media.coordinates.is_none() {
                    media.coordinates = dates::coordinates_from_sidecar(&json);
                }
                media.is_partner_shared |= dates::is_partner_shared(&json);
            }
    }
    stats.stage_timings.push(StageTiming { name: "Date extraction", elapsed: t.elapsed() });

    if config.write_exif {
        info!("stage 5: metadata write");
        let t = Instant::now();
        let writer = LittleExifWriter;
        for media in collection.iter() {
            let path = media.canonical_path();
            if let Some(date) = media.date_taken {
                match writer.write_datetime(path, date) {
                    Ok(true) => stats.datetimes_written += 1,
                    Ok(false) => {}
                    Err(e) => warn!("failed to write datetime for {}: {e}", path.display()),
                }
            }
            if let Some(coordinates) = media.coordinates {
                match writer.write_gps(path, coordinates) {
                    Ok(true) => stats.coordinates_written += 1,
                    Ok(false) => {}
                    Err(e) => warn!("failed to write gps for {}: {e}", path.display()),
                }
            }
        }
        stats.stage_timings.push(StageTiming { name: "Metadata write", elapsed: t.elapsed() });
    } else {
        info!("stage 5: metadata write skipped (--write-exif=false)");
    }

    info!("stage 6: album detection");
    let t = Instant::now();
    album::resolve_albums(&mut collection, config);
    stats.stage_timings.push(StageTiming { name: "Album detection", elapsed: t.elapsed() });

    if matches!(config.albums, AlbumBehavior::Nothing) {
        warn_on_dropped_special_folders(&collection);
    }

    info!("stage 7: moving");
    let t = Instant::now();
    let move_stats = mover::run(&collection, config);
    stats.stage_timings.push(StageTiming { name: "Moving", elapsed: t.elapsed() });
    stats.moved = move_stats.moved;
    stats.move_failures = move_stats.failures.len();
    if !move_stats.failures.is_empty() {
        warn!("{} files failed to move:\n{}", move_stats.failures.len(), move_stats.failures.summary());
    }

    if config.update_creation_time {
        info!("stage 8: creation-time sync");
        let t = Instant::now();
        stats.creation_times_updated = sync_creation_times(&collection, &move_stats.placements);
        stats.stage_timings.push(StageTiming { name: "Creation-time sync", elapsed: t.elapsed() });
    }

    Ok(stats)
}

/// `nothing` drops every entity lacking the NONE sentinel, plus any entity sourced
/// solely from Archive/Trash (those folders carry a NONE entry of their own, but the
/// §9 Open Question decision still treats them as droppable content). Warn before that
/// content is silently discarded.
fn warn_on_dropped_special_folders(collection: &[Media]) {
    let mut dropped = Vec::new();
    for media in collection {
        let special_only = media.files.values().all(|path| {
            path.parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .map(|name| name == "Archive" || name == "Trash")
                .unwrap_or(false)
        });
        if !media.files.contains_key(NONE_LABEL) || special_only {
            dropped.extend(media.files.values().cloned());
        }
    }
    if !dropped.is_empty() {
        warn!(
            "{} files have no canonical placement outside Archive/Trash and will be dropped under --albums nothing",
            dropped.len()
        );
    }
}

fn transform_pixel_motion_photos(config: &Config) -> usize {
    use std::fs;
    use walkdir::WalkDir;

    let mut renamed = 0;
    for entry in WalkDir::new(&config.input).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase());
        if ext.as_deref() != Some("mp") && ext.as_deref() != Some("mv") {
            continue;
        }
        let new_path = path.with_extension("mp4");
        if fs::rename(path, &new_path).is_ok() {
            renamed += 1;
        }
    }
    renamed
}

/// Patches filesystem creation time to the recovered date, at wherever stage 7 actually
/// placed each entity's bytes (`placements[i]`, `None` for entities stage 7 dropped).
/// `filetime_creation` exposes a real creation-time setter only on Windows; elsewhere
/// this is a documented no-op logged at info per §7's `PlatformUnsupported` policy.
fn sync_creation_times(
    collection: &[crate::takeout_core::media::Media],
    placements: &[Option<std::path::PathBuf>],
) -> usize {
    let mut updated = 0;
    for (media, placement) in collection.iter().zip(placements) {
        let Some(path) = placement else { continue };
        let Some(date) = media.date_taken else { continue };
        let unix_seconds = date.unix_timestamp();
        let file_time = FileTime::from_unix_time(unix_seconds, 0);

        match set_creation_time(path, file_time) {
            Ok(()) => updated += 1,
            Err(TakeoutError::PlatformUnsupported(msg)) => {
                info!("{msg}");
                return updated;
            }
            Err(e) => warn!("failed to sync creation time for {}: {e}", path.display()),
        }
    }
    updated
}

#[cfg(target_os = "windows")]
fn set_creation_time(path: &std::path::Path, time: FileTime) -> Result<()> {
    filetime_creation::set_file_ctime(path, time)?;
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn set_creation_time(_path: &std::path::Path, _time: FileTime) -> Result<()> {
    Err(TakeoutError::PlatformUnsupported(
        "filesystem creation-time patching is only available on Windows".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeout_core::cli::{AlbumBehavior, DateDivision, FixExtensions};
    use std::fs;
    use tempfile::tempdir;

    fn test_config(input: std::path::PathBuf, output: std::path::PathBuf) -> Config {
        Config {
            input,
            output,
            albums: AlbumBehavior::Shortcut,
            divide_to_dates: DateDivision::Year,
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
    fn end_to_end_scenario_folder_year_with_division() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let year_dir = input.path().join("Photos from 2023");
        fs::create_dir(&year_dir).unwrap();
        fs::write(year_dir.join("b.jpg"), b"some bytes").unwrap();

        let config = test_config(input.path().to_path_buf(), output.path().to_path_buf());
        let stats = run(&config).unwrap();

        assert_eq!(stats.discovered, 1);
        assert_eq!(stats.moved, 1);
        assert!(output.path().join("ALL_PHOTOS/2023/b.jpg").exists());
    }

    #[test]
    fn errors_on_missing_input() {
        let output = tempdir().unwrap();
        let config = test_config(std::path::PathBuf::from("/nonexistent/input"), output.path().to_path_buf());
        assert!(matches!(run(&config), Err(TakeoutError::InputNotFound(_))));
    }

    #[test]
    fn errors_on_empty_input_tree() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let config = test_config(input.path().to_path_buf(), output.path().to_path_buf());
        assert!(matches!(run(&config), Err(TakeoutError::NoMediaFound(_))));
    }
}
