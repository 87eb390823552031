//! Stage 1: extension correction (§4.4). Sniffs header bytes and renames files whose
//! extension disagrees with the detected content type, dragging the sidecar along.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::takeout_core::cli::FixExtensions;
use crate::takeout_core::config::Config;
use crate::takeout_core::media::{is_extra_file, is_media_file};
use crate::takeout_core::sidecar;

/// Infer the preferred extension for a file from its header bytes, skipping types we
/// deliberately never correct (TIFF, because many RAW formats misreport as TIFF).
fn preferred_extension(path: &Path) -> Option<&'static str> {
    let kind = infer::get_from_path(path).ok().flatten()?;
    let mime = kind.mime_type();
    if mime == "image/tiff" {
        return None;
    }
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/webp" => Some("webp"),
        "image/heif" => Some("heic"),
        "image/avif" => Some("avif"),
        "image/vnd.adobe.photoshop" => Some("psd"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/x-matroska" => Some("mkv"),
        "video/x-msvideo" => Some("avi"),
        _ => None,
    }
}

fn extensions_agree(path: &Path, preferred: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(preferred))
        .unwrap_or(false)
}

/// Runs stage 1 over `config.input`, returning the number of files fixed.
/// Under `FixExtensions::None` this is a no-op; `Solo` is handled by the pipeline
/// driver, which stops after this stage returns.
pub fn fix_extensions(config: &Config) -> usize {
    if matches!(config.fix_extensions, FixExtensions::None) {
        return 0;
    }
    let conservative = matches!(config.fix_extensions, FixExtensions::Conservative);

    let mut fixed = 0;
    let candidates: Vec<PathBuf> = WalkDir::new(&config.input)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_media_file(p))
        .collect();

    for path in candidates {
        if conservative && is_extra_file(&path) {
            continue;
        }
        if fix_one(&path).is_some() {
            fixed += 1;
        }
    }
    fixed
}

fn fix_one(path: &Path) -> Option<()> {
    let preferred = preferred_extension(path)?;
    if extensions_agree(path, preferred) {
        return None;
    }

    let sidecar_before = sidecar::find_sidecar(path, false);

    let old_name = path.file_name()?.to_str()?.to_string();
    let new_name = format!("{old_name}.{preferred}");
    let new_path = path.with_file_name(&new_name);

    match fs::rename(path, &new_path) {
        Ok(()) => debug!("fixed extension: {} -> {}", path.display(), new_path.display()),
        Err(e) => {
            warn!("failed to rename {}: {}", path.display(), e);
            return None;
        }
    }

    if new_path.exists() && path.exists() {
        let _ = fs::remove_file(path);
    }

    if let Some(sidecar_path) = sidecar_before
        && let Some(sidecar_name) = sidecar_path.file_name().and_then(|n| n.to_str()) {
            let new_sidecar_name = sidecar_name.replacen(&old_name, &new_name, 1);
            if new_sidecar_name != sidecar_name {
                let new_sidecar_path = sidecar_path.with_file_name(new_sidecar_name);
                if let Err(e) = fs::rename(&sidecar_path, &new_sidecar_path) {
                    warn!("failed to rename sidecar {}: {}", sidecar_path.display(), e);
                }
            }
        }

    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MINIMAL_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn renames_misnamed_png_and_sidecar() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        fs::write(&file, MINIMAL_PNG).unwrap();
        fs::write(dir.path().join("photo.jpg.json"), "{}").unwrap();

        fix_one(&file).unwrap();

        assert!(dir.path().join("photo.jpg.png").exists());
        assert!(!file.exists());
        assert!(dir.path().join("photo.jpg.png.json").exists());
    }

    #[test]
    fn agreeing_extension_is_left_alone() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("photo.png");
        fs::write(&file, MINIMAL_PNG).unwrap();
        assert!(fix_one(&file).is_none());
        assert!(file.exists());
    }
}
