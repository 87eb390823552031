//! Sidecar JSON matcher: a cascade of filename-mangling transforms guarding against
//! truncation, extension-fixing and numbering mismatches introduced by Google Takeout
//! and by our own stage-1 extension correction.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::takeout_core::media::EXTRA_SUFFIX_MARKERS;

/// Extensions a prior extension-fix run may have appended after the "heavy" original,
/// and their reverse: `IMG.jpg.heic` <-> `IMG.HEIC.jpg`-shaped mismatches (§4.1 transform 4).
const HEAVY_EXTENSIONS: &[&str] = &[
    "heic", "heif", "tiff", "tif", "webp", "avif", "cr2", "dng", "arw", "nef", "raf", "crw",
    "cr3", "nrw",
];
const LIGHT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const MAX_STEM_LEN: usize = 46; // 51 - len(".json")

/// Locate the sidecar JSON for a media file. Pure: never mutates the filesystem.
pub fn find_sidecar(media_path: &Path, try_hard: bool) -> Option<PathBuf> {
    let dir = media_path.parent()?;
    let name = media_path.file_name()?.to_str()?;

    for candidate in candidate_basenames(name, try_hard) {
        if let Some(found) = probe(dir, &candidate) {
            return Some(found);
        }
    }
    None
}

/// Generate, in decreasing-reliability order, the basenames the matcher should probe.
fn candidate_basenames(name: &str, try_hard: bool) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |s: Option<String>| {
        if let Some(s) = s
            && !out.contains(&s) {
                out.push(s);
            }
    };

    push(Some(name.to_string()));
    push(shorten(name));
    push(bracket_swap(name));
    push(extension_fix_reverse(name));
    push(Some(drop_extension(name)));
    push(extra_suffix_removal(name));

    if try_hard {
        push(partial_extra_suffix(name));
        push(partial_extension_restore(name));
        push(edge_case_pattern(name));
        push(digit_removal(name));
    }

    out
}

/// Transform 2: shorten long basenames (Google truncated sidecar JSON filenames to fit
/// filesystem name-length limits).
fn shorten(name: &str) -> Option<String> {
    if name.len() + ".json".len() <= 51 {
        return None;
    }
    let truncated: String = name.chars().take(MAX_STEM_LEN).collect();
    Some(truncated)
}

/// Transform 3: `image(11).jpg` -> `image.jpg(11)`.
fn bracket_swap(name: &str) -> Option<String> {
    let re = Regex::new(r"^(.+)\((\d+)\)(\.[^.]+)$").unwrap();
    let caps = re.captures(name)?;
    Some(format!("{}{}({})", &caps[1], &caps[3], &caps[2]))
}

/// Transform 4: undo an extension-fix double extension, either order, preserving the
/// `(N)` position relative to the reconstructed extension.
fn extension_fix_reverse(name: &str) -> Option<String> {
    let light_group = LIGHT_EXTENSIONS.join("|");
    let heavy_group = HEAVY_EXTENSIONS.join("|");

    // pattern: base(N)?.light.heavy  -> base.HEAVY(N)?
    let forward = Regex::new(&format!(
        r"(?i)^(.+?)(\((\d+)\))?\.({light_group})\.({heavy_group})$"
    ))
    .unwrap();
    if let Some(caps) = forward.captures(name) {
        let base = &caps[1];
        let n = caps.get(3);
        let heavy = caps[5].to_uppercase();
        return Some(match n {
            Some(n) => format!("{base}.{heavy}({})", n.as_str()),
            None => format!("{base}.{heavy}"),
        });
    }

    // pattern: base(N)?.heavy.light -> base.HEAVY(N)?
    let reverse = Regex::new(&format!(
        r"(?i)^(.+?)(\((\d+)\))?\.({heavy_group})\.({light_group})$"
    ))
    .unwrap();
    if let Some(caps) = reverse.captures(name) {
        let base = &caps[1];
        let n = caps.get(3);
        let heavy = caps[4].to_uppercase();
        return Some(match n {
            Some(n) => format!("{base}.{heavy}({})", n.as_str()),
            None => format!("{base}.{heavy}"),
        });
    }

    None
}

/// Transform 5: drop the extension entirely.
fn drop_extension(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[..idx].to_string(),
        None => name.to_string(),
    }
}

/// Transform 6: strip a localized "edited" marker plus optional `(N)`, after NFC
/// normalization (some filesystems deliver NFD-decomposed names).
fn extra_suffix_removal(name: &str) -> Option<String> {
    let normalized: String = name.nfc().collect();
    let stem = drop_extension(&normalized);
    let (base, suffix) = split_trailing_number(&stem);
    for marker in EXTRA_SUFFIX_MARKERS {
        if let Some(trimmed) = base.strip_suffix(marker) {
            return Some(format!("{trimmed}{suffix}"));
        }
    }
    None
}

/// Transform 7 (try-hard): strip any >=2 char leading prefix of a known marker found
/// truncated at the end of the stem.
fn partial_extra_suffix(name: &str) -> Option<String> {
    let stem = drop_extension(name);
    let (base, suffix) = split_trailing_number(&stem);
    for marker in EXTRA_SUFFIX_MARKERS {
        let chars: Vec<char> = marker.chars().collect();
        for len in (2..chars.len()).rev() {
            let partial: String = chars[..len].iter().collect();
            if base.ends_with(&partial) {
                let trimmed = &base[..base.len() - partial.len()];
                return Some(format!("{trimmed}{suffix}"));
            }
        }
    }
    None
}

/// Transform 8 (try-hard): after stripping a partial marker, also restore a truncated
/// extension from the candidate table if the remaining stem ends mid-extension.
fn partial_extension_restore(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
    if HEAVY_EXTENSIONS.contains(&ext.as_str()) || LIGHT_EXTENSIONS.contains(&ext.as_str()) {
        return None; // already a full known extension, nothing to restore
    }
    for candidate in HEAVY_EXTENSIONS.iter().chain(LIGHT_EXTENSIONS.iter()) {
        if candidate.starts_with(&ext) && ext.len() >= 2 {
            let stem = drop_extension(name);
            return Some(format!("{stem}.{candidate}"));
        }
    }
    None
}

/// Transform 9 (try-hard): edge-case truncations not covered by the other transforms —
/// a trailing single hyphen or underscore left over from a stripped suffix.
fn edge_case_pattern(name: &str) -> Option<String> {
    let stem = drop_extension(name);
    let trimmed = stem.trim_end_matches(['-', '_']);
    if trimmed.len() != stem.len() {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// Transform 10 (try-hard): strip a single-digit `(\d)\.` pattern (e.g. inside a
/// truncated stem), single digit only.
fn digit_removal(name: &str) -> Option<String> {
    let re = Regex::new(r"\(\d\)\.").unwrap();
    if re.is_match(name) {
        Some(re.replace(name, ".").to_string())
    } else {
        None
    }
}

fn split_trailing_number(stem: &str) -> (&str, String) {
    let re = Regex::new(r"^(.*)(\(\d+\))$").unwrap();
    match re.captures(stem) {
        Some(caps) => (
            stem[..caps.get(1).unwrap().end()].trim_end(),
            caps[2].to_string(),
        ),
        None => (stem, String::new()),
    }
}

/// Probe the five recognized sidecar suffix patterns for one candidate basename.
fn probe(dir: &Path, candidate: &str) -> Option<PathBuf> {
    let direct = dir.join(format!("{candidate}.supplemental-metadata.json"));
    if direct.is_file() {
        return Some(direct);
    }
    let direct = dir.join(format!("{candidate}.json"));
    if direct.is_file() {
        return Some(direct);
    }

    let re = Regex::new(r"^(.+)\((\d+)\)$").unwrap();
    if let Some(caps) = re.captures(candidate) {
        let base = &caps[1];
        let n = &caps[2];
        let p1 = dir.join(format!("{base}.supplemental-metadata({n}).json"));
        if p1.is_file() {
            return Some(p1);
        }
        let p2 = dir.join(format!("{base}({n}).json"));
        if p2.is_file() {
            return Some(p2);
        }
    }

    case_insensitive_scan(dir, candidate)
}

fn case_insensitive_scan(dir: &Path, candidate: &str) -> Option<PathBuf> {
    let target_a = format!("{candidate}.supplemental-metadata.json").to_lowercase();
    let target_b = format!("{candidate}.json").to_lowercase();
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let lower = name.to_lowercase();
        if lower == target_a || lower == target_b {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn identity_matches_plain_json() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("image.jpg.json")).unwrap();
        let media = dir.path().join("image.jpg");
        File::create(&media).unwrap();
        assert_eq!(find_sidecar(&media, false), Some(dir.path().join("image.jpg.json")));
    }

    #[test]
    fn bracket_swap_resolves_numbered_json() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("image.jpg(11).json")).unwrap();
        let media = dir.path().join("image(11).jpg");
        File::create(&media).unwrap();
        assert_eq!(
            find_sidecar(&media, false),
            Some(dir.path().join("image.jpg(11).json"))
        );
    }

    #[test]
    fn extension_fix_reverse_resolves_heic_supplemental() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("IMG_2367.HEIC.supplemental-metadata(1).json")).unwrap();
        let media = dir.path().join("IMG_2367(1).jpg.heic");
        File::create(&media).unwrap();
        assert_eq!(
            find_sidecar(&media, false),
            Some(dir.path().join("IMG_2367.HEIC.supplemental-metadata(1).json"))
        );
    }

    #[test]
    fn extension_fix_reverse_handles_heic_then_jpg_order() {
        let name = "IMG_2367.heic.jpg";
        assert_eq!(extension_fix_reverse(name), Some("IMG_2367.HEIC".to_string()));
    }

    #[test]
    fn shortening_triggers_exactly_at_boundary() {
        let at_limit: String = "a".repeat(42) + ".jpg"; // len 46, +".json" = 51: not over
        assert!(shorten(&at_limit).is_none());
        let over_limit: String = "a".repeat(43) + ".jpg"; // len 47, +".json" = 52: over
        assert!(shorten(&over_limit).is_some());
    }

    #[test]
    fn extra_suffix_removal_strips_marker() {
        assert_eq!(
            extra_suffix_removal("photo-edited.jpg"),
            Some("photo".to_string())
        );
        assert_eq!(
            extra_suffix_removal("photo-edited(1).jpg"),
            Some("photo(1)".to_string())
        );
    }

    #[test]
    fn digit_removal_only_single_digit() {
        assert_eq!(digit_removal("image(2).png"), Some("image.png".to_string()));
        assert_eq!(digit_removal("image(23).png"), None);
    }

    #[test]
    fn try_hard_is_superset_of_basic() {
        let basic = candidate_basenames("photo.jpg", false);
        let aggressive = candidate_basenames("photo.jpg", true);
        assert!(aggressive.len() >= basic.len());
        for c in &basic {
            assert!(aggressive.contains(c));
        }
    }

    #[test]
    fn matcher_is_idempotent() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.jpg.json")).unwrap();
        let media = dir.path().join("a.jpg");
        File::create(&media).unwrap();
        let first = find_sidecar(&media, true);
        let second = find_sidecar(&media, true);
        assert_eq!(first, second);
    }

    #[test]
    fn case_insensitive_scan_matches() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("Image.JPG.Json")).unwrap();
        let media = dir.path().join("Image.JPG");
        File::create(&media).unwrap();
        assert!(find_sidecar(&media, false).is_some());
    }
}
