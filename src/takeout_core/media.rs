use std::collections::HashMap;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

/// Sentinel album label for a media's canonical, album-independent placement.
pub const NONE_LABEL: &str = "__NONE__";

/// How reliable a recovered date is. Lower is better; mirrors the priority order
/// of the extractor chain in `dates.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccuracyTier {
    Json = 0,
    Exif = 1,
    GuessName = 2,
    JsonTryHard = 3,
    FolderYear = 4,
}

/// One logical photo or video, possibly referenced from several album folders.
#[derive(Debug, Clone)]
pub struct Media {
    /// Album label -> concrete path holding byte-identical content.
    /// `NONE_LABEL` is the canonical, album-independent entry.
    pub files: HashMap<String, PathBuf>,
    pub date_taken: Option<OffsetDateTime>,
    pub accuracy_tier: Option<AccuracyTier>,
    pub coordinates: Option<(f64, f64)>,
    pub is_partner_shared: bool,
    pub content_hash: Option<String>,
}

impl Media {
    pub fn new(path: PathBuf) -> Self {
        let mut files = HashMap::new();
        files.insert(NONE_LABEL.to_string(), path);
        Media {
            files,
            date_taken: None,
            accuracy_tier: None,
            coordinates: None,
            is_partner_shared: false,
            content_hash: None,
        }
    }

    /// The file used for hashing, EXIF reads/writes and general "this is the file" purposes.
    pub fn canonical_path(&self) -> &Path {
        self.files
            .get(NONE_LABEL)
            .or_else(|| self.files.values().next())
            .expect("a Media always has at least one file entry")
    }

    pub fn album_labels(&self) -> impl Iterator<Item = &str> {
        self.files.keys().filter(|k| k.as_str() != NONE_LABEL).map(|s| s.as_str())
    }

    pub fn has_none(&self) -> bool {
        self.files.contains_key(NONE_LABEL)
    }

    pub fn set_date(&mut self, date: OffsetDateTime, tier: AccuracyTier) {
        self.date_taken = Some(date);
        self.accuracy_tier = Some(tier);
    }

    /// Merge another entity's album files and metadata into this one (the dedup survivor).
    pub fn absorb(&mut self, other: Media) {
        for (label, path) in other.files {
            if label == NONE_LABEL && self.has_none() {
                continue;
            }
            self.files.entry(label).or_insert(path);
        }
        if self.date_taken.is_none() {
            self.date_taken = other.date_taken;
            self.accuracy_tier = other.accuracy_tier;
        } else if let (Some(mine), Some(theirs)) = (self.accuracy_tier, other.accuracy_tier)
            && theirs < mine {
                self.accuracy_tier = Some(theirs);
                self.date_taken = other.date_taken;
            }
        if self.coordinates.is_none() {
            self.coordinates = other.coordinates;
        }
        self.is_partner_shared = self.is_partner_shared || other.is_partner_shared;
    }
}

/// Image formats EXIF can be written into (§4.6).
pub const EXIF_WRITABLE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tga", "pvr", "ico"];

/// Extensions recognized as media outside of MIME sniffing (§3 recognition rule).
const EXTRA_MEDIA_EXTENSIONS: &[&str] = &["mp", "mv", "dng", "cr2"];

/// True if MIME type begins with image/ or video/, extension is in the extra set,
/// or MIME is exactly model/vnd.mts (Sony MTS clips misreported by mime_guess).
pub fn is_media_file(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext_lower = ext.to_lowercase();
        if EXTRA_MEDIA_EXTENSIONS.contains(&ext_lower.as_str()) {
            return true;
        }
    }

    let guess = mime_guess::from_path(path).first();
    match guess {
        Some(mime) => {
            let essence = mime.essence_str();
            essence.starts_with("image/") || essence.starts_with("video/") || essence == "model/vnd.mts"
        }
        None => false,
    }
}

/// Extra/"edited" filename markers, localized. Used by the sidecar matcher (transform 6/7)
/// and by `--skip-extras` discovery filtering.
pub const EXTRA_SUFFIX_MARKERS: &[&str] = &[
    "-edited",
    "-edytowane",
    "-bearbeitet",
    "-modifié",
    "-modificato",
    "-編集済み",
    "-изменено",
    "-편집됨",
    "-ha editado",
    "-bewerkt",
    "-redigert",
    "-muokattu",
    "-redigerad",
    "-upravené",
    "-szerkesztett",
    "-editat",
];

/// True if the basename (without directory) ends in a known "extra" marker, optionally
/// followed by a `(N)` numbering suffix.
pub fn is_extra_file(path: &Path) -> bool {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let stem = strip_trailing_number(stem);
    EXTRA_SUFFIX_MARKERS.iter().any(|m| stem.ends_with(m))
}

fn strip_trailing_number(stem: &str) -> &str {
    if let Some(open) = stem.rfind('(')
        && stem.ends_with(')') && stem[open + 1..stem.len() - 1].chars().all(|c| c.is_ascii_digit())
        {
            return &stem[..open];
        }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_image_and_video_mime() {
        assert!(is_media_file(Path::new("photo.jpg")));
        assert!(is_media_file(Path::new("video.mp4")));
        assert!(is_media_file(Path::new("clip.mov")));
    }

    #[test]
    fn detects_extra_media_extensions() {
        assert!(is_media_file(Path::new("motion.MP")));
        assert!(is_media_file(Path::new("raw.CR2")));
        assert!(is_media_file(Path::new("raw.dng")));
    }

    #[test]
    fn rejects_non_media() {
        assert!(!is_media_file(Path::new("sidecar.json")));
        assert!(!is_media_file(Path::new("readme.txt")));
    }

    #[test]
    fn extra_file_detection_strips_numbering() {
        assert!(is_extra_file(Path::new("IMG_001-edited.jpg")));
        assert!(is_extra_file(Path::new("IMG_001-edited(1).jpg")));
        assert!(!is_extra_file(Path::new("IMG_001.jpg")));
    }

    #[test]
    fn absorb_merges_album_labels_without_overwriting_none() {
        let mut survivor = Media::new(PathBuf::from("/out/a.jpg"));
        let mut loser = Media::new(PathBuf::from("/in/Vacation/a.jpg"));
        loser.files.clear();
        loser.files.insert("Vacation".to_string(), PathBuf::from("/in/Vacation/a.jpg"));
        survivor.absorb(loser);
        assert_eq!(
            survivor.files.get("Vacation"),
            Some(&PathBuf::from("/in/Vacation/a.jpg"))
        );
        assert!(survivor.has_none());
    }
}
