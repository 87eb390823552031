//! Ordered date-extraction chain (§4.2). The pipeline stops at the first source that
//! yields a value and records its index as the accuracy tier.

use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::takeout_core::media::AccuracyTier;
use crate::takeout_core::sidecar;

/// Sidecar JSON shape, read-only (§6). Unknown keys are ignored by serde by default.
#[derive(Debug, Deserialize)]
pub struct SidecarJson {
    #[serde(rename = "photoTakenTime")]
    pub photo_taken_time: Option<TimestampField>,
    #[serde(rename = "geoData")]
    pub geo_data: Option<GeoData>,
    #[serde(rename = "googlePhotosOrigin")]
    pub google_photos_origin: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct TimestampField {
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct GeoData {
    pub latitude: f64,
    pub longitude: f64,
}

fn min_date() -> OffsetDateTime {
    time::macros::datetime!(1900-01-01 0:00 UTC)
}

fn in_range(date: OffsetDateTime) -> bool {
    let max = OffsetDateTime::now_utc() + Duration::hours(24);
    date >= min_date() && date <= max
}

/// Parse a sidecar JSON's timestamp/coordinates, regardless of which lookup strategy
/// found it.
pub fn parse_sidecar(path: &Path) -> Option<SidecarJson> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn coordinates_from_sidecar(json: &SidecarJson) -> Option<(f64, f64)> {
    let geo = json.geo_data.as_ref()?;
    if geo.latitude == 0.0 && geo.longitude == 0.0 {
        None
    } else {
        Some((geo.latitude, geo.longitude))
    }
}

/// True when the sidecar marks this item as shared by a partner (Takeout's
/// `googlePhotosOrigin.fromPartnerSharing` key, present as an object, possibly empty).
pub fn is_partner_shared(json: &SidecarJson) -> bool {
    json.google_photos_origin
        .as_ref()
        .and_then(|v| v.get("fromPartnerSharing"))
        .is_some()
}

/// Source 1: sidecar JSON, non-try-hard lookup.
fn from_json(path: &Path) -> Option<OffsetDateTime> {
    let sidecar_path = sidecar::find_sidecar(path, false)?;
    let json = parse_sidecar(&sidecar_path)?;
    let seconds: i64 = json.photo_taken_time?.timestamp.parse().ok()?;
    let date = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
    in_range(date).then_some(date)
}

/// Source 2: EXIF DateTimeOriginal / DateTime / DateTimeDigitized.
fn from_exif(path: &Path) -> Option<OffsetDateTime> {
    let date = crate::takeout_core::exif::read_datetime(path)?;
    in_range(date).then_some(date)
}

/// Source 3: plausible date patterns embedded in the filename, e.g. `IMG_20201231_235900`
/// or `2020-12-31`.
fn from_filename(path: &Path) -> Option<OffsetDateTime> {
    let stem = path.file_stem()?.to_str()?;

    let compact = Regex::new(r"(?:^|[^0-9])(20\d{2})(\d{2})(\d{2})(?:[_-](\d{2})(\d{2})(\d{2}))?")
        .unwrap();
    if let Some(caps) = compact.captures(stem) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u8 = caps[2].parse().ok()?;
        let day: u8 = caps[3].parse().ok()?;
        let hour: u8 = caps.get(4).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
        let minute: u8 = caps.get(5).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
        let second: u8 = caps.get(6).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
        if let Ok(date) = build_date(year, month, day, hour, minute, second)
            && in_range(date) {
                return Some(date);
            }
    }

    let dashed = Regex::new(r"(20\d{2})-(\d{2})-(\d{2})").unwrap();
    if let Some(caps) = dashed.captures(stem) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u8 = caps[2].parse().ok()?;
        let day: u8 = caps[3].parse().ok()?;
        if let Ok(date) = build_date(year, month, day, 0, 0, 0)
            && in_range(date) {
                return Some(date);
            }
    }

    None
}

fn build_date(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Result<OffsetDateTime, time::error::ComponentRange> {
    let month = time::Month::try_from(month)?;
    let date = time::Date::from_calendar_date(year, month, day)?;
    let time = time::Time::from_hms(hour, minute, second)?;
    Ok(OffsetDateTime::new_utc(date, time))
}

/// Source 4: sidecar JSON, try-hard lookup.
fn from_json_tryhard(path: &Path) -> Option<OffsetDateTime> {
    let sidecar_path = sidecar::find_sidecar(path, true)?;
    let json = parse_sidecar(&sidecar_path)?;
    let seconds: i64 = json.photo_taken_time?.timestamp.parse().ok()?;
    let date = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
    in_range(date).then_some(date)
}

/// Source 5: `Photos from YYYY` parent folder -> January 1st of that year.
fn from_folder_year(path: &Path) -> Option<OffsetDateTime> {
    let parent_name = path.parent()?.file_name()?.to_str()?;
    let re = Regex::new(r"(?i)photos\s+from\s+(\d{4})").unwrap();
    let caps = re.captures(parent_name)?;
    let year: i32 = caps[1].parse().ok()?;
    let current_year = OffsetDateTime::now_utc().year();
    if !(1900..=current_year + 1).contains(&year) {
        return None;
    }
    let date = build_date(year, 1, 1, 0, 0, 0).ok()?;
    Some(date)
}

/// Run the full extractor chain, stopping at the first hit.
pub fn extract_date(path: &Path, guess_from_name: bool) -> Option<(OffsetDateTime, AccuracyTier)> {
    if let Some(d) = from_json(path) {
        return Some((d, AccuracyTier::Json));
    }
    if let Some(d) = from_exif(path) {
        return Some((d, AccuracyTier::Exif));
    }
    if guess_from_name
        && let Some(d) = from_filename(path) {
            return Some((d, AccuracyTier::GuessName));
        }
    if let Some(d) = from_json_tryhard(path) {
        return Some((d, AccuracyTier::JsonTryHard));
    }
    if let Some(d) = from_folder_year(path) {
        return Some((d, AccuracyTier::FolderYear));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn folder_year_extracts_january_first() {
        let dir = tempdir().unwrap();
        let year_dir = dir.path().join("Photos from 2023");
        fs::create_dir(&year_dir).unwrap();
        let media = year_dir.join("b.jpg");
        File::create(&media).unwrap();

        let (date, tier) = extract_date(&media, true).unwrap();
        assert_eq!(tier, AccuracyTier::FolderYear);
        assert_eq!(date.year(), 2023);
        assert_eq!(date.month(), time::Month::January);
        assert_eq!(date.day(), 1);
    }

    #[test]
    fn folder_year_rejects_out_of_range() {
        let dir = tempdir().unwrap();
        let year_dir = dir.path().join("Photos from 1850");
        fs::create_dir(&year_dir).unwrap();
        let media = year_dir.join("b.jpg");
        File::create(&media).unwrap();
        assert!(from_folder_year(&media).is_none());
    }

    #[test]
    fn json_source_reads_timestamp() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("a.jpg");
        File::create(&media).unwrap();
        fs::write(
            dir.path().join("a.jpg.json"),
            r#"{"photoTakenTime": {"timestamp": "1577923200"}}"#,
        )
        .unwrap();

        let (date, tier) = extract_date(&media, true).unwrap();
        assert_eq!(tier, AccuracyTier::Json);
        assert_eq!(date.year(), 2020);
    }

    #[test]
    fn filename_guess_parses_compact_pattern() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("IMG_20201231_235900.jpg");
        File::create(&media).unwrap();
        let date = from_filename(&media).unwrap();
        assert_eq!(date.year(), 2020);
        assert_eq!(date.month(), time::Month::December);
        assert_eq!(date.day(), 31);
    }

    #[test]
    fn coordinates_zero_zero_is_absent() {
        let json = SidecarJson {
            photo_taken_time: None,
            geo_data: Some(GeoData { latitude: 0.0, longitude: 0.0 }),
            google_photos_origin: None,
        };
        assert_eq!(coordinates_from_sidecar(&json), None);
    }

    #[test]
    fn partner_sharing_marker_is_detected() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("a.jpg");
        File::create(&media).unwrap();
        fs::write(
            dir.path().join("a.jpg.json"),
            r#"{"photoTakenTime": {"timestamp": "1577923200"}, "googlePhotosOrigin": {"fromPartnerSharing": {}}}"#,
        )
        .unwrap();

        let json = parse_sidecar(&dir.path().join("a.jpg.json")).unwrap();
        assert!(is_partner_shared(&json));
    }

    #[test]
    fn absent_partner_sharing_marker_is_false() {
        let json = SidecarJson {
            photo_taken_time: None,
            geo_data: None,
            google_photos_origin: Some(serde_json::json!({})),
        };
        assert!(!is_partner_shared(&json));
    }
}
