//! EXIF read/write (§4.6). Reads use `kamadak-exif`; writes use `little_exif`, which
//! patches the EXIF segment of a JPEG in place rather than re-encoding the whole file.
//! `MetadataWriter` is the seam that keeps the low-level tag mechanics swappable and
//! testable independent of the pipeline driver.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Rational, Tag, Value as ExifValue};
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use time::OffsetDateTime;

use crate::takeout_core::error::{Result, TakeoutError};
use crate::takeout_core::media::EXIF_WRITABLE_EXTENSIONS;

const EXIF_DATE_FORMAT: &[time::format_description::FormatItem<'static>] =
    time::macros::format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");

/// Capability seam over the low-level EXIF write mechanics (§1). The production
/// implementation (`LittleExifWriter`) runs fully in-process; tests can substitute a
/// stub that records calls without touching the filesystem.
pub trait MetadataWriter {
    /// Writes DateTime/DateTimeOriginal/DateTimeDigitized if not already present.
    /// Returns `Ok(true)` if a write happened.
    fn write_datetime(&self, path: &Path, date: OffsetDateTime) -> Result<bool>;

    /// Writes GPS latitude/longitude if not already present.
    fn write_gps(&self, path: &Path, coordinates: (f64, f64)) -> Result<bool>;
}

pub struct LittleExifWriter;

fn is_writable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXIF_WRITABLE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl MetadataWriter for LittleExifWriter {
    fn write_datetime(&self, path: &Path, date: OffsetDateTime) -> Result<bool> {
        if !is_writable(path) {
            return Ok(false);
        }
        if read_datetime(path).is_some() {
            return Ok(false);
        }

        let formatted = date
            .format(EXIF_DATE_FORMAT)
            .map_err(|e| TakeoutError::Decode(e.to_string()))?;

        let mut metadata = Metadata::new_from_path(path)
            .map_err(|e| TakeoutError::Decode(e.to_string()))?;
        metadata.set_tag(ExifTag::ModifyDate(formatted.clone()));
        metadata.set_tag(ExifTag::DateTimeOriginal(formatted.clone()));
        metadata.set_tag(ExifTag::CreateDate(formatted));
        metadata
            .write_to_file(path)
            .map_err(|e| TakeoutError::Decode(e.to_string()))?;
        Ok(true)
    }

    fn write_gps(&self, path: &Path, coordinates: (f64, f64)) -> Result<bool> {
        if !is_writable(path) {
            return Ok(false);
        }
        if read_gps(path).is_some() {
            return Ok(false);
        }

        let (lat, lon) = coordinates;
        let (lat_dms, lat_ref) = decimal_to_dms(lat, true);
        let (lon_dms, lon_ref) = decimal_to_dms(lon, false);

        let mut metadata = Metadata::new_from_path(path)
            .map_err(|e| TakeoutError::Decode(e.to_string()))?;
        metadata.set_tag(ExifTag::GPSLatitudeRef(lat_ref.to_string()));
        metadata.set_tag(ExifTag::GPSLatitude(lat_dms));
        metadata.set_tag(ExifTag::GPSLongitudeRef(lon_ref.to_string()));
        metadata.set_tag(ExifTag::GPSLongitude(lon_dms));
        metadata
            .write_to_file(path)
            .map_err(|e| TakeoutError::Decode(e.to_string()))?;
        Ok(true)
    }
}

/// Converts a signed decimal-degree coordinate into EXIF's degrees/minutes/seconds
/// rational triple plus its hemisphere reference character.
fn decimal_to_dms(value: f64, is_latitude: bool) -> (Vec<uR64>, char) {
    let reference = if is_latitude {
        if value >= 0.0 { 'N' } else { 'S' }
    } else if value >= 0.0 {
        'E'
    } else {
        'W'
    };

    let value = value.abs();
    let degrees = value.trunc();
    let minutes_full = (value - degrees) * 60.0;
    let minutes = minutes_full.trunc();
    let seconds = (minutes_full - minutes) * 60.0;

    let dms = vec![
        uR64 { nominator: degrees as u32, denominator: 1 },
        uR64 { nominator: minutes as u32, denominator: 1 },
        uR64 { nominator: (seconds * 1000.0).round() as u32, denominator: 1000 },
    ];
    (dms, reference)
}

fn rational_to_f64(r: &Rational) -> f64 {
    if r.denom == 0 {
        0.0
    } else {
        r.num as f64 / r.denom as f64
    }
}

/// Reads an EXIF `Exif` container from a file, returning `None` on any decode failure
/// (treated as absence per §7's non-fatal DecodeError policy).
fn read_container(path: &Path) -> Option<exif::Exif> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut reader).ok()
}

fn parse_exif_datetime(s: &str) -> Option<OffsetDateTime> {
    let primitive = time::PrimitiveDateTime::parse(s.trim(), EXIF_DATE_FORMAT).ok()?;
    Some(primitive.assume_utc())
}

/// Read DateTimeOriginal, falling back to DateTime then DateTimeDigitized.
pub fn read_datetime(path: &Path) -> Option<OffsetDateTime> {
    let exif = read_container(path)?;

    for tag in [Tag::DateTimeOriginal, Tag::DateTime, Tag::DateTimeDigitized] {
        if let Some(field) = exif.get_field(tag, In::PRIMARY)
            && let ExifValue::Ascii(ref vecs) = field.value
                && let Some(bytes) = vecs.first() {
                    let s = String::from_utf8_lossy(bytes);
                    if let Some(date) = parse_exif_datetime(&s) {
                        return Some(date);
                    }
                }
    }
    None
}

/// Read GPS coordinates as (latitude, longitude) in decimal degrees.
pub fn read_gps(path: &Path) -> Option<(f64, f64)> {
    let exif = read_container(path)?;

    let lat = gps_component(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S")?;
    let lon = gps_component(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W")?;
    if lat == 0.0 && lon == 0.0 {
        None
    } else {
        Some((lat, lon))
    }
}

fn gps_component(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag, negative_ref: &str) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let ExifValue::Rational(ref rationals) = field.value else { return None };
    if rationals.len() < 3 {
        return None;
    }
    let degrees = rational_to_f64(&rationals[0]);
    let minutes = rational_to_f64(&rationals[1]);
    let seconds = rational_to_f64(&rationals[2]);
    let mut decimal = degrees + minutes / 60.0 + seconds / 3600.0;

    if let Some(reference) = exif.get_field(ref_tag, In::PRIMARY)
        && let ExifValue::Ascii(ref vecs) = reference.value
            && let Some(bytes) = vecs.first()
                && String::from_utf8_lossy(bytes).trim() == negative_ref {
                    decimal = -decimal;
                }
    Some(decimal)
}
