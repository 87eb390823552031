//! Content-hash deduplication (§4.3). Keeps one canonical file per hash group and
//! merges album membership into the survivor so no byte stream is lost.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use base64::{engine::general_purpose, Engine};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use sha2::{Digest, Sha256};

use crate::takeout_core::config::{Config, FILE_SIZE_LIMIT};
use crate::takeout_core::media::Media;

/// SHA-256 of a file's bytes, base64-encoded. Identical idiom to the teacher's
/// `hash_file` (streamed through the hasher, never fully buffered).
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(general_purpose::STANDARD.encode(hasher.finalize()))
}

/// Runs dedup over the collection in place, returning the number of entities removed.
pub fn dedupe(collection: &mut Vec<Media>, config: &Config) -> usize {
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.concurrency)
        .build()
        .expect("thread pool construction should not fail for a positive thread count");

    // Hashing is the only expensive, per-entity-independent part of this stage, so it's
    // the part run through the bounded pool; grouping/survivor-selection stay sequential.
    pool.install(|| {
        collection.par_iter_mut().for_each(|media| {
            let path = media.canonical_path().to_path_buf();
            if config.limit_filesize
                && let Ok(meta) = fs::metadata(&path)
                    && meta.len() > FILE_SIZE_LIMIT {
                        return; // treated as unique, never hashed
                    }
            if let Ok(hash) = hash_file(&path) {
                media.content_hash = Some(hash);
            }
        });
    });

    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, media) in collection.iter().enumerate() {
        if let Some(hash) = &media.content_hash {
            groups.entry(hash.clone()).or_default().push(idx);
        }
    }

    let mut survivors: Vec<Media> = Vec::with_capacity(collection.len());
    let mut handled = vec![false; collection.len()];
    let removed_before = collection.len();

    // Preserve relative order by walking the original collection and only emitting
    // each group once, at its first member's position.
    for idx in 0..collection.len() {
        if handled[idx] {
            continue;
        }
        let Some(hash) = collection[idx].content_hash.clone() else {
            survivors.push(std::mem::replace(&mut collection[idx], Media::new(Default::default())));
            handled[idx] = true;
            continue;
        };
        let group = groups.get(&hash).cloned().unwrap_or_else(|| vec![idx]);
        let survivor_idx = pick_survivor(collection, &group);

        let mut survivor = std::mem::replace(
            &mut collection[survivor_idx],
            Media::new(Default::default()),
        );
        for &member in &group {
            handled[member] = true;
            if member == survivor_idx {
                continue;
            }
            let loser = std::mem::replace(&mut collection[member], Media::new(Default::default()));
            survivor.absorb(loser);
        }
        survivors.push(survivor);
    }

    let removed = removed_before - survivors.len();
    *collection = survivors;
    removed
}

/// Survivor selection: longest filename, then best (lowest) accuracy tier, then
/// lexicographically smallest path (§4.3).
fn pick_survivor(collection: &[Media], group: &[usize]) -> usize {
    group
        .iter()
        .max_by(|&&a, &&b| {
            let pa = collection[a].canonical_path();
            let pb = collection[b].canonical_path();
            let name_a = pa.file_name().and_then(|n| n.to_str()).unwrap_or("").len();
            let name_b = pb.file_name().and_then(|n| n.to_str()).unwrap_or("").len();

            name_a
                .cmp(&name_b)
                .then_with(|| {
                    let tier_a = collection[a].accuracy_tier.map(|t| t as i32).unwrap_or(i32::MAX);
                    let tier_b = collection[b].accuracy_tier.map(|t| t as i32).unwrap_or(i32::MAX);
                    tier_b.cmp(&tier_a) // lower tier wins -> reverse so max_by picks it
                })
                .then_with(|| pb.cmp(pa)) // smaller path wins -> reverse
        })
        .copied()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeout_core::cli::{AlbumBehavior, DateDivision, FixExtensions};
    use std::fs;
    use tempfile::tempdir;

    fn test_config() -> Config {
        Config {
            input: Default::default(),
            output: Default::default(),
            albums: AlbumBehavior::Shortcut,
            divide_to_dates: DateDivision::None,
            fix_extensions: FixExtensions::Standard,
            write_exif: false,
            skip_extras: false,
            guess_from_name: true,
            transform_pixel_mp: false,
            update_creation_time: false,
            limit_filesize: false,
            divide_partner_shared: false,
            concurrency: 4,
            batch_size: 10,
        }
    }

    #[test]
    fn identical_bytes_deduplicate_and_merge_albums() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"same content").unwrap();
        fs::write(&b, b"same content").unwrap();

        let mut m_a = Media::new(a.clone());
        m_a.files.clear();
        m_a.files.insert("Vacation".to_string(), a);
        let mut m_b = Media::new(b.clone());
        m_b.files.clear();
        m_b.files.insert("Trip".to_string(), b);

        let mut collection = vec![m_a, m_b];
        let removed = dedupe(&mut collection, &test_config());

        assert_eq!(removed, 1);
        assert_eq!(collection.len(), 1);
        assert!(collection[0].files.contains_key("Vacation"));
        assert!(collection[0].files.contains_key("Trip"));
    }

    #[test]
    fn distinct_bytes_are_not_merged() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"two").unwrap();

        let mut collection = vec![Media::new(a), Media::new(b)];
        let removed = dedupe(&mut collection, &test_config());
        assert_eq!(removed, 0);
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn survivor_prefers_longer_filename() {
        let dir = tempdir().unwrap();
        let short = dir.path().join("a.jpg");
        let long = dir.path().join("a_longer_name.jpg");
        fs::write(&short, b"x").unwrap();
        fs::write(&long, b"x").unwrap();

        let mut collection = vec![Media::new(short), Media::new(long.clone())];
        dedupe(&mut collection, &test_config());
        assert_eq!(collection[0].canonical_path(), long);
    }
}
