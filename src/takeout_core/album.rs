//! Stage 6: album reconciliation (§4.5). Dedup already merges album labels for
//! byte-identical files; this pass additionally attaches labels for album-folder
//! listings that dedup missed (e.g. a file re-encoded into an album, hashing
//! differently from its canonical twin) and enforces the NONE/label conflict rule
//! under `nothing`.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::takeout_core::cli::AlbumBehavior;
use crate::takeout_core::config::Config;
use crate::takeout_core::discovery::album_label_for;
use crate::takeout_core::media::{Media, NONE_LABEL};

/// Scans each entity's current file-album map against the album folder it lives in
/// and, under `nothing`, drops the NONE entry when album labels are also present.
/// Each entity is reconciled independently, so the pass runs through the same
/// concurrency-bounded pool as stages 3 and 7.
pub fn resolve_albums(collection: &mut [Media], config: &Config) {
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.concurrency)
        .build()
        .expect("thread pool construction should not fail for a positive thread count");

    pool.install(|| {
        collection.par_iter_mut().for_each(|media| {
            attach_missed_labels(media);

            if matches!(config.albums, AlbumBehavior::Nothing)
                && media.has_none()
                && media.album_labels().next().is_some()
            {
                media.files.remove(NONE_LABEL);
            }
        });
    });
}

fn attach_missed_labels(media: &mut Media) {
    let mut additions = Vec::new();
    for path in media.files.values() {
        if let Some(parent) = path.parent()
            && let Some(label) = album_label_for(parent)
                && !media.files.contains_key(&label) {
                    additions.push((label, path.clone()));
                }
    }
    for (label, path) in additions {
        media.files.entry(label).or_insert(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeout_core::cli::{DateDivision, FixExtensions};
    use std::path::PathBuf;

    fn test_config(albums: AlbumBehavior) -> Config {
        Config {
            input: Default::default(),
            output: Default::default(),
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
            concurrency: 4,
            batch_size: 10,
        }
    }

    #[test]
    fn nothing_behavior_drops_none_when_album_present() {
        let mut media = Media::new(PathBuf::from("/out/a.jpg"));
        media.files.insert("Vacation".to_string(), PathBuf::from("/in/Vacation/a.jpg"));
        let mut collection = vec![media];
        resolve_albums(&mut collection, &test_config(AlbumBehavior::Nothing));
        assert!(!collection[0].has_none());
        assert!(collection[0].files.contains_key("Vacation"));
    }

    #[test]
    fn shortcut_behavior_keeps_none_alongside_albums() {
        let mut media = Media::new(PathBuf::from("/out/a.jpg"));
        media.files.insert("Vacation".to_string(), PathBuf::from("/in/Vacation/a.jpg"));
        let mut collection = vec![media];
        resolve_albums(&mut collection, &test_config(AlbumBehavior::Shortcut));
        assert!(collection[0].has_none());
        assert!(collection[0].files.contains_key("Vacation"));
    }
}
