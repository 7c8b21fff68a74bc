//! Image catalog: the ordered list of eligible pictures under a folder.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Extensions accepted as wallpapers, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Recursively lists supported images under `folder`, sorted by full path.
///
/// The order only depends on the tree's contents, so an index into one scan
/// stays meaningful for the next scan of an unchanged tree. A missing or
/// unreadable folder yields an empty catalog.
pub fn scan(folder: &Path) -> Vec<PathBuf> {
    // Directory symlinks are not followed; file symlinks are listed if they resolve.
    let mut images: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            let file_type = entry.file_type();
            file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
        })
        .filter(|entry| is_supported_image(entry.path()))
        .map(DirEntry::into_path)
        .collect();

    images.sort();
    images
}
