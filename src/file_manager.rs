use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::downloader::AssetBucket;
use crate::error::{MirrorError, Result};

/// Longest path (in bytes) written to disk.
pub const MAX_PATH_LEN: usize = 255;
const MAX_STEM_LEN: usize = 240;
const PARTIAL_SUFFIX: &str = ".part";

/// Owns the on-disk layout of one mirror folder.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    pub fn new(base_dir: &Path) -> Result<Self> {
        let base_dir = base_dir.to_path_buf();
        fs::create_dir_all(&base_dir).map_err(|e| MirrorError::storage(&base_dir, e))?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create `assets/{js,css,images,fonts}` up front.
    pub fn create_asset_folders(&self) -> Result<()> {
        for bucket in AssetBucket::STANDARD {
            self.asset_dir(bucket)?;
        }
        Ok(())
    }

    /// `<base>/assets/<bucket>`, created if missing.
    pub fn asset_dir(&self, bucket: AssetBucket) -> Result<PathBuf> {
        let dir = self.base_dir.join("assets").join(bucket.folder());
        fs::create_dir_all(&dir).map_err(|e| MirrorError::storage(&dir, e))?;
        Ok(dir)
    }

    /// Write `content` verbatim to `path`, creating parent directories.
    ///
    /// The bytes go to a `.part` sibling first and are renamed into place, so
    /// an interrupted run never leaves a truncated file under the final name.
    pub fn save_file(&self, path: &Path, content: &[u8]) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MirrorError::storage(parent, e))?;
        }

        let mut partial = path.as_os_str().to_owned();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        let mut file = fs::File::create(&partial).map_err(|e| MirrorError::storage(&partial, e))?;
        file.write_all(content)
            .map_err(|e| MirrorError::storage(&partial, e))?;
        drop(file);
        fs::rename(&partial, path).map_err(|e| MirrorError::storage(path, e))?;

        Ok(path.to_path_buf())
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// `target` expressed relative to `from_dir`, with `/` separators for markup.
pub fn relative_link(target: &Path, from_dir: &Path) -> Option<String> {
    let rel = pathdiff::diff_paths(target, from_dir)?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `dir/file_name`, with the file stem shortened when the whole path would
/// exceed [`MAX_PATH_LEN`]. The extension is always kept.
pub fn clamp_file_path(dir: &Path, file_name: &str) -> PathBuf {
    let full = dir.join(file_name);
    if full.as_os_str().len() <= MAX_PATH_LEN {
        return full;
    }

    let (stem, ext) = split_extension(file_name);
    let dir_len = dir.as_os_str().len() + 1;
    let budget = MAX_PATH_LEN
        .saturating_sub(dir_len + ext.len())
        .clamp(1, MAX_STEM_LEN);
    let stem = truncate_on_char_boundary(stem, budget);
    dir.join(format!("{stem}{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_asset_folders_created() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(&temp_dir.path().join("site")).unwrap();
        fm.create_asset_folders().unwrap();
        for sub in ["js", "css", "images", "fonts"] {
            assert!(temp_dir.path().join("site/assets").join(sub).is_dir(), "{sub}");
        }
    }

    #[test]
    fn test_save_file_is_binary_safe() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();
        let bytes: Vec<u8> = (0..=255u8).collect();
        let path = temp_dir.path().join("nested/dir/blob.bin");

        let saved = fm.save_file(&path, &bytes).unwrap();

        assert_eq!(fs::read(&saved).unwrap(), bytes);
        assert!(!temp_dir.path().join("nested/dir/blob.bin.part").exists());
    }

    #[test]
    fn test_save_file_overwrites() {
        let temp_dir = tempdir().unwrap();
        let fm = FileManager::new(temp_dir.path()).unwrap();
        let path = temp_dir.path().join("page.html");
        fm.save_file(&path, b"first").unwrap();
        fm.save_file(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(fm.file_exists(&path));
    }

    #[test]
    fn test_clamp_keeps_short_paths() {
        assert_eq!(
            clamp_file_path(Path::new("site/assets/js"), "app.js"),
            PathBuf::from("site/assets/js/app.js")
        );
    }

    #[test]
    fn test_clamp_truncates_stem_and_keeps_extension() {
        let dir = Path::new("site/assets/images");
        let name = format!("{}.png", "x".repeat(400));
        let clamped = clamp_file_path(dir, &name);
        assert!(clamped.as_os_str().len() <= MAX_PATH_LEN);
        assert_eq!(clamped.extension().unwrap(), "png");
        assert!(clamped.starts_with(dir));
    }

    #[test]
    fn test_clamp_respects_char_boundaries() {
        let name = format!("{}.css", "é".repeat(200));
        let clamped = clamp_file_path(Path::new("d"), &name);
        assert!(clamped.as_os_str().len() <= MAX_PATH_LEN);
        assert!(clamped.to_str().unwrap().ends_with(".css"));
    }

    #[test]
    fn test_relative_link_uses_forward_slashes() {
        let link = relative_link(
            Path::new("/m/site/assets/images/logo.png"),
            Path::new("/m/site"),
        );
        assert_eq!(link.as_deref(), Some("assets/images/logo.png"));

        let up = relative_link(Path::new("/m/site/about.html"), Path::new("/m/site/sub"));
        assert_eq!(up.as_deref(), Some("../about.html"));
    }
}
