//! Index of every page and asset stored during a run.
//!
//! Entries are keyed by URL: adding the same URL again replaces its path.
//! The index serializes to `website_map.json` and `website_structure.txt` in
//! the mirror folder.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

use crate::downloader::AssetBucket;
use crate::error::{MirrorError, Result};

pub const MAP_FILE: &str = "website_map.json";
pub const STRUCTURE_FILE: &str = "website_structure.txt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetEntry {
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub bucket: AssetBucket,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteMap {
    base_url: String,
    base_folder: PathBuf,
    pages: BTreeMap<String, PathBuf>,
    assets: BTreeMap<String, AssetEntry>,
}

/// One level of the page tree; serializes as the child segments plus a
/// `_file` key when a page is stored at this node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageNode {
    pub file: Option<PathBuf>,
    pub children: BTreeMap<String, PageNode>,
}

impl Serialize for PageNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.children.len() + usize::from(self.file.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (segment, child) in &self.children {
            map.serialize_entry(segment, child)?;
        }
        if let Some(file) = &self.file {
            map.serialize_entry("_file", file)?;
        }
        map.end()
    }
}

/// Structural view: pages by URL path hierarchy, asset paths by bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteStructure {
    pub pages: PageNode,
    pub assets: BTreeMap<AssetBucket, Vec<PathBuf>>,
}

#[derive(Serialize)]
struct MapDocument<'a> {
    #[serde(flatten)]
    map: &'a SiteMap,
    structure: SiteStructure,
}

impl SiteMap {
    pub fn new(base_url: &str, base_folder: &Path) -> Self {
        Self {
            base_url: base_url.to_string(),
            base_folder: base_folder.to_path_buf(),
            pages: BTreeMap::new(),
            assets: BTreeMap::new(),
        }
    }

    pub fn add_page(&mut self, url: &str, path: PathBuf) {
        self.pages.insert(url.to_string(), path);
    }

    pub fn add_asset(&mut self, url: &str, path: PathBuf, bucket: AssetBucket) {
        self.assets
            .insert(url.to_string(), AssetEntry { path, bucket });
    }

    pub fn page(&self, url: &str) -> Option<&Path> {
        self.pages.get(url).map(PathBuf::as_path)
    }

    pub fn asset(&self, url: &str) -> Option<&AssetEntry> {
        self.assets.get(url)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn snapshot(&self) -> SiteStructure {
        let mut root = PageNode::default();
        for (url, path) in &self.pages {
            let mut node = &mut root;
            for segment in url_path(url).split('/').filter(|s| !s.is_empty()) {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.file = Some(path.clone());
        }

        let mut assets: BTreeMap<AssetBucket, Vec<PathBuf>> = AssetBucket::STANDARD
            .into_iter()
            .map(|bucket| (bucket, Vec::new()))
            .collect();
        for entry in self.assets.values() {
            assets.entry(entry.bucket).or_default().push(entry.path.clone());
        }

        SiteStructure {
            pages: root,
            assets,
        }
    }

    /// Machine-readable JSON and the human-readable listing.
    pub fn serialize(&self) -> Result<(String, String)> {
        let document = MapDocument {
            map: self,
            structure: self.snapshot(),
        };
        let json = serde_json::to_string_pretty(&document)?;
        Ok((json, self.render_text(&document.structure)))
    }

    fn render_text(&self, structure: &SiteStructure) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Website Structure for: {}", self.base_url);
        let _ = writeln!(out, "{}\n", "=".repeat(50));

        let _ = writeln!(out, "Pages:");
        for (url, path) in &self.pages {
            let _ = writeln!(out, "  {} -> {}", url, path.display());
        }

        let _ = writeln!(out, "\nAssets:");
        for (bucket, paths) in &structure.assets {
            let _ = writeln!(out, "\n  {}:", bucket.folder().to_uppercase());
            for path in paths {
                let _ = writeln!(out, "    {}", path.display());
            }
        }
        out
    }

    /// Write both index files into the mirror folder.
    pub fn save(&self) -> Result<(PathBuf, PathBuf)> {
        let (json, text) = self.serialize()?;
        let map_file = self.base_folder.join(MAP_FILE);
        let structure_file = self.base_folder.join(STRUCTURE_FILE);

        std::fs::write(&map_file, json).map_err(|e| MirrorError::storage(&map_file, e))?;
        std::fs::write(&structure_file, text)
            .map_err(|e| MirrorError::storage(&structure_file, e))?;

        info!(
            map = %map_file.display(),
            structure = %structure_file.display(),
            pages = self.pages.len(),
            assets = self.assets.len(),
            "saved site map"
        );
        Ok((map_file, structure_file))
    }
}

/// Path part of an absolute URL string, without scheme and host.
fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.find('/').map_or("", |idx| &rest[idx..])
}

/// The site map shared between the downloader and the crawler.
#[derive(Debug, Clone)]
pub struct SharedSiteMap(Arc<Mutex<SiteMap>>);

impl SharedSiteMap {
    pub fn new(map: SiteMap) -> Self {
        Self(Arc::new(Mutex::new(map)))
    }

    pub fn lock(&self) -> MutexGuard<'_, SiteMap> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
