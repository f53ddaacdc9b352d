//! Directory listings for the browse endpoints.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::disk::{DiskSpaceProbe, VolumeInfo};
use crate::error::ApiError;
use crate::media::{sniff_file, MediaKind};

pub const DEFAULT_LIMIT: usize = 50;

const VIDEO_ICON: &str = "/static/icons/video-icon.png";
const AUDIO_ICON: &str = "/static/icons/audio-icon.png";

/// One child of a listed directory, or a synthetic root/volume entry.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub mod_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_shared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl DirEntry {
    fn from_metadata(name: String, path: &Path, metadata: &Metadata) -> Self {
        Self {
            name,
            path: path.to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: metadata.is_file().then(|| metadata.len()),
            mod_time: format_mod_time(metadata),
            thumbnail: None,
            media_type: None,
            is_shared: false,
            used: None,
            total: None,
        }
    }

    fn from_volume(volume: VolumeInfo) -> Self {
        Self {
            name: volume.name,
            path: volume.path,
            is_dir: true,
            size: None,
            mod_time: Local::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            thumbnail: None,
            media_type: None,
            is_shared: false,
            used: Some(volume.used),
            total: Some(volume.total),
        }
    }

    fn attach_media(&mut self, kind: MediaKind) {
        self.thumbnail = Some(match kind {
            MediaKind::Image => thumbnail_url(&self.path),
            MediaKind::Video => VIDEO_ICON.to_string(),
            MediaKind::Audio => AUDIO_ICON.to_string(),
        });
        self.media_type = Some(kind);
    }
}

/// Same-service URL that renders a thumbnail of the image at `path`.
pub fn thumbnail_url(path: &str) -> String {
    format!("/file?path={}&thumbnail=true", urlencoding::encode(path))
}

fn format_mod_time(metadata: &Metadata) -> String {
    metadata
        .modified()
        .map(|mod_time| {
            let datetime: DateTime<Local> = mod_time.into();
            datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
        })
        .unwrap_or_default()
}

/// One page of a listing plus the size of the whole listing.
#[derive(Serialize, Debug)]
pub struct Page {
    pub entries: Vec<DirEntry>,
    pub total: usize,
}

/// Clamped pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Parses raw query values. Missing, unparsable, or non-positive limits
    /// fall back to the default; negative or unparsable offsets become zero.
    pub fn from_query(limit: Option<&str>, offset: Option<&str>) -> Self {
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| *l > 0)
            .map_or(DEFAULT_LIMIT, |l| l as usize);
        let offset = offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .filter(|o| *o >= 0)
            .map_or(0, |o| o as usize);
        Self { limit, offset }
    }

    /// Slices `entries`; an offset past the end yields an empty page.
    pub fn apply(&self, entries: Vec<DirEntry>) -> Page {
        let total = entries.len();
        let entries = entries
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect();
        Page { entries, total }
    }
}

/// Directories first, then byte-wise by name. Stable.
pub fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
}

/// Lists immediate children of `dir`, which must already have passed the guard.
///
/// Children whose name is not UTF-8, whose metadata cannot be read, or whose
/// content cannot be sniffed are skipped and do not count toward the total.
pub async fn list_directory(dir: &Path, roots: &[PathBuf]) -> Result<Vec<DirEntry>, ApiError> {
    let metadata = fs::metadata(dir)
        .await
        .map_err(|e| ApiError::from_io(dir, &e, "Unable to open directory"))?;
    if !metadata.is_dir() {
        return Err(ApiError::NotADirectory(dir.to_path_buf()));
    }

    let mut reader = fs::read_dir(dir).await.map_err(|e| {
        warn!("Failed to read directory {}: {}", dir.display(), e);
        ApiError::from_io(dir, &e, "Unable to read directory")
    })?;

    let mut entries = Vec::new();
    loop {
        let child = match reader.next_entry().await {
            Ok(Some(child)) => child,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        let path = dir.join(child.file_name());
        let name = match child.file_name().into_string() {
            Ok(n) => n,
            Err(_) => {
                warn!("Skipping entry with non-UTF8 filename in {}", dir.display());
                continue;
            }
        };

        // Follows symlinks so a linked directory lists as a directory.
        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to get metadata for {}: {}", path.display(), e);
                continue;
            }
        };

        let mut entry = DirEntry::from_metadata(name, &path, &metadata);
        if !entry.is_dir {
            match sniff_file(&path).await {
                Ok(sniffed) => {
                    if let Some(kind) = sniffed.kind {
                        entry.attach_media(kind);
                    }
                }
                Err(e) => {
                    warn!("Failed to detect MIME for {}: {}", path.display(), e);
                    continue;
                }
            }
        }
        entry.is_shared = roots.iter().any(|root| *root == path);
        entries.push(entry);
    }

    debug!("Listed {} entries in {}", entries.len(), dir.display());
    sort_entries(&mut entries);
    Ok(entries)
}

/// One entry per shared root, describing the root itself.
pub async fn list_shared_roots(roots: &[PathBuf]) -> Vec<DirEntry> {
    let mut entries = Vec::with_capacity(roots.len());
    for root in roots {
        let metadata = match fs::metadata(root).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to stat shared path {}: {}", root.display(), e);
                continue;
            }
        };
        let mut entry = DirEntry::from_metadata(root_name(root), root, &metadata);
        entry.is_shared = true;
        entries.push(entry);
    }
    sort_entries(&mut entries);
    entries
}

/// Usage totals for each shared root, as reported by `/shared-disks`.
/// Blocking; run it off the async executor.
pub fn shared_root_usage(roots: &[PathBuf], probe: &dyn DiskSpaceProbe) -> Vec<VolumeInfo> {
    let mut disks = Vec::with_capacity(roots.len());
    for root in roots {
        if let Err(e) = std::fs::metadata(root) {
            warn!("Invalid shared folder {}: {}", root.display(), e);
            continue;
        }
        let usage = probe.query(root);
        disks.push(VolumeInfo {
            name: root_name(root),
            path: root.to_string_lossy().into_owned(),
            used: usage.used,
            total: usage.total,
        });
    }
    disks
}

/// Synthetic directory entries for host volumes.
pub fn volume_entries(volumes: Vec<VolumeInfo>) -> Vec<DirEntry> {
    volumes.into_iter().map(DirEntry::from_volume).collect()
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned())
}
