//! Media attached to resources and the blob storage behind it

use chrono::Utc;
use heritage_library_schemas::{MediaKind, MediaRef, Resource, ResourceId};
use regex::Regex;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::LibraryConfig;
use crate::error::{LibraryError, Result};
use crate::store::{now_rfc3339, LibraryStore};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "flv", "mkv", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "aac", "flac", "m4a"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "rtf", "odt"];

const MAX_STEM_CHARS: usize = 50;

/// Classify an upload by mime type, falling back to its file extension
pub fn classify(mime_type: Option<&str>, file_name: &str) -> MediaKind {
    let mime = mime_type.unwrap_or_default().trim().to_lowercase();
    if mime.starts_with("image/") {
        return MediaKind::Image;
    }
    if mime.starts_with("video/") {
        return MediaKind::Video;
    }
    if mime.starts_with("audio/") {
        return MediaKind::Audio;
    }

    let extension = extension_of(file_name);
    let extension = extension.as_str();
    if IMAGE_EXTENSIONS.contains(&extension) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&extension) {
        MediaKind::Video
    } else if AUDIO_EXTENSIONS.contains(&extension) {
        MediaKind::Audio
    } else {
        // documents and anything unrecognised
        MediaKind::Document
    }
}

pub fn is_document_extension(file_name: &str) -> bool {
    DOCUMENT_EXTENSIONS.contains(&extension_of(file_name).as_str())
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Directory a media kind is stored under
pub fn subdir_for(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "images",
        MediaKind::Video => "videos",
        MediaKind::Audio => "audio",
        MediaKind::Document => "documents",
    }
}

// ============================================================================
// Blob Storage
// ============================================================================

/// Stores media bytes and hands back a public URL
pub trait BlobStore: Send + Sync {
    fn store(&self, kind: MediaKind, original_name: &str, bytes: &[u8]) -> Result<String>;

    /// Delete the blob behind a URL previously returned by `store`
    fn remove_url(&self, url: &str) -> Result<()>;

    /// Delete a resource's primary file by its stored `filePath`; paths
    /// outside the blob root are refused
    fn remove_file(&self, file_path: &str) -> Result<()>;
}

/// Blob store on the local filesystem
pub struct DiskBlobStore {
    root: PathBuf,
    base_url: String,
}

impl DiskBlobStore {
    pub fn new<P: AsRef<Path>>(root: P, base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(&config.resources_dir, config.base_url.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a media URL (absolute or relative) back to its file.
    ///
    /// Returns `None` for URLs outside `/resources/` or that try to climb out
    /// of the root.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let (_, rest) = url.split_once("/resources/")?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        if rest.is_empty() {
            return None;
        }

        let relative = Path::new(rest);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            warn!("Refusing media URL outside the resources root: {}", url);
            return None;
        }

        Some(self.root.join(relative))
    }

    /// Map a stored `filePath` to its file, absolute or relative to the root.
    ///
    /// Returns `None` unless the path stays inside the root.
    pub fn path_for_file(&self, file_path: &str) -> Option<PathBuf> {
        let path = Path::new(file_path);
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };

        let mut components = relative.components().peekable();
        components.peek()?;
        if !components.all(|c| matches!(c, Component::Normal(_))) {
            warn!("Refusing file path outside the resources root: {}", file_path);
            return None;
        }

        Some(self.root.join(relative))
    }

    fn delete_blob(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed blob {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn file_name_for(original_name: &str) -> String {
        static UNSAFE: OnceLock<Regex> = OnceLock::new();
        let unsafe_chars = UNSAFE.get_or_init(|| {
            Regex::new(r"[^a-zA-Z0-9一-龥_-]").expect("valid file name pattern")
        });

        let path = Path::new(original_name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
        let stem: String = unsafe_chars
            .replace_all(stem, "_")
            .chars()
            .take(MAX_STEM_CHARS)
            .collect();

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}_{}.{}", timestamp, stem, ext.to_lowercase()),
            None => format!("{}_{}", timestamp, stem),
        }
    }
}

impl BlobStore for DiskBlobStore {
    fn store(&self, kind: MediaKind, original_name: &str, bytes: &[u8]) -> Result<String> {
        let subdir = subdir_for(kind);
        let dir = self.root.join(subdir);
        fs::create_dir_all(&dir)?;

        let mut file_name = Self::file_name_for(original_name);
        let mut attempt = 1;
        while dir.join(&file_name).exists() {
            file_name = format!("{}_{}", attempt, Self::file_name_for(original_name));
            attempt += 1;
        }

        fs::write(dir.join(&file_name), bytes)?;
        info!("Stored {} ({} bytes) as {}/{}", original_name, bytes.len(), subdir, file_name);

        Ok(format!("{}/resources/{}/{}", self.base_url, subdir, file_name))
    }

    fn remove_url(&self, url: &str) -> Result<()> {
        match self.path_for_url(url) {
            Some(path) => Self::delete_blob(&path),
            None => Err(LibraryError::Validation(format!(
                "not a stored media URL: {}",
                url
            ))),
        }
    }

    fn remove_file(&self, file_path: &str) -> Result<()> {
        match self.path_for_file(file_path) {
            Some(path) => Self::delete_blob(&path),
            None => Err(LibraryError::Validation(format!(
                "file path outside the resources root: {}",
                file_path
            ))),
        }
    }
}

/// Best-effort removal of every blob a resource references
pub fn release_blobs(blobs: &dyn BlobStore, resource: &Resource) {
    for media in &resource.media {
        if media.url.is_empty() {
            continue;
        }
        if let Err(e) = blobs.remove_url(&media.url) {
            warn!("Failed to remove media {} of {}: {}", media.url, resource.id, e);
        }
    }

    if let Some(file_path) = resource.file_path.as_deref().filter(|p| !p.is_empty()) {
        if let Err(e) = blobs.remove_file(file_path) {
            warn!("Failed to remove file {} of {}: {}", file_path, resource.id, e);
        }
    }
}

// ============================================================================
// Resource Media Operations
// ============================================================================

/// Append a media entry; a second video is a conflict
pub fn attach_media(
    store: &mut LibraryStore,
    category: &str,
    id: &ResourceId,
    media: MediaRef,
) -> Result<Resource> {
    let resource = store.get_mut(category, id)?;

    if media.kind == MediaKind::Video && resource.has_video() {
        return Err(LibraryError::Conflict(format!(
            "resource {} already has a video",
            id
        )));
    }

    resource.media.push(media);
    resource.updated_at = Some(now_rfc3339());
    Ok(resource.clone())
}

/// Store an uploaded file and attach it to the resource
pub fn upload_media(
    store: &mut LibraryStore,
    blobs: &dyn BlobStore,
    category: &str,
    id: &ResourceId,
    file_name: &str,
    mime_type: Option<&str>,
    bytes: &[u8],
) -> Result<(MediaRef, Resource)> {
    if file_name.trim().is_empty() {
        return Err(LibraryError::Validation("file name is required".to_string()));
    }

    let kind = classify(mime_type, file_name);
    let existing = store.get_mut(category, id)?;
    if kind == MediaKind::Video && existing.has_video() {
        return Err(LibraryError::Conflict(format!(
            "resource {} already has a video",
            id
        )));
    }

    let url = blobs.store(kind, file_name, bytes)?;
    let media = MediaRef {
        name: file_name.to_string(),
        kind,
        size: bytes.len() as u64,
        url,
    };

    let resource = attach_media(store, category, id, media.clone())?;
    Ok((media, resource))
}

/// Remove the media entry at `index`, returning the remaining list
pub fn remove_media(
    store: &mut LibraryStore,
    blobs: &dyn BlobStore,
    category: &str,
    id: &ResourceId,
    index: usize,
) -> Result<Vec<MediaRef>> {
    let resource = store.get_mut(category, id)?;

    if index >= resource.media.len() {
        return Err(LibraryError::NotFound(format!(
            "media index {} of resource {} (has {})",
            index,
            id,
            resource.media.len()
        )));
    }

    let removed = resource.media.remove(index);
    resource.updated_at = Some(now_rfc3339());

    if !removed.url.is_empty() {
        if let Err(e) = blobs.remove_url(&removed.url) {
            warn!("Failed to remove media file {}: {}", removed.url, e);
        }
    }

    Ok(resource.media.clone())
}
