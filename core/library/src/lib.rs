pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod media;
pub mod store;

pub use batch::{merge_tags, BatchAction, BatchEngine};
pub use config::{LibraryConfig, MoveConflictPolicy, DEFAULT_BASE_URL};
pub use error::{LibraryError, Result};
pub use export::{export_file_name, export_resources, render, ExportFile};
pub use media::{
    attach_media, classify, release_blobs, remove_media, upload_media, BlobStore, DiskBlobStore,
};
pub use store::{now_rfc3339, Collection, LibraryStore, DATA_FILE};
