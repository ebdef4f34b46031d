//! Batch operations over many (category, id) references

use heritage_library_schemas::{
    BatchFailure, BatchOptions, BatchOutcome, BatchReport, BatchSuccess, Resource, ResourceRef,
};
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::MoveConflictPolicy;
use crate::error::{LibraryError, Result};
use crate::media::{release_blobs, BlobStore};
use crate::store::{now_rfc3339, LibraryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Delete,
    Move,
    Update,
    Tag,
    Export,
}

impl BatchAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "delete" => Some(BatchAction::Delete),
            "move" => Some(BatchAction::Move),
            "update" => Some(BatchAction::Update),
            "tag" => Some(BatchAction::Tag),
            "export" => Some(BatchAction::Export),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchAction::Delete => "delete",
            BatchAction::Move => "move",
            BatchAction::Update => "update",
            BatchAction::Tag => "tag",
            BatchAction::Export => "export",
        }
    }
}

impl fmt::Display for BatchAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies one action across a list of references
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchEngine {
    move_conflict: MoveConflictPolicy,
}

impl BatchEngine {
    pub fn new(move_conflict: MoveConflictPolicy) -> Self {
        Self { move_conflict }
    }

    /// Run `action` over every reference.
    ///
    /// Failures are collected per item; the only error returned is a failed
    /// persist after at least one item succeeded.
    pub fn apply(
        &self,
        store: &mut LibraryStore,
        blobs: &dyn BlobStore,
        action: &str,
        refs: &[ResourceRef],
        options: &BatchOptions,
    ) -> Result<BatchReport> {
        let mut report = BatchReport {
            total: refs.len(),
            ..Default::default()
        };

        let Some(parsed) = BatchAction::parse(action) else {
            warn!("Unsupported batch action: {}", action);
            report.failed = refs
                .iter()
                .map(|r| failure(r, format!("unsupported action: {}", action)))
                .collect();
            return Ok(report);
        };

        info!("Batch {}: {} resources", parsed, refs.len());

        for item in refs {
            match self.apply_one(store, blobs, parsed, item, options) {
                Ok(success) => report.success.push(success),
                Err(e) => {
                    debug!("Batch {} failed for {}/{}: {}", parsed, item.category, item.id, e);
                    report.failed.push(failure(item, e.to_string()));
                }
            }
        }

        if !report.success.is_empty() {
            store.persist()?;
        }

        info!(
            "Batch {} complete: {} succeeded, {} failed",
            parsed,
            report.success.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn apply_one(
        &self,
        store: &mut LibraryStore,
        blobs: &dyn BlobStore,
        action: BatchAction,
        item: &ResourceRef,
        options: &BatchOptions,
    ) -> Result<BatchSuccess> {
        if item.category.trim().is_empty() || item.id.is_empty() {
            return Err(LibraryError::Validation("missing category or id".to_string()));
        }

        let category = item.category.as_str();
        let resource = store.get(category, &item.id)?;

        let mut success = BatchSuccess {
            category: item.category.clone(),
            id: item.id.clone(),
            action: BatchOutcome::Exported,
            target_category: None,
            tags: None,
            data: None,
        };

        match action {
            BatchAction::Delete => {
                release_blobs(blobs, &resource);
                store.remove(category, &item.id);
                success.action = BatchOutcome::Deleted;
            }
            BatchAction::Move => {
                let target = options
                    .target_category
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        LibraryError::Validation("targetCategory is required".to_string())
                    })?;
                self.move_resource(store, category, target, resource)?;
                success.action = BatchOutcome::Moved;
                success.target_category = Some(target.to_string());
            }
            BatchAction::Update => {
                let updates = options
                    .updates
                    .as_ref()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| LibraryError::Validation("updates are required".to_string()))?;
                let updated = store.update(category, &item.id, updates)?;
                success.action = BatchOutcome::Updated;
                success.data = Some(updated);
            }
            BatchAction::Tag => {
                let tags = options
                    .tags
                    .as_ref()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| LibraryError::Validation("tags are required".to_string()))?;
                let merged = merge_tags(&resource.tags, tags);

                let mut updates = Map::new();
                updates.insert(
                    "tags".to_string(),
                    Value::Array(merged.iter().cloned().map(Value::String).collect()),
                );
                store.update(category, &item.id, &updates)?;

                success.action = BatchOutcome::Tagged;
                success.tags = Some(merged);
            }
            BatchAction::Export => {
                success.action = BatchOutcome::Exported;
                success.data = Some(resource);
            }
        }

        Ok(success)
    }

    fn move_resource(
        &self,
        store: &mut LibraryStore,
        source: &str,
        target: &str,
        mut resource: Resource,
    ) -> Result<()> {
        if source == target {
            return Err(LibraryError::Validation(format!(
                "resource is already in category {}",
                target
            )));
        }

        if store.contains(target, &resource.id) {
            match self.move_conflict {
                MoveConflictPolicy::Reject => {
                    return Err(LibraryError::Conflict(format!(
                        "category {} already holds resource {}",
                        target, resource.id
                    )));
                }
                MoveConflictPolicy::Overwrite => {
                    warn!(
                        "Move of {} from {} overwrites the record already in {}",
                        resource.id, source, target
                    );
                }
            }
        }

        let id = resource.id.clone();
        resource.category = target.to_string();
        resource.updated_at = Some(now_rfc3339());
        store.add(target, resource)?;
        store.remove(source, &id);
        Ok(())
    }
}

/// Existing tags first, then new ones, without duplicates
pub fn merge_tags(existing: &[String], new: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + new.len());
    for tag in existing.iter().chain(new) {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
}

fn failure(item: &ResourceRef, error: String) -> BatchFailure {
    BatchFailure {
        category: item.category.clone(),
        id: item.id.clone(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::DiskBlobStore;
    use heritage_library_schemas::ResourceId;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: LibraryStore,
        blobs: DiskBlobStore,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let mut store = LibraryStore::new(temp.path().join("knowledge"));
        for (category, id, title) in [
            ("foods", "r1", "烤鸭"),
            ("foods", "r2", "饺子"),
            ("crafts", "r1", "剪纸"),
        ] {
            store
                .add(
                    category,
                    Resource {
                        id: ResourceId::from(id),
                        title: title.to_string(),
                        tags: vec!["传统".to_string()],
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        let blobs = DiskBlobStore::new(temp.path(), "http://localhost:3001");
        Fixture {
            _temp: temp,
            store,
            blobs,
        }
    }

    #[test]
    fn test_delete_with_missing_refs() {
        let mut f = fixture();
        let refs = vec![
            ResourceRef::new("foods", "r1"),
            ResourceRef::new("foods", "ghost"),
            ResourceRef::new("", "r2"),
        ];

        let report = BatchEngine::default()
            .apply(&mut f.store, &f.blobs, "delete", &refs, &BatchOptions::default())
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.success.len(), 1);
        assert_eq!(report.success[0].action, BatchOutcome::Deleted);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[1].error, "Validation error: missing category or id");
        assert!(f.store.get("foods", &"r1".into()).is_err());
        assert!(f.store.get("foods", &"r2".into()).is_ok());
    }

    #[test]
    fn test_move_preserves_id_and_rewrites_category() {
        let mut f = fixture();
        let options = BatchOptions {
            target_category: Some("snacks".to_string()),
            ..Default::default()
        };

        let report = BatchEngine::default()
            .apply(
                &mut f.store,
                &f.blobs,
                "move",
                &[ResourceRef::new("foods", "r2")],
                &options,
            )
            .unwrap();

        assert_eq!(report.success[0].target_category.as_deref(), Some("snacks"));
        assert!(f.store.get("foods", &"r2".into()).is_err());
        let moved = f.store.get("snacks", &"r2".into()).unwrap();
        assert_eq!(moved.category, "snacks");
        assert!(moved.updated_at.is_some());
    }

    #[test]
    fn test_move_conflict_policies() {
        let options = BatchOptions {
            target_category: Some("crafts".to_string()),
            ..Default::default()
        };
        let refs = [ResourceRef::new("foods", "r1")];

        let mut f = fixture();
        let report = BatchEngine::new(MoveConflictPolicy::Reject)
            .apply(&mut f.store, &f.blobs, "move", &refs, &options)
            .unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(f.store.get("crafts", &"r1".into()).unwrap().title, "剪纸");
        assert!(f.store.get("foods", &"r1".into()).is_ok());

        let mut f = fixture();
        let report = BatchEngine::new(MoveConflictPolicy::Overwrite)
            .apply(&mut f.store, &f.blobs, "move", &refs, &options)
            .unwrap();
        assert_eq!(report.success.len(), 1);
        assert_eq!(f.store.get("crafts", &"r1".into()).unwrap().title, "烤鸭");
    }

    #[test]
    fn test_move_requires_distinct_target() {
        let mut f = fixture();
        let refs = [ResourceRef::new("foods", "r1")];

        let report = BatchEngine::default()
            .apply(&mut f.store, &f.blobs, "move", &refs, &BatchOptions::default())
            .unwrap();
        assert_eq!(report.failed.len(), 1);

        let same = BatchOptions {
            target_category: Some("foods".to_string()),
            ..Default::default()
        };
        let report = BatchEngine::default()
            .apply(&mut f.store, &f.blobs, "move", &refs, &same)
            .unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(f.store.get("foods", &"r1".into()).is_ok());
    }

    #[test]
    fn test_tag_unions_without_duplicates() {
        let mut f = fixture();
        let options = BatchOptions {
            tags: Some(vec!["北京".to_string(), "传统".to_string()]),
            ..Default::default()
        };

        let report = BatchEngine::default()
            .apply(
                &mut f.store,
                &f.blobs,
                "tag",
                &[ResourceRef::new("foods", "r1")],
                &options,
            )
            .unwrap();

        let expected = vec!["传统".to_string(), "北京".to_string()];
        assert_eq!(report.success[0].tags.as_ref(), Some(&expected));
        assert_eq!(f.store.get("foods", &"r1".into()).unwrap().tags, expected);
    }

    #[test]
    fn test_update_and_export() {
        let mut f = fixture();
        let options = BatchOptions {
            updates: json!({"description": "片皮"}).as_object().cloned(),
            ..Default::default()
        };
        let refs = [ResourceRef::new("foods", "r1")];
        let engine = BatchEngine::default();

        let report = engine
            .apply(&mut f.store, &f.blobs, "update", &refs, &options)
            .unwrap();
        assert_eq!(report.success[0].data.as_ref().unwrap().description, "片皮");

        let report = engine
            .apply(&mut f.store, &f.blobs, "export", &refs, &BatchOptions::default())
            .unwrap();
        assert_eq!(report.success[0].action, BatchOutcome::Exported);
        assert_eq!(report.success[0].data.as_ref().unwrap().title, "烤鸭");

        let report = engine
            .apply(&mut f.store, &f.blobs, "update", &refs, &BatchOptions::default())
            .unwrap();
        assert_eq!(report.failed.len(), 1);
    }

    #[test]
    fn test_unsupported_action_fails_every_item() {
        let mut f = fixture();
        let refs = [ResourceRef::new("foods", "r1"), ResourceRef::new("foods", "r2")];

        let report = BatchEngine::default()
            .apply(&mut f.store, &f.blobs, "archive", &refs, &BatchOptions::default())
            .unwrap();

        assert!(report.success.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(report
            .failed
            .iter()
            .all(|f| f.error == "unsupported action: archive"));
        assert_eq!(f.store.total_resources(), 3);
    }

    #[test]
    fn test_successful_batch_persists() {
        let mut f = fixture();
        let knowledge = f.store.knowledge_dir().to_path_buf();

        BatchEngine::default()
            .apply(
                &mut f.store,
                &f.blobs,
                "delete",
                &[ResourceRef::new("foods", "r1")],
                &BatchOptions::default(),
            )
            .unwrap();

        let mut reloaded = LibraryStore::load(&knowledge).unwrap();
        assert!(reloaded.get("foods", &"r1".into()).is_err());
        assert!(reloaded.get("foods", &"r2".into()).is_ok());
    }
}
