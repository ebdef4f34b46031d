//! Category store with one JSON document per category
//!
//! Directory layout:
//! ```text
//! <knowledge>/
//! ├── traditionalFoods/
//! │   └── data.json
//! └── traditionalCrafts/
//!     └── data.json
//! ```
//!
//! Documents are read in any of three shapes (flat list, `{"resources": {...}}`
//! envelope, raw id-keyed map) and always written back as a raw id-keyed map.

use chrono::{SecondsFormat, Utc};
use heritage_library_schemas::{generate_resource_id, Resource, ResourceId};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::error::{LibraryError, Result};

pub const DATA_FILE: &str = "data.json";

/// Fields only the server sets, from an uploaded file
const SERVER_FILE_FIELDS: &[&str] = &["filePath", "fileName", "fileSize", "mimeType"];

/// Current time in the format stored in `createdAt`/`updatedAt`
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Resources of one category.
///
/// `Listed` holds records in document order and may contain records without
/// an id; it becomes `Keyed` on the first keyed access and stays that way.
#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    Listed(Vec<Resource>),
    Keyed(BTreeMap<ResourceId, Resource>),
}

impl Default for Collection {
    fn default() -> Self {
        Collection::Keyed(BTreeMap::new())
    }
}

impl Collection {
    pub fn len(&self) -> usize {
        match self {
            Collection::Listed(items) => items.len(),
            Collection::Keyed(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in storage order, whatever the shape
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Resource> + '_> {
        match self {
            Collection::Listed(items) => Box::new(items.iter()),
            Collection::Keyed(map) => Box::new(map.values()),
        }
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, Collection::Keyed(_))
    }

    /// Resolve to the keyed shape, assigning `item_<index>` to records
    /// without an id.
    fn keyed(&mut self, category: &str) -> &mut BTreeMap<ResourceId, Resource> {
        if let Collection::Listed(items) = self {
            let items = std::mem::take(items);
            let count = items.len();
            let mut map = BTreeMap::new();
            for (index, mut resource) in items.into_iter().enumerate() {
                if resource.id.is_empty() {
                    resource.id = ResourceId(format!("item_{}", index));
                }
                resource.category = category.to_string();
                map.insert(resource.id.clone(), resource);
            }
            debug!("Normalized category {} from list ({} records)", category, count);
            *self = Collection::Keyed(map);
        }

        match self {
            Collection::Keyed(map) => map,
            Collection::Listed(_) => unreachable!("collection normalized above"),
        }
    }
}

/// In-memory resource library mirrored to `<knowledge>/<category>/data.json`
#[derive(Debug)]
pub struct LibraryStore {
    knowledge_dir: PathBuf,
    categories: BTreeMap<String, Collection>,
    /// Records that did not fit the schema, written back as they were read
    unreadable: BTreeMap<String, Map<String, Value>>,
}

impl LibraryStore {
    /// Empty store rooted at `knowledge_dir`; nothing is read or written
    pub fn new<P: AsRef<Path>>(knowledge_dir: P) -> Self {
        Self {
            knowledge_dir: knowledge_dir.as_ref().to_path_buf(),
            categories: BTreeMap::new(),
            unreadable: BTreeMap::new(),
        }
    }

    /// Load every category directory under `knowledge_dir`.
    ///
    /// A category whose document cannot be parsed is logged and comes up
    /// empty; the remaining categories still load.
    pub fn load<P: AsRef<Path>>(knowledge_dir: P) -> Result<Self> {
        let mut store = Self::new(knowledge_dir);

        if !store.knowledge_dir.exists() {
            info!(
                "Knowledge directory {} missing, creating it",
                store.knowledge_dir.display()
            );
            fs::create_dir_all(&store.knowledge_dir)?;
            return Ok(store);
        }

        for entry in fs::read_dir(&store.knowledge_dir)?.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(category) = path.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                warn!("Skipping non UTF-8 category directory {}", path.display());
                continue;
            };

            let (collection, unreadable) =
                Self::load_category(&category, &path.join(DATA_FILE));
            info!("Loaded category {}: {} resources", category, collection.len());
            if !unreadable.is_empty() {
                store.unreadable.insert(category.clone(), unreadable);
            }
            store.categories.insert(category, collection);
        }

        info!(
            "Resource library loaded: {} categories, {} resources",
            store.categories.len(),
            store.total_resources()
        );
        Ok(store)
    }

    fn load_category(category: &str, data_file: &Path) -> (Collection, Map<String, Value>) {
        if !data_file.exists() {
            return Default::default();
        }

        let raw = match fs::read_to_string(data_file) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to read {}: {}", data_file.display(), e);
                return Default::default();
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(document) => Self::parse_document(category, document),
            Err(e) => {
                error!("Failed to parse data for category {}: {}", category, e);
                Default::default()
            }
        }
    }

    /// Accept a flat list, a `{"resources": {...}}` envelope or a raw id map.
    ///
    /// Records that do not fit the schema come back separately, keyed by
    /// their map key or string `id`, so they can be written back untouched.
    pub fn parse_document(category: &str, document: Value) -> (Collection, Map<String, Value>) {
        let entries: Vec<(Option<String>, Value)> = match document {
            Value::Array(items) => items.into_iter().map(|item| (None, item)).collect(),
            Value::Object(mut map) => {
                let fields = match map.remove("resources") {
                    Some(Value::Object(resources)) => resources,
                    Some(other) => {
                        map.insert("resources".to_string(), other);
                        map
                    }
                    None => map,
                };
                fields.into_iter().map(|(key, item)| (Some(key), item)).collect()
            }
            other => {
                error!(
                    "Unexpected document shape for category {}: {}",
                    category,
                    type_name(&other)
                );
                return Default::default();
            }
        };

        let mut map = BTreeMap::new();
        let mut unreadable = Map::new();
        for (key, item) in entries {
            let mut resource: Resource = match serde_json::from_value(item.clone()) {
                Ok(resource) => resource,
                Err(e) => {
                    let key = key.or_else(|| {
                        item.get("id")
                            .and_then(Value::as_str)
                            .filter(|id| !id.trim().is_empty())
                            .map(String::from)
                    });
                    match key {
                        Some(key) => {
                            warn!(
                                "Keeping unreadable record {} in category {} as is: {}",
                                key, category, e
                            );
                            unreadable.insert(key, item);
                        }
                        None => warn!(
                            "Dropping unreadable list item without id in category {}: {}",
                            category, e
                        ),
                    }
                    continue;
                }
            };

            let id = match key {
                Some(key) => {
                    if resource.id.is_empty() {
                        resource.id = ResourceId(key.clone());
                    }
                    ResourceId(key)
                }
                // list items are only kept when they carry their own id
                None if resource.id.is_empty() => continue,
                None => resource.id.clone(),
            };

            resource.category = category.to_string();
            map.insert(id, resource);
        }

        (Collection::Keyed(map), unreadable)
    }

    /// Raw records of a category that could not be read into the schema
    pub fn unreadable(&self, category: &str) -> Option<&Map<String, Value>> {
        self.unreadable.get(category)
    }

    pub fn knowledge_dir(&self) -> &Path {
        &self.knowledge_dir
    }

    /// All categories with their collections, in name order
    pub fn categories(&self) -> impl Iterator<Item = (&str, &Collection)> {
        self.categories.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    /// List view of one category; empty for an unknown category
    pub fn category_resources(&self, category: &str) -> Vec<Resource> {
        self.categories
            .get(category)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Install a list-shaped collection, replacing whatever the category held
    pub fn set_category(&mut self, category: &str, resources: Vec<Resource>) -> Result<()> {
        validate_category(category)?;
        self.categories
            .insert(category.to_string(), Collection::Listed(resources));
        Ok(())
    }

    pub fn total_resources(&self) -> usize {
        self.categories.values().map(Collection::len).sum()
    }

    pub fn contains(&mut self, category: &str, id: &ResourceId) -> bool {
        self.categories
            .get_mut(category)
            .map(|c| c.keyed(category).contains_key(id))
            .unwrap_or(false)
    }

    /// Fetch a copy of one record
    pub fn get(&mut self, category: &str, id: &ResourceId) -> Result<Resource> {
        self.get_mut(category, id).map(|r| r.clone())
    }

    pub fn get_mut(&mut self, category: &str, id: &ResourceId) -> Result<&mut Resource> {
        let collection = self
            .categories
            .get_mut(category)
            .ok_or_else(|| LibraryError::resource_not_found(category, id))?;

        let resource = collection
            .keyed(category)
            .get_mut(id)
            .ok_or_else(|| LibraryError::resource_not_found(category, id))?;

        if resource.category != category {
            resource.category = category.to_string();
        }
        Ok(resource)
    }

    /// Insert or overwrite by id, creating the category if needed
    pub fn add(&mut self, category: &str, mut resource: Resource) -> Result<()> {
        validate_category(category)?;
        if resource.id.is_empty() {
            return Err(LibraryError::Validation(
                "resource id must not be empty".to_string(),
            ));
        }

        resource.category = category.to_string();
        let collection = self.categories.entry(category.to_string()).or_default();
        let previous = collection
            .keyed(category)
            .insert(resource.id.clone(), resource);

        if let Some(previous) = previous {
            debug!("Overwrote resource {} in category {}", previous.id, category);
        }
        Ok(())
    }

    /// Build a new record from submitted fields and add it.
    ///
    /// The id and both timestamps are assigned here; `tags` and `keywords`
    /// may arrive as comma-separated strings.
    pub fn create(&mut self, category: &str, mut fields: Map<String, Value>) -> Result<Resource> {
        validate_category(category)?;

        for list in ["tags", "keywords"] {
            if let Some(Value::String(raw)) = fields.get(list) {
                let items: Vec<Value> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect();
                fields.insert(list.to_string(), Value::Array(items));
            }
        }
        fields.remove("id");
        fields.remove("category");
        for key in SERVER_FILE_FIELDS {
            fields.remove(*key);
        }

        let mut resource: Resource = serde_json::from_value(Value::Object(fields))
            .map_err(|e| LibraryError::Validation(format!("invalid resource: {}", e)))?;

        if resource.title.trim().is_empty() {
            resource.title = "未命名资源".to_string();
        }
        let now = now_rfc3339();
        resource.id = generate_resource_id();
        resource.created_at = Some(now.clone());
        resource.updated_at = Some(now);

        self.add(category, resource.clone())?;
        resource.category = category.to_string();
        info!("Created resource {} in category {}", resource.id, category);
        Ok(resource)
    }

    /// Shallow-merge `updates` over the stored record and stamp `updatedAt`.
    ///
    /// `id`, `category` and the uploaded-file fields are ignored. A merge that
    /// does not produce a valid record leaves the stored one untouched.
    pub fn update(
        &mut self,
        category: &str,
        id: &ResourceId,
        updates: &Map<String, Value>,
    ) -> Result<Resource> {
        let record = self.get_mut(category, id)?;

        let mut merged = serde_json::to_value(&*record)?;
        if let Value::Object(fields) = &mut merged {
            for (key, value) in updates {
                if key == "id" || key == "category" || SERVER_FILE_FIELDS.contains(&key.as_str())
                {
                    continue;
                }
                fields.insert(key.clone(), value.clone());
            }
            fields.insert("updatedAt".to_string(), Value::String(now_rfc3339()));
        }

        let mut updated: Resource = serde_json::from_value(merged).map_err(|e| {
            LibraryError::Validation(format!("invalid update for resource {}: {}", id, e))
        })?;
        updated.id = id.clone();
        updated.category = category.to_string();

        *record = updated.clone();
        Ok(updated)
    }

    /// Remove and return a record
    pub fn remove(&mut self, category: &str, id: &ResourceId) -> Option<Resource> {
        self.categories
            .get_mut(category)
            .and_then(|c| c.keyed(category).remove(id))
    }

    /// Returns false when the record was absent
    pub fn delete(&mut self, category: &str, id: &ResourceId) -> bool {
        self.remove(category, id).is_some()
    }

    /// Rewrite every category document.
    ///
    /// Stops at the first failed write; categories written before it stay on
    /// disk.
    pub fn persist(&mut self) -> Result<()> {
        fs::create_dir_all(&self.knowledge_dir)?;

        let names = self.category_names();
        for name in &names {
            self.persist_category(name)?;
        }

        info!(
            "Resource library saved: {} categories to {}",
            names.len(),
            self.knowledge_dir.display()
        );
        Ok(())
    }

    /// Rewrite one category document
    pub fn persist_category(&mut self, category: &str) -> Result<()> {
        let collection = self
            .categories
            .get_mut(category)
            .ok_or_else(|| LibraryError::category_not_found(category))?;

        let mut document = Map::new();
        for (id, resource) in collection.keyed(category).iter() {
            document.insert(id.to_string(), serde_json::to_value(resource)?);
        }
        if let Some(unreadable) = self.unreadable.get(category) {
            for (key, raw) in unreadable {
                // a readable record under the same id has replaced it
                if !document.contains_key(key) {
                    document.insert(key.clone(), raw.clone());
                }
            }
        }
        let body = serde_json::to_string_pretty(&document)?;

        let dir = self.knowledge_dir.join(category);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(DATA_FILE), body)?;

        debug!("Wrote {}", dir.join(DATA_FILE).display());
        Ok(())
    }
}

/// Category names become directory names
fn validate_category(category: &str) -> Result<()> {
    let trimmed = category.trim();
    if trimmed.is_empty()
        || trimmed != category
        || category == "."
        || category == ".."
        || category.contains(['/', '\\'])
    {
        return Err(LibraryError::Validation(format!(
            "invalid category name: {:?}",
            category
        )));
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
