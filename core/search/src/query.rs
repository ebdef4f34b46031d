use chrono::DateTime;
use heritage_library_schemas::{
    generate_fallback_token, ListOptions, Pagination, Resource, ResourceId, SortBy, SortOrder,
};
use heritage_library_store::LibraryStore;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

/// Resources regrouped by category, keeping the order they were added in.
///
/// Serializes as `{ "<category>": { "<id>": resource, ... }, ... }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryGroups {
    groups: Vec<(String, Vec<(ResourceId, Resource)>)>,
}

impl CategoryGroups {
    /// Append a record; a repeated id within a category replaces the earlier
    /// record in place.
    pub fn push(&mut self, category: &str, id: ResourceId, resource: Resource) {
        let index = match self.groups.iter().position(|(name, _)| name == category) {
            Some(index) => index,
            None => {
                self.groups.push((category.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };

        let members = &mut self.groups[index].1;
        match members.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = resource,
            None => members.push((id, resource)),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, members)| members.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.groups.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Resources of one category in insertion order
    pub fn get(&self, category: &str) -> Option<Vec<&Resource>> {
        self.groups
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, members)| members.iter().map(|(_, r)| r).collect())
    }

    /// Every resource in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.groups
            .iter()
            .flat_map(|(_, members)| members.iter().map(|(_, r)| r))
    }
}

struct Members<'a>(&'a [(ResourceId, Resource)]);

impl Serialize for Members<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, resource) in self.0 {
            map.serialize_entry(id.as_str(), resource)?;
        }
        map.end()
    }
}

impl Serialize for CategoryGroups {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (category, members) in &self.groups {
            map.serialize_entry(category, &Members(members))?;
        }
        map.end()
    }
}

/// One page of the listing
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePage {
    pub resources: CategoryGroups,
    pub pagination: Pagination,
}

/// The whole library reshaped for client-side search
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAll {
    pub resources: CategoryGroups,
    pub total_count: usize,
}

struct Entry {
    category: String,
    id: ResourceId,
    resource: Resource,
}

/// Every record tagged with its category; records without an id get one
/// for this view only.
fn flatten(store: &LibraryStore) -> Vec<Entry> {
    let mut entries = Vec::with_capacity(store.total_resources());
    for (category, collection) in store.categories() {
        for resource in collection.iter() {
            let mut resource = resource.clone();
            resource.category = category.to_string();
            if resource.id.is_empty() {
                resource.id = fallback_id(&resource);
            }
            entries.push(Entry {
                category: category.to_string(),
                id: resource.id.clone(),
                resource,
            });
        }
    }
    entries
}

fn fallback_id(resource: &Resource) -> ResourceId {
    let legacy = resource.extra.get("_id").and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    let id = legacy
        .or_else(|| Some(resource.title.clone()).filter(|t| !t.trim().is_empty()))
        .unwrap_or_else(generate_fallback_token);
    ResourceId(id)
}

fn haystack(resource: &Resource) -> String {
    let content = resource.text_field("content").unwrap_or_default();
    format!(
        "{}{}{}{}{}",
        resource.title,
        resource.description,
        content,
        resource.tags.join(""),
        resource.keywords.join("")
    )
    .to_lowercase()
}

/// Milliseconds since the epoch; missing or unparseable dates sort as 0
fn timestamp(raw: Option<&str>) -> i64 {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

fn compare(a: &Resource, b: &Resource, sort_by: SortBy) -> Ordering {
    match sort_by {
        SortBy::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortBy::CreatedAt => {
            timestamp(a.created_at.as_deref()).cmp(&timestamp(b.created_at.as_deref()))
        }
        SortBy::UpdatedAt => {
            timestamp(a.updated_at.as_deref()).cmp(&timestamp(b.updated_at.as_deref()))
        }
    }
}

/// Filtered, sorted and paginated listing across every category
pub fn list_all(store: &LibraryStore, options: &ListOptions) -> ResourcePage {
    let limit = options.limit.max(1);
    let mut entries = flatten(store);

    if let Some(category) = options.category.as_deref().filter(|c| !c.is_empty()) {
        entries.retain(|e| e.category == category);
    }

    if let Some(needle) = options
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
    {
        entries.retain(|e| haystack(&e.resource).contains(&needle));
    }

    entries.sort_by(|a, b| {
        let ordering = compare(&a.resource, &b.resource, options.sort_by);
        match options.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let total_items = entries.len();
    let total_pages = total_items.div_ceil(limit);
    let current_page = options.page.clamp(1, total_pages.max(1));
    let start = (current_page - 1) * limit;

    let mut resources = CategoryGroups::default();
    for entry in entries.into_iter().skip(start).take(limit) {
        resources.push(&entry.category, entry.id, entry.resource);
    }

    debug!(
        "Listed page {}/{} ({} of {} resources)",
        current_page,
        total_pages,
        resources.len(),
        total_items
    );

    ResourcePage {
        resources,
        pagination: Pagination {
            current_page,
            items_per_page: limit,
            total_items,
            total_pages,
            has_prev_page: current_page > 1,
            has_next_page: current_page < total_pages,
        },
    }
}

/// Every resource, grouped by category, without filtering or paging
pub fn search_all(store: &LibraryStore) -> SearchAll {
    let mut resources = CategoryGroups::default();
    for entry in flatten(store) {
        resources.push(&entry.category, entry.id, entry.resource);
    }

    SearchAll {
        total_count: store.total_resources(),
        resources,
    }
}

/// Substring search over title, description and tags, optionally in one
/// category
pub fn search_resources(store: &LibraryStore, query: &str, category: Option<&str>) -> Vec<Resource> {
    let needle = query.trim().to_lowercase();
    flatten(store)
        .into_iter()
        .filter(|e| category.map_or(true, |c| c.is_empty() || e.category == c))
        .filter(|e| {
            let r = &e.resource;
            format!("{} {} {}", r.title, r.description, r.tags.join(" "))
                .to_lowercase()
                .contains(&needle)
        })
        .map(|e| e.resource)
        .collect()
}
