use chrono::{DateTime, Duration, Utc};
use heritage_library_schemas::{MediaKind, Resource};
use heritage_library_store::LibraryStore;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

const POPULAR_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub with_media: usize,
    pub without_media: usize,
    pub recently_updated: usize,
    pub recently_created: usize,
    pub high_quality: usize,
    pub incomplete: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQuality {
    pub with_history: usize,
    pub with_technique: usize,
    pub with_features: usize,
    pub with_fun_fact: usize,
    pub with_tags: usize,
    pub with_keywords: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub resource_count: usize,
    pub media_count: usize,
    pub total_size: u64,
    pub with_media: usize,
    pub without_media: usize,
    pub high_quality: usize,
    pub incomplete: usize,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFiles {
    pub images: usize,
    pub videos: usize,
    pub audio: usize,
    pub documents: usize,
    pub total_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDistribution {
    pub this_week: usize,
    pub this_month: usize,
    pub this_year: usize,
    pub older: usize,
}

/// Name → count pairs, highest count first; serializes as an ordered map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranked(pub Vec<(String, usize)>);

impl Ranked {
    fn top(counts: HashMap<String, usize>, limit: usize) -> Self {
        let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(limit);
        Ranked(entries)
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, c)| *c)
    }
}

impl Serialize for Ranked {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, count) in &self.0 {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

/// Aggregate counts over the whole library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub total_categories: usize,
    pub total_resources: usize,
    pub total_media: usize,
    pub total_file_size: u64,
    pub resource_usage: ResourceUsage,
    pub content_quality: ContentQuality,
    pub popular_tags: Ranked,
    pub popular_keywords: Ranked,
    pub categories: BTreeMap<String, CategoryStats>,
    /// Media count per lower-cased file extension (`.png`, `.mp4`, ...)
    pub file_types: BTreeMap<String, usize>,
    pub media_files: MediaFiles,
    pub time_distribution: TimeDistribution,
}

impl LibraryStats {
    /// Walk every category once
    pub fn collect(store: &LibraryStore, now: DateTime<Utc>) -> Self {
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);
        let year_ago = now - Duration::days(365);

        let mut stats = LibraryStats::default();
        let mut tags: HashMap<String, usize> = HashMap::new();
        let mut keywords: HashMap<String, usize> = HashMap::new();

        for (category, collection) in store.categories() {
            let mut category_stats = CategoryStats {
                resource_count: collection.len(),
                ..Default::default()
            };

            for resource in collection.iter() {
                stats.count_media(resource, &mut category_stats);

                if let Some(updated) = resource.updated_at.as_deref() {
                    match parse_time(updated) {
                        Some(t) if t >= week_ago => {
                            stats.time_distribution.this_week += 1;
                            stats.resource_usage.recently_updated += 1;
                        }
                        Some(t) if t >= month_ago => stats.time_distribution.this_month += 1,
                        Some(t) if t >= year_ago => stats.time_distribution.this_year += 1,
                        _ => stats.time_distribution.older += 1,
                    }

                    let newer = category_stats
                        .last_updated
                        .as_deref()
                        .map_or(true, |last| updated > last);
                    if newer {
                        category_stats.last_updated = Some(updated.to_string());
                    }
                }

                if let Some(created) = resource.created_at.as_deref().and_then(parse_time) {
                    if created >= week_ago {
                        stats.resource_usage.recently_created += 1;
                    }
                }

                let quality = stats.grade_content(resource, &mut tags, &mut keywords);
                if quality >= 4 {
                    stats.resource_usage.high_quality += 1;
                    category_stats.high_quality += 1;
                } else if quality <= 1 {
                    stats.resource_usage.incomplete += 1;
                    category_stats.incomplete += 1;
                }
            }

            stats.total_resources += category_stats.resource_count;
            stats.categories.insert(category.to_string(), category_stats);
        }

        stats.total_categories = stats.categories.len();
        stats.total_media = stats.media_files.images
            + stats.media_files.videos
            + stats.media_files.audio
            + stats.media_files.documents;
        stats.total_file_size = stats.media_files.total_size;
        stats.popular_tags = Ranked::top(tags, POPULAR_LIMIT);
        stats.popular_keywords = Ranked::top(keywords, POPULAR_LIMIT);

        debug!(
            "Collected statistics: {} categories, {} resources, {} media",
            stats.total_categories, stats.total_resources, stats.total_media
        );
        stats
    }

    fn count_media(&mut self, resource: &Resource, category: &mut CategoryStats) {
        if resource.media.is_empty() {
            self.resource_usage.without_media += 1;
            category.without_media += 1;
            return;
        }

        self.resource_usage.with_media += 1;
        category.with_media += 1;
        category.media_count += resource.media.len();

        for media in &resource.media {
            match media.kind {
                MediaKind::Image => self.media_files.images += 1,
                MediaKind::Video => self.media_files.videos += 1,
                MediaKind::Audio => self.media_files.audio += 1,
                MediaKind::Document => self.media_files.documents += 1,
            }
            category.total_size += media.size;
            self.media_files.total_size += media.size;

            if let Some(ext) = Path::new(&media.name).extension().and_then(|e| e.to_str()) {
                *self
                    .file_types
                    .entry(format!(".{}", ext.to_lowercase()))
                    .or_insert(0) += 1;
            }
        }
    }

    /// Count filled-in content fields; returns the quality score (0..=6)
    fn grade_content(
        &mut self,
        resource: &Resource,
        tags: &mut HashMap<String, usize>,
        keywords: &mut HashMap<String, usize>,
    ) -> usize {
        let q = &mut self.content_quality;
        let mut score = 0;

        for (field, counter) in [
            ("history", &mut q.with_history),
            ("technique", &mut q.with_technique),
            ("features", &mut q.with_features),
            ("funFact", &mut q.with_fun_fact),
        ] {
            if resource.text_field(field).is_some() {
                *counter += 1;
                score += 1;
            }
        }

        if !resource.tags.is_empty() {
            q.with_tags += 1;
            score += 1;
            for tag in &resource.tags {
                *tags.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        if !resource.keywords.is_empty() {
            q.with_keywords += 1;
            score += 1;
            for keyword in &resource.keywords {
                *keywords.entry(keyword.clone()).or_insert(0) += 1;
            }
        }

        score
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
