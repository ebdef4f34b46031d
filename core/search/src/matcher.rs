//! Keyword extraction and scoring for conversational lookups

use heritage_library_schemas::{Resource, ResourceId};
use heritage_library_store::LibraryStore;
use serde::Serialize;
use tracing::debug;

const SEPARATORS: &[char] = &['，', '。', '！', '？', '、', ',', '.', '!', '-'];

/// Longest first so `看看` is removed before `看`
const STOP_WORDS: &[&str] = &[
    "我要", "给我", "图片", "照片", "视频", "相关", "看看", "的", "了", "和", "与", "请", "看",
];

/// Score weights and cut-offs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchThresholds {
    pub exact_title: u32,
    pub exact_keyword: u32,
    pub containment: u32,
    /// Minimum score for a resource to count as a match
    pub qualify: u32,
    pub max_results: usize,
    /// A top score ahead of the runner-up by more than this is returned alone
    pub collapse_gap: u32,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            exact_title: 20,
            exact_keyword: 15,
            containment: 5,
            qualify: 10,
            max_results: 3,
            collapse_gap: 5,
        }
    }
}

/// A resource that matched a message, with how it matched
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResource {
    #[serde(flatten)]
    pub resource: Resource,
    pub match_score: u32,
    pub best_match: String,
    pub exact_title_match: bool,
}

impl ScoredResource {
    pub fn category(&self) -> &str {
        &self.resource.category
    }

    pub fn id(&self) -> &ResourceId {
        &self.resource.id
    }
}

/// Candidate keywords for a message: the message itself, then the words left
/// after punctuation and stop-words are stripped.
pub fn extract_keywords(message: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    let original = message.trim();
    if !original.is_empty() {
        candidates.push(original.to_string());
    }

    let mut cleaned: String = original
        .chars()
        .map(|c| if SEPARATORS.contains(&c) { ' ' } else { c })
        .collect();
    for stop_word in STOP_WORDS {
        cleaned = cleaned.replace(stop_word, " ");
    }

    for word in cleaned.split_whitespace() {
        if word.chars().count() <= 1 || STOP_WORDS.contains(&word) {
            continue;
        }
        if !candidates.iter().any(|c| c == word) {
            candidates.push(word.to_string());
        }
    }

    candidates
}

#[derive(Debug, Clone, Default)]
pub struct ResourceMatcher {
    thresholds: MatchThresholds,
}

impl ResourceMatcher {
    pub fn new(thresholds: MatchThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &MatchThresholds {
        &self.thresholds
    }

    /// Best matches for `message` across every category
    pub fn find_matches(&self, store: &LibraryStore, message: &str) -> Vec<ScoredResource> {
        let keywords = extract_keywords(message);
        debug!("Extracted keywords: {:?}", keywords);
        if keywords.is_empty() {
            return Vec::new();
        }

        let mut found = Vec::new();
        for (category, collection) in store.categories() {
            for (index, resource) in collection.iter().enumerate() {
                if let Some(mut scored) = self.score(resource, &keywords) {
                    scored.resource.category = category.to_string();
                    if scored.resource.id.is_empty() {
                        // same key the store assigns when it normalizes the list
                        scored.resource.id = ResourceId(format!("item_{}", index));
                    }
                    found.push(scored);
                }
            }
        }

        self.rank(found)
    }

    /// Score one resource; `None` when it does not qualify
    pub fn score(&self, resource: &Resource, keywords: &[String]) -> Option<ScoredResource> {
        let t = &self.thresholds;
        let fields: Vec<&str> = [resource.title.as_str(), resource.description.as_str()]
            .into_iter()
            .chain(resource.tags.iter().map(String::as_str))
            .chain(resource.keywords.iter().map(String::as_str))
            .filter(|f| !f.is_empty())
            .collect();

        let mut score = 0;
        let mut best_match = String::new();
        let mut exact_title_match = false;

        for keyword in keywords {
            if resource.title == *keyword {
                score += t.exact_title;
                best_match = resource.title.clone();
                exact_title_match = true;
                break;
            }

            if resource.keywords.iter().any(|k| k == keyword) {
                score += t.exact_keyword;
                best_match = keyword.clone();
            }

            for field in &fields {
                if field.contains(keyword.as_str()) || keyword.contains(field) {
                    score += t.containment;
                    if best_match.is_empty() {
                        best_match = field.to_string();
                    }
                }
            }
        }

        if score < t.qualify {
            return None;
        }

        Some(ScoredResource {
            resource: resource.clone(),
            match_score: score,
            best_match,
            exact_title_match,
        })
    }

    /// Highest score first, exact title matches ahead on ties
    fn rank(&self, mut found: Vec<ScoredResource>) -> Vec<ScoredResource> {
        found.sort_by(|a, b| {
            b.match_score
                .cmp(&a.match_score)
                .then(b.exact_title_match.cmp(&a.exact_title_match))
        });
        found.truncate(self.thresholds.max_results);

        if found.len() > 1
            && found[0].match_score - found[1].match_score > self.thresholds.collapse_gap
        {
            found.truncate(1);
        }

        debug!("Matched {} resources", found.len());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resource(id: &str, title: &str, keywords: &[&str], tags: &[&str]) -> Resource {
        Resource {
            id: ResourceId::from(id),
            title: title.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_keywords() {
        let keywords = extract_keywords("我要看烤鸭的图片");
        assert_eq!(keywords, vec!["我要看烤鸭的图片", "烤鸭"]);

        let keywords = extract_keywords("  京剧，脸谱！京剧 ");
        assert_eq!(keywords, vec!["京剧，脸谱！京剧", "京剧", "脸谱"]);

        assert!(extract_keywords("   ").is_empty());
        assert_eq!(extract_keywords("看"), vec!["看"]);
    }

    #[test]
    fn test_roast_duck_is_sole_top_match() {
        let temp = TempDir::new().unwrap();
        let mut store = LibraryStore::new(temp.path());
        store
            .add("traditionalFoods", resource("duck", "北京烤鸭", &["烤鸭"], &["美食"]))
            .unwrap();
        store
            .add("traditionalFoods", resource("tofu", "麻婆豆腐", &["豆腐"], &["美食"]))
            .unwrap();
        store
            .add("traditionalCrafts", resource("paper", "剪纸", &["窗花"], &[]))
            .unwrap();

        let matches = ResourceMatcher::default().find_matches(&store, "我要看烤鸭的图片");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id().as_str(), "duck");
        assert_eq!(matches[0].category(), "traditionalFoods");
        assert!(matches[0].match_score >= 15);
        assert!(!matches[0].exact_title_match);
    }

    #[test]
    fn test_exact_title_scores_and_stops() {
        let matcher = ResourceMatcher::default();
        let r = resource("opera", "京剧", &["京剧"], &[]);

        let scored = matcher.score(&r, &["京剧".to_string()]).unwrap();
        assert_eq!(scored.match_score, 20);
        assert_eq!(scored.best_match, "京剧");
        assert!(scored.exact_title_match);
    }

    #[test]
    fn test_below_threshold_is_dropped() {
        let matcher = ResourceMatcher::default();
        let r = resource("kite", "风筝", &[], &[]);
        assert!(matcher.score(&r, &["放风筝去".to_string()]).is_none());
    }

    #[test]
    fn test_ranking_keeps_top_three_and_prefers_exact_titles() {
        let temp = TempDir::new().unwrap();
        let mut store = LibraryStore::new(temp.path());
        store.add("crafts", resource("a", "窗花", &["剪纸"], &[])).unwrap();
        store.add("crafts", resource("b", "剪纸", &[], &[])).unwrap();
        store.add("crafts", resource("c", "剪纸技法", &[], &["剪纸"])).unwrap();
        store.add("crafts", resource("d", "剪纸历史", &[], &["剪纸"])).unwrap();

        let matches = ResourceMatcher::default().find_matches(&store, "剪纸");
        let ranked: Vec<(&str, u32)> = matches
            .iter()
            .map(|m| (m.id().as_str(), m.match_score))
            .collect();
        assert_eq!(ranked, vec![("b", 20), ("a", 20), ("c", 10)]);
        assert!(matches[0].exact_title_match);
        assert_eq!(matches[1].best_match, "剪纸");
    }

    #[test]
    fn test_clear_winner_is_returned_alone() {
        let temp = TempDir::new().unwrap();
        let mut store = LibraryStore::new(temp.path());
        store.add("crafts", resource("b", "剪纸", &[], &[])).unwrap();
        store.add("crafts", resource("c", "剪纸技法", &[], &["剪纸"])).unwrap();

        let matches = ResourceMatcher::default().find_matches(&store, "剪纸");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id().as_str(), "b");
    }

    #[test]
    fn test_list_shaped_category_uses_positional_ids() {
        let temp = TempDir::new().unwrap();
        let mut store = LibraryStore::new(temp.path());
        store
            .set_category("opera", vec![resource("", "京剧", &[], &[])])
            .unwrap();

        let matches = ResourceMatcher::default().find_matches(&store, "京剧");
        assert_eq!(matches[0].id().as_str(), "item_0");

        let body = serde_json::to_value(&matches[0]).unwrap();
        assert_eq!(body["matchScore"], 20);
        assert_eq!(body["category"], "opera");
    }
}
