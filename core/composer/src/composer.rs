use chrono::{DateTime, SecondsFormat, Utc};
use heritage_library_schemas::{MediaKind, MediaRef};
use heritage_library_search::ScoredResource;
use serde::Serialize;
use tracing::{debug, info};

use crate::templates::{seed_for, Aspect, MediaRequest, Mood, TemplateRenderer};

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".wmv", ".flv", ".mkv", ".webm"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg"];

/// Reply to one chat message
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub media: Vec<MediaRef>,
    pub resources: Vec<ScoredResource>,
    pub timestamp: String,
}

/// Builds chat replies from matched resources
#[derive(Debug, Clone, Default)]
pub struct Composer {
    renderer: TemplateRenderer,
}

impl Composer {
    pub fn new() -> Self {
        Self {
            renderer: TemplateRenderer::new(),
        }
    }

    /// Compose a reply; the first match drives the text, media comes from all
    pub fn compose(
        &self,
        message: &str,
        matches: &[ScoredResource],
        now: DateTime<Utc>,
    ) -> ChatReply {
        let seed = seed_for(message);
        let request = MediaRequest::detect(message);
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        let Some(top) = matches.first() else {
            info!("No resources matched chat message");
            return ChatReply {
                response: self.renderer.no_match(seed),
                media: Vec::new(),
                resources: Vec::new(),
                timestamp,
            };
        };

        let resource = &top.resource;
        let name = if resource.title.is_empty() {
            resource.text_field("name").unwrap_or("这个传统文化项目")
        } else {
            resource.title.as_str()
        };
        let aspect = Aspect::detect(message);
        let mood = Mood::detect(message);
        debug!("Composing reply about {} ({:?}, {:?})", name, aspect, mood);

        let mut sections = vec![
            self.renderer.opener(mood, name, aspect, seed),
            aspect.body(resource, name),
        ];

        if let Some(fact) = resource.text_field("funFact") {
            sections.push(self.renderer.fun_fact(fact));
        }
        if !resource.keywords.is_empty() {
            sections.push(self.renderer.keywords(&resource.keywords));
        }

        let media = select_media(request, matches);
        if let Some(heading) = self.renderer.media_heading(request, !media.is_empty()) {
            let mut block = vec![heading.to_string()];
            for item in &media {
                let pointer = request != MediaRequest::Any;
                block.push(
                    self.renderer
                        .media_link(&item.url, &item.name, is_video(item), pointer),
                );
            }
            sections.push(block.join("\n"));
        }

        sections.push(self.renderer.closer(name, seed));

        info!(
            "Chat reply about {} with {} media from {} matches",
            name,
            media.len(),
            matches.len()
        );

        ChatReply {
            response: sections.join("\n\n"),
            media,
            resources: matches.to_vec(),
            timestamp,
        }
    }
}

fn is_video(media: &MediaRef) -> bool {
    media.kind == MediaKind::Video || VIDEO_EXTENSIONS.iter().any(|e| media.url.contains(e))
}

fn is_image(media: &MediaRef) -> bool {
    media.kind == MediaKind::Image || IMAGE_EXTENSIONS.iter().any(|e| media.url.contains(e))
}

/// Media of every match, filtered to what the message asked for
pub fn select_media(request: MediaRequest, matches: &[ScoredResource]) -> Vec<MediaRef> {
    let all = matches.iter().flat_map(|m| m.resource.media.iter());
    match request {
        MediaRequest::Video => all.filter(|m| is_video(m)).cloned().collect(),
        MediaRequest::Image => all.filter(|m| is_image(m)).cloned().collect(),
        MediaRequest::Any => all.cloned().collect(),
        MediaRequest::None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use heritage_library_schemas::{Resource, ResourceId};
    use serde_json::json;

    fn media(name: &str, kind: MediaKind) -> MediaRef {
        MediaRef {
            name: name.to_string(),
            kind,
            size: 1,
            url: format!("http://localhost:3001/resources/x/{}", name),
        }
    }

    fn duck() -> ScoredResource {
        let mut resource = Resource {
            id: ResourceId::from("duck"),
            title: "北京烤鸭".to_string(),
            category: "traditionalFoods".to_string(),
            keywords: vec!["烤鸭".to_string(), "北京".to_string()],
            media: vec![
                media("duck.jpg", MediaKind::Image),
                media("duck.mp4", MediaKind::Video),
            ],
            ..Default::default()
        };
        resource.extra.insert("history".to_string(), json!("始于明代"));
        resource.extra.insert("funFact".to_string(), json!("片皮讲究"));
        ScoredResource {
            resource,
            match_score: 30,
            best_match: "烤鸭".to_string(),
            exact_title_match: false,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_image_request_returns_only_images() {
        let reply = Composer::new().compose("我要看烤鸭的图片", &[duck()], now());

        assert_eq!(reply.media.len(), 1);
        assert_eq!(reply.media[0].name, "duck.jpg");
        assert!(reply.response.contains("🖼️ 特地为您准备了相关图片"));
        assert!(reply.response.contains("💡 有趣小知识：片皮讲究"));
        assert!(reply.response.contains("🏷️ 相关标签：烤鸭、北京"));
        assert_eq!(reply.resources.len(), 1);
        assert_eq!(reply.timestamp, "2024-05-01T00:00:00.000Z");
    }

    #[test]
    fn test_history_request_without_media() {
        let reply = Composer::new().compose("烤鸭的历史", &[duck()], now());
        assert!(reply.media.is_empty());
        assert!(reply.response.contains("始于明代"));
        assert!(!reply.response.contains("<a href"));
    }

    #[test]
    fn test_video_request_with_no_videos() {
        let mut only_image = duck();
        only_image.resource.media.truncate(1);

        let reply = Composer::new().compose("烤鸭视频", &[only_image], now());
        assert!(reply.media.is_empty());
        assert!(reply.response.contains("没有找到相关的视频文件"));
    }

    #[test]
    fn test_no_matches() {
        let reply = Composer::new().compose("火星文化", &[], now());
        assert!(reply.resources.is_empty());
        assert!(reply.response.contains("建议您可以尝试询问"));
    }

    #[test]
    fn test_media_filter_uses_url_extension() {
        let mut untyped = duck();
        untyped.resource.media = vec![MediaRef {
            name: "clip".to_string(),
            kind: MediaKind::Document,
            size: 0,
            url: "/resources/videos/clip.mov".to_string(),
        }];

        assert_eq!(select_media(MediaRequest::Video, &[untyped.clone()]).len(), 1);
        assert!(select_media(MediaRequest::Image, &[untyped]).is_empty());
    }
}
