use heritage_library_schemas::Resource;

/// Which side of a resource the message asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aspect {
    Technique,
    History,
    Features,
    Culture,
    Heritage,
    Value,
    Development,
    Overview,
}

impl Aspect {
    /// First matching cue wins, in this order
    pub fn detect(message: &str) -> Self {
        const CUES: &[(&[&str], Aspect)] = &[
            (&["做法", "制作", "工艺"], Aspect::Technique),
            (&["历史", "起源"], Aspect::History),
            (&["特点", "特色"], Aspect::Features),
            (&["文化", "内涵"], Aspect::Culture),
            (&["传承", "保护"], Aspect::Heritage),
            (&["价值", "意义"], Aspect::Value),
            (&["发展", "创新"], Aspect::Development),
        ];

        CUES.iter()
            .find(|(cues, _)| contains_any(message, cues))
            .map(|(_, aspect)| *aspect)
            .unwrap_or(Aspect::Overview)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Aspect::Technique => "做法",
            Aspect::History => "历史",
            Aspect::Features => "特点",
            Aspect::Culture => "文化",
            Aspect::Heritage => "传承",
            Aspect::Value => "价值",
            Aspect::Development => "发展",
            Aspect::Overview => "详细信息",
        }
    }

    /// Body text for this aspect from the resource's content fields
    pub fn body(&self, resource: &Resource, name: &str) -> String {
        let field = |names: &[&str], fallback: &str| -> String {
            names
                .iter()
                .find_map(|n| resource.text_field(n))
                .unwrap_or(fallback)
                .to_string()
        };

        match self {
            Aspect::History => field(&["history", "content"], "历史悠久，传承至今。"),
            Aspect::Technique => {
                field(&["technique", "content"], "制作工艺精湛，需要丰富的经验。")
            }
            Aspect::Features => {
                field(&["features", "content"], "具有独特的文化特色和艺术价值。")
            }
            Aspect::Culture => field(&["content", "history"], "承载着深厚的文化内涵。"),
            Aspect::Heritage => {
                field(&["content", "history"], "需要一代代人的努力来保护和传承。")
            }
            Aspect::Value => format!(
                "{}具有很高的艺术价值和文化价值，{}",
                name,
                field(&["content", "history"], "是中华文化的重要组成部分。")
            ),
            Aspect::Development => format!(
                "{}的发展历程很有意思，{}",
                name,
                field(&["history", "content"], "见证了中华文化的发展。")
            ),
            Aspect::Overview => field(
                &["content", "history", "technique", "features"],
                "是中华传统文化的重要组成部分。",
            ),
        }
    }
}

/// Tone of the message, used to pick the reply opener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Curious,
    Excited,
    Surprised,
    Confused,
    Neutral,
}

impl Mood {
    pub fn detect(message: &str) -> Self {
        if contains_any(message, &["好奇", "想知道", "想了解", "想探索"]) {
            Mood::Curious
        } else if contains_any(message, &["兴奋", "激动", "热情", "期待"]) {
            Mood::Excited
        } else if contains_any(message, &["惊讶", "惊奇", "没想到", "意外"]) {
            Mood::Surprised
        } else if contains_any(message, &["困惑", "疑惑", "不明白", "不懂"]) {
            Mood::Confused
        } else {
            Mood::Neutral
        }
    }
}

/// Kind of media the message asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRequest {
    Video,
    Image,
    /// Asked for media without naming a kind
    Any,
    None,
}

impl MediaRequest {
    pub fn detect(message: &str) -> Self {
        if contains_any(message, &["视频", "影片", "录像", "动态"]) {
            MediaRequest::Video
        } else if contains_any(message, &["照片", "图片", "图", "静态"]) {
            MediaRequest::Image
        } else if message.contains("生成") {
            MediaRequest::Any
        } else {
            MediaRequest::None
        }
    }
}

fn contains_any(message: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| message.contains(cue))
}

/// Stable pick from a list of phrasings, driven by the message text
fn pick<'a>(options: &'a [String], seed: u64) -> &'a str {
    &options[(seed % options.len() as u64) as usize]
}

pub fn seed_for(message: &str) -> u64 {
    message
        .chars()
        .fold(0u64, |acc, c| acc.wrapping_mul(31).wrapping_add(c as u64))
}

/// Fixed phrasings for chat replies
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn opener(&self, mood: Mood, name: &str, aspect: Aspect, seed: u64) -> String {
        let label = aspect.label();
        let options: Vec<String> = match mood {
            Mood::Curious => vec![
                "哈哈，您的好奇心让我很开心！让我来为您详细介绍一下...".to_string(),
                "您的好奇心让我很感动！让我来为您揭秘这个有趣的内容...".to_string(),
                "您的好奇心让我很欣赏！让我来为您详细介绍这个精彩内容...".to_string(),
            ],
            Mood::Excited => vec![
                "您的热情感染了我！让我来为您分享这个精彩内容...".to_string(),
                "您的兴奋让我很开心！让我来为您介绍这个有趣的内容...".to_string(),
                "您的热情让我很感动！让我来为您详细讲解这个精彩内容...".to_string(),
            ],
            Mood::Surprised => vec![
                "哈哈，您的反应让我很满意！这确实很有趣，让我来为您详细介绍...".to_string(),
                "您的惊讶让我很开心！这确实很有意思，让我来为您分享更多内容...".to_string(),
                "您的反应让我很欣慰！这确实很有趣，让我来为您详细讲解...".to_string(),
            ],
            Mood::Confused => vec![
                "我理解您的困惑，让我来为您详细解释一下，保证让您明白...".to_string(),
                "您的困惑我理解，让我来为您详细说明，保证让您清楚...".to_string(),
                "我明白您的疑惑，让我来为您详细讲解，保证让您理解...".to_string(),
            ],
            Mood::Neutral => vec![
                format!("很高兴为您介绍「{}」的{}！", name, label),
                format!("让我来为您详细介绍一下「{}」的{}。", name, label),
                format!("关于「{}」的{}，这里有很多精彩的内容。", name, label),
                format!("「{}」的{}很有意思，让我来为您分享。", name, label),
                format!("我很乐意为您介绍「{}」的{}！", name, label),
            ],
        };
        pick(&options, seed).to_string()
    }

    pub fn closer(&self, name: &str, seed: u64) -> String {
        let options = vec![
            format!("您对{}还有什么想了解的吗？我很乐意为您详细介绍！", name),
            format!("如果您想了解更多关于{}的内容，随时告诉我！", name),
            "希望这个介绍让您满意！还有什么其他传统文化想了解的吗？".to_string(),
            format!("这就是{}的精彩内容！您还想了解其他传统文化吗？", name),
            format!("感谢您的关注！如果您对{}还有其他问题，我很乐意为您解答！", name),
        ];
        pick(&options, seed).to_string()
    }

    pub fn no_match(&self, seed: u64) -> String {
        let options = vec![
            "😊 抱歉，我暂时无法为您找到相关的内容。".to_string(),
            "🤔 抱歉，我暂时没有找到您询问的内容。".to_string(),
            "🙏 抱歉，我暂时没有找到您想了解的内容。".to_string(),
        ];
        format!(
            "{}不过我的知识库正在不断丰富中，您可以尝试询问其他传统文化内容！\n\n💡 建议您可以尝试询问：北京烤鸭、麻婆豆腐、景泰蓝、京剧等传统文化项目。",
            pick(&options, seed)
        )
    }

    pub fn fun_fact(&self, fact: &str) -> String {
        format!("💡 有趣小知识：{}", fact)
    }

    pub fn keywords(&self, keywords: &[String]) -> String {
        format!("🏷️ 相关标签：{}", keywords.join("、"))
    }

    pub fn media_heading(&self, request: MediaRequest, found: bool) -> Option<&'static str> {
        match (request, found) {
            (MediaRequest::Video, true) => Some("🎬 特地为您准备了相关视频，点击下方链接观看："),
            (MediaRequest::Video, false) => {
                Some("😊 抱歉，当前没有找到相关的视频文件，但您可以查看其他媒体内容。")
            }
            (MediaRequest::Image, true) => Some("🖼️ 特地为您准备了相关图片，点击下方链接欣赏："),
            (MediaRequest::Image, false) => {
                Some("😊 抱歉，当前没有找到相关的图片文件，但您可以查看其他媒体内容。")
            }
            (MediaRequest::Any, true) => Some("📸 顺便为您准备了相关媒体，点击下方链接欣赏："),
            (MediaRequest::Any, false) | (MediaRequest::None, _) => None,
        }
    }

    /// `pointer` marks links listed under a kind-specific heading
    pub fn media_link(&self, url: &str, name: &str, is_video: bool, pointer: bool) -> String {
        let (icon, fallback) = if is_video {
            ("🎬", "观看视频")
        } else {
            ("🖼️", "查看图片")
        };
        let icon = if pointer { "👉" } else { icon };
        let text = if name.is_empty() { fallback } else { name };
        format!("{} <a href=\"{}\" target=\"_blank\">{}</a>", icon, url, text)
    }
}
