pub mod batch;

use std::sync::LazyLock;

use indoc::formatdoc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::worker_config::{cfg, Category};
use crate::youtube::VideoSummary;

pub const MIN_CATEGORIES: usize = 1;
pub const MAX_CATEGORIES: usize = 3;
pub const CATEGORY_CODE_MAX: i64 = 9;

/// JSON schema constraining the model's structured output: exactly
/// `channel_name` and `categories`, the latter 1-3 unique integers in [0,9].
pub static CATEGORY_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    json!({
        "type": "object",
        "properties": {
            "channel_name": {
                "type": "string"
            },
            "categories": {
                "type": "array",
                "items": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": CATEGORY_CODE_MAX
                },
                "minItems": MIN_CATEGORIES,
                "maxItems": MAX_CATEGORIES,
                "uniqueItems": true
            }
        },
        "required": ["channel_name", "categories"],
        "additionalProperties": false
    })
});

pub fn system_prompt(categories: &[Category]) -> String {
    let category_lines = categories
        .iter()
        .map(|c| format!("{}: {}", c.code, c.content))
        .collect::<Vec<_>>()
        .join("\n");

    formatdoc! {"
        You are a YouTube channel categorizer. Analyze the channel name and video content to \
        determine which categories the channel belongs to.

        Categories (use integers):
        {category_lines}

        Choose relevant categories based on the video content."
    }
}

pub fn classification_user_prompt(
    channel_name: &str,
    channel_desc: &str,
    uploaded_videos: &str,
) -> String {
    format!("Channel name: {channel_name}\nChannel description: {channel_desc} \nVideos:\n{uploaded_videos}")
}

/// Render the numbered video-title list fed to the model, truncated to
/// `char_budget` characters.
pub fn render_video_titles(videos: &[VideoSummary], char_budget: usize) -> String {
    let rendered = videos
        .iter()
        .enumerate()
        .map(|(i, video)| format!("{}. video title: {}", i + 1, video.title))
        .collect::<Vec<_>>()
        .join("\n");

    if rendered.chars().count() <= char_budget {
        return rendered;
    }
    rendered.chars().take(char_budget).collect()
}

/// Validated classification answer extracted from the model's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationAnswer {
    pub channel_name: String,
    pub categories: Vec<i64>,
}

impl ClassificationAnswer {
    /// Shape validation: non-empty name, 1-3 unique codes in [0,9].
    pub fn is_valid(&self) -> bool {
        if self.channel_name.is_empty() {
            return false;
        }
        if !(MIN_CATEGORIES..=MAX_CATEGORIES).contains(&self.categories.len()) {
            return false;
        }
        if self
            .categories
            .iter()
            .any(|c| !(0..=CATEGORY_CODE_MAX).contains(c))
        {
            return false;
        }
        let mut seen = self.categories.clone();
        seen.sort_unstable();
        seen.dedup();
        seen.len() == self.categories.len()
    }
}

/// Parse the model's JSON response content into a validated answer.
/// Returns None if parsing fails or the shape is invalid.
pub fn parse_classification_answer(content: &str) -> Option<ClassificationAnswer> {
    let answer: ClassificationAnswer = serde_json::from_str(content).ok()?;
    if !answer.is_valid() {
        return None;
    }
    Some(answer)
}

/// System prompt rendered from the configured category table.
pub fn configured_system_prompt() -> String {
    system_prompt(&cfg.categories)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(title: &str) -> VideoSummary {
        VideoSummary {
            video_id: "vid".to_string(),
            title: title.to_string(),
            description: String::new(),
            published_at: "2025-01-01T00:00:00Z".to_string(),
            thumbnail: String::new(),
            channel_title: String::new(),
        }
    }

    #[test]
    fn system_prompt_lists_categories() {
        let categories = vec![
            Category {
                code: 0,
                content: "IT & Computer Science".to_string(),
            },
            Category {
                code: 7,
                content: "Others".to_string(),
            },
        ];
        let prompt = system_prompt(&categories);
        assert!(prompt.contains("0: IT & Computer Science"));
        assert!(prompt.contains("7: Others"));
        assert!(prompt.contains("YouTube channel categorizer"));
    }

    #[test]
    fn video_titles_are_numbered_from_one() {
        let videos = vec![video("First"), video("Second")];
        let rendered = render_video_titles(&videos, 6000);
        assert_eq!(rendered, "1. video title: First\n2. video title: Second");
    }

    #[test]
    fn video_titles_truncate_at_budget() {
        let videos = vec![video(&"x".repeat(100)); 10];
        let rendered = render_video_titles(&videos, 50);
        assert_eq!(rendered.chars().count(), 50);
    }

    #[test]
    fn parses_valid_answer() {
        let answer =
            parse_classification_answer(r#"{"channel_name": "foo's channel", "categories": [0, 5]}"#)
                .unwrap();
        assert_eq!(answer.channel_name, "foo's channel");
        assert_eq!(answer.categories, vec![0, 5]);
    }

    #[test]
    fn rejects_duplicate_categories() {
        assert!(
            parse_classification_answer(r#"{"channel_name": "c", "categories": [2, 2, 5]}"#)
                .is_none()
        );
    }

    #[test]
    fn rejects_out_of_range_categories() {
        assert!(
            parse_classification_answer(r#"{"channel_name": "c", "categories": [10]}"#).is_none()
        );
        assert!(
            parse_classification_answer(r#"{"channel_name": "c", "categories": [-1]}"#).is_none()
        );
    }

    #[test]
    fn rejects_bad_list_lengths() {
        assert!(parse_classification_answer(r#"{"channel_name": "c", "categories": []}"#).is_none());
        assert!(
            parse_classification_answer(r#"{"channel_name": "c", "categories": [0, 1, 2, 3]}"#)
                .is_none()
        );
    }

    #[test]
    fn rejects_empty_channel_name() {
        assert!(parse_classification_answer(r#"{"channel_name": "", "categories": [1]}"#).is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_classification_answer("not json").is_none());
    }

    #[test]
    fn schema_bounds_match_validation() {
        let schema = &*CATEGORY_SCHEMA;
        let items = &schema["properties"]["categories"];
        assert_eq!(items["items"]["minimum"], 0);
        assert_eq!(items["items"]["maximum"], 9);
        assert_eq!(items["minItems"], 1);
        assert_eq!(items["maxItems"], 3);
        assert_eq!(items["uniqueItems"], true);
        assert_eq!(schema["additionalProperties"], false);
    }
}
