//! YouTube Data API v3 client.
//!
//! Covers the two calls the worker needs: channel lookup (by id, handle, or
//! username) returning the profile plus the uploads playlist id, and
//! playlist-items listing returning recent video summaries.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::HttpClient;

const CHANNELS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/channels";
const PLAYLIST_ITEMS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/playlistItems";

const CHANNEL_PARTS: &str = "snippet,statistics,contentDetails,brandingSettings";

/// YouTube API error response structure
#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeApiError {
    pub error: YouTubeApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeApiErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub errors: Vec<YouTubeApiErrorItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeApiErrorItem {
    pub message: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// How to resolve a channel on the platform. Handles carry a leading `@`,
/// raw channel ids do not; legacy usernames are a third lookup the API
/// still supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelLookup {
    Id(String),
    Handle(String),
    Username(String),
}

impl ChannelLookup {
    /// Pick the lookup variant for a stored `channel_handle` field.
    pub fn from_stored_handle(handle: &str) -> Self {
        if handle.trim_start_matches('/').starts_with('@') {
            ChannelLookup::Handle(handle.to_string())
        } else {
            ChannelLookup::Id(handle.to_string())
        }
    }

    /// The API query parameter for this lookup, with prefixes cleaned off.
    pub fn query_param(&self) -> (&'static str, String) {
        match self {
            ChannelLookup::Id(id) => ("id", id.replace('/', "")),
            ChannelLookup::Handle(handle) => {
                ("forHandle", handle.replace("/@", "").replace('@', ""))
            }
            ChannelLookup::Username(name) => ("forUsername", name.clone()),
        }
    }
}

/// Channel profile as collected from the channels.list response.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelProfile {
    pub channel_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub country: Option<String>,
    pub thumbnails: serde_json::Value,
    pub view_count: Option<String>,
    pub subscriber_count: Option<String>,
    pub video_count: Option<String>,
    pub uploads_playlist_id: String,
}

/// One video from the uploads playlist. Embedded into the channel record,
/// never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub thumbnail: String,
    pub channel_title: String,
}

// Raw response shapes, mapped into the public types below.

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: ChannelStatistics,
    #[serde(rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    country: Option<String>,
    #[serde(default)]
    thumbnails: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelStatistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "subscriberCount")]
    subscriber_count: Option<String>,
    #[serde(rename = "videoCount")]
    video_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    #[serde(rename = "relatedPlaylists")]
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemsResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemSnippet {
    #[serde(rename = "resourceId")]
    resource_id: ResourceId,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: String,
    #[serde(default)]
    thumbnails: serde_json::Value,
    #[serde(rename = "channelTitle", default)]
    channel_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceId {
    #[serde(rename = "videoId")]
    video_id: String,
}

impl PlaylistItemSnippet {
    fn medium_thumbnail_url(&self) -> String {
        self.thumbnails
            .get("medium")
            .and_then(|t| t.get("url"))
            .and_then(|u| u.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Clone)]
pub struct YouTubeClient {
    http_client: HttpClient,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(http_client: HttpClient, api_key: String) -> Self {
        Self {
            http_client,
            api_key,
        }
    }

    /// Look up a channel profile. Returns `None` when the API answers with an
    /// empty item list (unknown handle or id), which callers treat as a skip.
    pub async fn get_channel_profile(
        &self,
        lookup: &ChannelLookup,
    ) -> anyhow::Result<Option<ChannelProfile>> {
        let (param, value) = lookup.query_param();

        let resp = self
            .http_client
            .get(CHANNELS_ENDPOINT)
            .query(&[
                ("part", CHANNEL_PARTS),
                (param, value.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to request channels.list")?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let list: ChannelListResponse = resp
            .json()
            .await
            .context("Failed to parse channels.list response")?;

        let Some(item) = list.items.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(ChannelProfile {
            channel_id: item.id,
            title: item.snippet.title,
            description: item.snippet.description,
            published_at: item.snippet.published_at,
            country: item.snippet.country,
            thumbnails: item.snippet.thumbnails,
            view_count: item.statistics.view_count,
            subscriber_count: item.statistics.subscriber_count,
            video_count: item.statistics.video_count,
            uploads_playlist_id: item.content_details.related_playlists.uploads,
        }))
    }

    /// Fetch up to `max_results` recent uploads from a playlist.
    pub async fn get_playlist_videos(
        &self,
        playlist_id: &str,
        max_results: u32,
    ) -> anyhow::Result<Vec<VideoSummary>> {
        let resp = self
            .http_client
            .get(PLAYLIST_ITEMS_ENDPOINT)
            .query(&[
                ("part", "snippet"),
                ("playlistId", playlist_id),
                ("maxResults", max_results.to_string().as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to request playlistItems.list")?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let list: PlaylistItemsResponse = resp
            .json()
            .await
            .context("Failed to parse playlistItems.list response")?;

        let videos = list
            .items
            .into_iter()
            .map(|item| {
                let thumbnail = item.snippet.medium_thumbnail_url();
                VideoSummary {
                    video_id: item.snippet.resource_id.video_id,
                    title: item.snippet.title,
                    description: item.snippet.description.unwrap_or_default(),
                    published_at: item.snippet.published_at,
                    thumbnail,
                    channel_title: item.snippet.channel_title.unwrap_or_default(),
                }
            })
            .collect();

        Ok(videos)
    }
}

async fn api_error(resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if let Ok(err) = serde_json::from_str::<YouTubeApiError>(&body) {
        return anyhow!(
            "YouTube API error (HTTP {}): {}",
            err.error.code,
            err.error.message
        );
    }

    anyhow!("YouTube API error (HTTP {}): {}", status.as_u16(), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_lookup_detection() {
        assert_eq!(
            ChannelLookup::from_stored_handle("@foo"),
            ChannelLookup::Handle("@foo".to_string())
        );
        assert_eq!(
            ChannelLookup::from_stored_handle("/@foo"),
            ChannelLookup::Handle("/@foo".to_string())
        );
        assert_eq!(
            ChannelLookup::from_stored_handle("UC12345"),
            ChannelLookup::Id("UC12345".to_string())
        );
    }

    #[test]
    fn lookup_query_params_are_cleaned() {
        let (param, value) = ChannelLookup::Handle("/@somechannel".to_string()).query_param();
        assert_eq!(param, "forHandle");
        assert_eq!(value, "somechannel");

        let (param, value) = ChannelLookup::Id("/UC12345".to_string()).query_param();
        assert_eq!(param, "id");
        assert_eq!(value, "UC12345");

        let (param, value) = ChannelLookup::Username("olduser".to_string()).query_param();
        assert_eq!(param, "forUsername");
        assert_eq!(value, "olduser");
    }

    #[test]
    fn playlist_item_missing_medium_thumbnail() {
        let snippet: PlaylistItemSnippet = serde_json::from_value(serde_json::json!({
            "resourceId": {"videoId": "abc"},
            "title": "A video",
            "publishedAt": "2025-01-01T00:00:00Z",
            "thumbnails": {"default": {"url": "http://example.com/d.jpg"}}
        }))
        .unwrap();

        assert_eq!(snippet.medium_thumbnail_url(), "");
    }

    #[test]
    fn channel_list_response_empty_items() {
        let list: ChannelListResponse = serde_json::from_str(r#"{"kind": "youtube#channelListResponse"}"#).unwrap();
        assert!(list.items.is_empty());
    }
}
