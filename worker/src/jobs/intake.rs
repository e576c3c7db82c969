//! Channel intake pass.
//!
//! Walks pending channels in chunks, resolves each channel on the platform,
//! fetches its recent uploads, and assembles one classification request per
//! channel. Each chunk becomes one batch submission; only channels that made
//! it into the submitted file advance to submitted status.

use derive_more::derive::Display;
use entity::channel;
use sea_orm::DatabaseConnection;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::model::batch::BatchCtrl;
use crate::model::channel::{ChannelCtrl, IncludedChannel};
use crate::prompt::groq::batch::{BatchRequest, GroqBatchClient};
use crate::prompt::groq::{
    classification_user_prompt, configured_system_prompt, render_video_titles,
};
use crate::worker_config::cfg;
use crate::youtube::{ChannelLookup, ChannelProfile, VideoSummary, YouTubeClient};

/// Why a pending channel was left out of a request file. Skipped channels
/// stay pending and get another shot on the next scheduled run.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No platform identity resolved for the stored handle or id
    NoChannelInfo,
    /// Uploads playlist exists but returned zero videos
    NoVideos,
    /// Platform API call failed
    FetchFailed,
}

/// Outcome of evaluating one pending channel.
pub enum ChannelOutcome {
    Included(Box<IntakeItem>),
    Skipped(SkipReason),
}

/// A channel's assembled request line plus the state to persist once the
/// chunk is submitted.
pub struct IntakeItem {
    pub request: BatchRequest,
    pub included: IncludedChannel,
}

/// One intake pass over all pending channels. A failed batch submission
/// aborts the remaining chunks of this run; everything already submitted
/// stays submitted.
pub async fn run_intake(
    conn: &DatabaseConnection,
    youtube: &YouTubeClient,
    groq: &GroqBatchClient,
) -> AppResult<()> {
    let pending = ChannelCtrl::all_pending(conn).await?;
    if pending.is_empty() {
        tracing::info!("No pending channels, intake pass done");
        return Ok(());
    }

    tracing::info!("Intake pass over {} pending channels", pending.len());
    let system_prompt = configured_system_prompt();

    for chunk in pending.chunks(cfg.intake.chunk_size) {
        let mut items: Vec<IntakeItem> = Vec::with_capacity(chunk.len());

        for record in chunk {
            match evaluate_channel(youtube, &system_prompt, record).await {
                ChannelOutcome::Included(item) => items.push(*item),
                ChannelOutcome::Skipped(reason) => {
                    tracing::info!("Skipping channel {}: {}", record.channel_name, reason);
                }
            }
        }

        if items.is_empty() {
            tracing::debug!("Chunk produced no requests, nothing to submit");
            continue;
        }

        let requests: Vec<BatchRequest> = items.iter().map(|i| i.request.clone()).collect();
        let submitted = match groq.submit_batch(&requests).await {
            Ok(submitted) => submitted,
            Err(e) => {
                tracing::error!("Batch submission failed, aborting remaining chunks: {}", e);
                return Err(AppError::BatchSubmission(e.to_string()));
            }
        };

        match BatchCtrl::insert(conn, &submitted.file_id, &submitted.batch_id).await {
            Ok(_) => {
                tracing::info!(
                    "Recorded batch {} (file {})",
                    submitted.batch_id,
                    submitted.file_id
                );
            }
            Err(e) => {
                tracing::error!("Error recording batch {}: {:?}", submitted.batch_id, e);
            }
        }

        let included: Vec<IncludedChannel> = items.into_iter().map(|i| i.included).collect();
        let updated = ChannelCtrl::mark_submitted(conn, &included).await?;
        tracing::info!("Advanced {} channels to submitted in this chunk", updated);
    }

    tracing::info!("Intake pass complete");
    Ok(())
}

/// Resolve one channel's identity and uploads, producing either an assembled
/// request or an explicit skip.
async fn evaluate_channel(
    youtube: &YouTubeClient,
    system_prompt: &str,
    record: &channel::Model,
) -> ChannelOutcome {
    let lookup = ChannelLookup::from_stored_handle(&record.channel_handle);

    let profile = match youtube.get_channel_profile(&lookup).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return ChannelOutcome::Skipped(SkipReason::NoChannelInfo),
        Err(e) => {
            tracing::warn!("Channel lookup failed for {}: {:?}", record.channel_name, e);
            return ChannelOutcome::Skipped(SkipReason::FetchFailed);
        }
    };

    let videos = match youtube
        .get_playlist_videos(&profile.uploads_playlist_id, cfg.intake.max_videos)
        .await
    {
        Ok(videos) => videos,
        Err(e) => {
            tracing::warn!(
                "Playlist fetch failed for {}: {:?}",
                profile.uploads_playlist_id,
                e
            );
            return ChannelOutcome::Skipped(SkipReason::FetchFailed);
        }
    };

    if videos.is_empty() {
        return ChannelOutcome::Skipped(SkipReason::NoVideos);
    }

    ChannelOutcome::Included(Box::new(build_item(record, system_prompt, &profile, videos)))
}

/// Build the request line and persistence payload for one included channel.
fn build_item(
    record: &channel::Model,
    system_prompt: &str,
    profile: &ChannelProfile,
    videos: Vec<VideoSummary>,
) -> IntakeItem {
    let titles = render_video_titles(&videos, cfg.intake.prompt_char_budget);
    let user_content = classification_user_prompt(
        &record.channel_name,
        profile.description.as_deref().unwrap_or(""),
        &titles,
    );

    let request = BatchRequest::for_classification(system_prompt.to_string(), user_content);

    IntakeItem {
        request,
        included: IncludedChannel {
            channel_name: record.channel_name.clone(),
            channel_handle: record.channel_handle.clone(),
            channel_id: profile.channel_id.clone(),
            videos: videos.iter().map(|v| json!(v)).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::channel::ChannelStatus;
    use chrono::Utc;

    fn pending_channel(name: &str, handle: &str) -> channel::Model {
        channel::Model {
            id: 1,
            channel_name: name.to_string(),
            channel_handle: handle.to_string(),
            channel_id: None,
            status: ChannelStatus::Pending as i32,
            videos: json!([]),
            channel_categories: json!([]),
            timestamp: Utc::now().fixed_offset(),
        }
    }

    fn profile() -> ChannelProfile {
        ChannelProfile {
            channel_id: "UCfoo".to_string(),
            title: Some("foo's channel".to_string()),
            description: Some("All about foo".to_string()),
            published_at: None,
            country: None,
            thumbnails: json!({}),
            view_count: None,
            subscriber_count: None,
            video_count: None,
            uploads_playlist_id: "UUfoo".to_string(),
        }
    }

    fn video(title: &str) -> VideoSummary {
        VideoSummary {
            video_id: "vid".to_string(),
            title: title.to_string(),
            description: String::new(),
            published_at: "2025-01-01T00:00:00Z".to_string(),
            thumbnail: String::new(),
            channel_title: "foo's channel".to_string(),
        }
    }

    #[test]
    fn included_channel_carries_request_and_videos() {
        let record = pending_channel("foo's channel", "@foo");
        let videos = vec![video("one"), video("two"), video("three")];

        let item = build_item(&record, "system prompt", &profile(), videos);

        let user_content = &item.request.body.messages[1].content;
        assert!(user_content.contains("Channel name: foo's channel"));
        assert!(user_content.contains("Channel description: All about foo"));
        assert!(user_content.contains("1. video title: one"));
        assert!(user_content.contains("3. video title: three"));

        assert_eq!(item.included.videos.len(), 3);
        assert_eq!(item.included.channel_id, "UCfoo");
        assert_eq!(item.included.channel_handle, "@foo");
    }

    #[test]
    fn handle_with_at_uses_handle_lookup() {
        let record = pending_channel("foo's channel", "@foo");
        assert_eq!(
            ChannelLookup::from_stored_handle(&record.channel_handle),
            ChannelLookup::Handle("@foo".to_string())
        );
    }

    #[test]
    fn skip_reasons_render_for_logs() {
        assert_eq!(SkipReason::NoChannelInfo.to_string(), "NoChannelInfo");
        assert_eq!(SkipReason::NoVideos.to_string(), "NoVideos");
    }
}
