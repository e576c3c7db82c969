pub mod client;

pub use client::{ChannelLookup, ChannelProfile, VideoSummary, YouTubeClient};
