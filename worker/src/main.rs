#![allow(dead_code)]

mod error;
mod host;
mod jobs;
mod model;
mod prompt;
mod testing;
mod worker_config;
mod youtube;

use std::env;

use sea_orm::{ConnectOptions, Database};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prompt::groq::batch::GroqBatchClient;
use youtube::YouTubeClient;

pub type HttpClient = reqwest::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;

    let youtube = YouTubeClient::new(
        http_client.clone(),
        env::var("YOUTUBE_API_KEY").expect("YOUTUBE_API_KEY is not set in .env file"),
    );
    let groq = GroqBatchClient::new(
        http_client.clone(),
        env::var("GROQ_API_KEY").expect("GROQ_API_KEY is not set in .env file"),
    );

    tracing::info!("{}", *worker_config::cfg);

    // The two passes work disjoint status partitions: intake advances
    // channels 0->1, the poller (via reconciliation) 1->2.
    let intake_handle = {
        let conn = conn.clone();
        let youtube = youtube.clone();
        let groq = groq.clone();
        tokio::spawn(async move {
            if let Err(e) = jobs::intake::run_intake(&conn, &youtube, &groq).await {
                tracing::error!("Intake pass failed: {:?}", e);
            }
        })
    };

    let poller_handle = {
        let conn = conn.clone();
        let groq = groq.clone();
        tokio::spawn(async move {
            if let Err(e) = jobs::poller::run_poller(&conn, &groq).await {
                tracing::error!("Poller pass failed: {:?}", e);
            }
        })
    };

    let (intake_res, poller_res) = tokio::join!(intake_handle, poller_handle);
    if let Err(e) = intake_res {
        tracing::error!("Intake task panicked: {:?}", e);
    }
    if let Err(e) = poller_res {
        tracing::error!("Poller task panicked: {:?}", e);
    }

    if host::ec2::is_ec2_instance(&http_client).await {
        tracing::info!("Run complete on EC2, stopping instance");
        host::ec2::stop_current_instance(&http_client).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #[cfg(feature = "integration")]
    use super::*;

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn test_pending_channel_queries() {
        use crate::model::batch::BatchCtrl;
        use crate::model::channel::{ChannelCtrl, ChannelStatus};

        let (conn, _http_client) = crate::testing::common::setup().await;

        let pending = ChannelCtrl::all_pending(&conn)
            .await
            .expect("Failed to query pending channels");
        for channel in &pending {
            assert_eq!(channel.status, ChannelStatus::Pending as i32);
        }

        let batches = BatchCtrl::all_pending(&conn)
            .await
            .expect("Failed to query pending batches");
        for batch in &batches {
            assert_eq!(batch.status, 0);
        }
    }
}
