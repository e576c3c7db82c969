//! Host lifecycle.
//!
//! The worker runs on an EC2 instance woken up by an external scheduler.
//! Once both passes finish it stops its own instance. The instance-metadata
//! probe failing in any way means "not on EC2" and nothing is shut down.

use std::time::Duration;

use anyhow::Context;

use crate::HttpClient;

const METADATA_BASE: &str = "http://169.254.169.254/latest/meta-data";
const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Probe the link-local metadata service to detect whether we run on EC2.
pub async fn is_ec2_instance(http_client: &HttpClient) -> bool {
    match http_client
        .get(format!("{}/", METADATA_BASE))
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

async fn current_instance_id(http_client: &HttpClient) -> anyhow::Result<String> {
    let resp = http_client
        .get(format!("{}/instance-id", METADATA_BASE))
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .context("Failed to query instance-id from metadata service")?;

    resp.text().await.context("Failed to read instance-id")
}

/// Stop the instance this process runs on. Failures are logged only; the
/// worker has already finished its real work by the time this runs.
pub async fn stop_current_instance(http_client: &HttpClient) {
    let instance_id = match current_instance_id(http_client).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Could not determine instance id, leaving host running: {:?}", e);
            return;
        }
    };

    let aws_cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let ec2 = aws_sdk_ec2::Client::new(&aws_cfg);

    match ec2
        .stop_instances()
        .instance_ids(instance_id.clone())
        .send()
        .await
    {
        Ok(_) => {
            tracing::info!("Stopped instance {} after run completion", instance_id);
        }
        Err(e) => {
            tracing::error!("Failed to stop instance {}: {:?}", instance_id, e);
        }
    }
}
