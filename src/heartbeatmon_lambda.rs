use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use log::{error, info};
use serde::{Deserialize, Serialize};
use stack_string::StackString;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

use fitbit_lib::{fitbit_heartrate::LatestHeartRate, heartrate_refresh::refresh_heartrate};
use heartbeat_lib::{
    heartbeat_config::HeartbeatConfig, heartbeat_util::cancel_after,
    persistent_store::HeartrateStores,
};

#[derive(Deserialize, Debug)]
struct HeartbeatEvent {
    region: StackString,
    #[serde(rename = "bucketName")]
    bucket_name: StackString,
}

#[derive(Serialize, Debug)]
struct HeartbeatOutput {
    token_rotated: bool,
    records_fetched: usize,
    latest: Option<LatestHeartRate>,
}

/// Time left before the invocation deadline, given in ms since the epoch.
fn remaining_time(deadline_ms: u64) -> Duration {
    let deadline = SystemTime::UNIX_EPOCH + Duration::from_millis(deadline_ms);
    deadline
        .duration_since(SystemTime::now())
        .unwrap_or_default()
}

async fn handler(event: LambdaEvent<HeartbeatEvent>) -> Result<HeartbeatOutput, Error> {
    let (event, context) = event.into_parts();
    info!(
        "request {} for s3://{} in {}",
        context.request_id, event.bucket_name, event.region
    );
    let config = HeartbeatConfig::from_env()?;
    let stores = HeartrateStores::s3(
        &config,
        Some(event.region.as_str()),
        event.bucket_name.as_str(),
    )
    .await;

    let cancel = CancellationToken::new();
    let deadline = cancel_after(&cancel, remaining_time(context.deadline));
    let result = refresh_heartrate(&stores, &config, &cancel).await;
    deadline.abort();

    let outcome = result.inspect_err(|e| error!("refresh failed: {e}"))?;
    Ok(HeartbeatOutput {
        token_rotated: outcome.token_rotated,
        records_fetched: outcome.records_fetched,
        latest: outcome.latest,
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    run(service_fn(handler)).await
}
