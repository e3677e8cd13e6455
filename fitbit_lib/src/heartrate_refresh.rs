use log::{debug, info};
use serde::{de::DeserializeOwned, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use heartbeat_lib::{
    errors::HeartbeatError as Error,
    heartbeat_config::HeartbeatConfig,
    persistent_store::{HeartrateStores, PersistentStore},
};

use crate::{
    fitbit_client::FitbitClient,
    fitbit_credentials::{ClientCredential, TokenCredential},
    fitbit_heartrate::LatestHeartRate,
};

async fn load_json<T, S>(store: &S, cancel: &CancellationToken) -> Result<T, Error>
where
    T: DeserializeOwned,
    S: PersistentStore + Sync,
{
    let body = store.load(cancel).await?;
    serde_json::from_slice(&body).map_err(Into::into)
}

async fn save_json<T, S>(store: &S, value: &T, cancel: &CancellationToken) -> Result<(), Error>
where
    T: Serialize + Sync,
    S: PersistentStore + Sync,
{
    let body = serde_json::to_vec(value)?;
    store.save(&body, cancel).await
}

/// # Errors
/// Returns `LoadError` if the object cannot be read, or a parse error if it
/// is not a client credential
pub async fn load_client_credential<S: PersistentStore + Sync>(
    store: &S,
    cancel: &CancellationToken,
) -> Result<ClientCredential, Error> {
    load_json(store, cancel).await
}

/// # Errors
/// Returns `SaveError` if the object cannot be written
pub async fn save_client_credential<S: PersistentStore + Sync>(
    store: &S,
    credential: &ClientCredential,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    save_json(store, credential, cancel).await
}

/// # Errors
/// Returns `LoadError` if the object cannot be read, or a parse error if it
/// is not a token credential
pub async fn load_access_token<S: PersistentStore + Sync>(
    store: &S,
    cancel: &CancellationToken,
) -> Result<TokenCredential, Error> {
    load_json(store, cancel).await
}

/// # Errors
/// Returns `SaveError` if the object cannot be written
pub async fn save_access_token<S: PersistentStore + Sync>(
    store: &S,
    token: &TokenCredential,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    save_json(store, token, cancel).await
}

/// # Errors
/// Returns `LoadError` if the object cannot be read, or a parse error if it
/// is not a latest record
pub async fn load_latest_heartrate<S: PersistentStore + Sync>(
    store: &S,
    cancel: &CancellationToken,
) -> Result<LatestHeartRate, Error> {
    load_json(store, cancel).await
}

/// # Errors
/// Returns `SaveError` if the object cannot be written
pub async fn save_latest_heartrate<S: PersistentStore + Sync>(
    store: &S,
    latest: &LatestHeartRate,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    save_json(store, latest, cancel).await
}

/// What one refresh did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub token_rotated: bool,
    pub records_fetched: usize,
    pub latest: Option<LatestHeartRate>,
}

/// Load credentials, fetch the day containing now, then persist a rotated
/// token followed by the latest record.
///
/// # Errors
/// Returns the first failing step wrapped with the name of that step
pub async fn refresh_heartrate<S: PersistentStore + Sync>(
    stores: &HeartrateStores<S>,
    config: &HeartbeatConfig,
    cancel: &CancellationToken,
) -> Result<RefreshOutcome, Error> {
    refresh_heartrate_at(stores, config, OffsetDateTime::now_utc(), cancel).await
}

/// # Errors
/// Returns the first failing step wrapped with the name of that step.  A
/// failed token save leaves the record store untouched.
pub async fn refresh_heartrate_at<S: PersistentStore + Sync>(
    stores: &HeartrateStores<S>,
    config: &HeartbeatConfig,
    at: OffsetDateTime,
    cancel: &CancellationToken,
) -> Result<RefreshOutcome, Error> {
    let client_credential = load_client_credential(&stores.client_credential, cancel)
        .await
        .map_err(|e| e.context("load client credential"))?;
    let stored_token = load_access_token(&stores.access_token, cancel)
        .await
        .map_err(|e| e.context("load access token credential"))?;
    debug!(
        "loaded credentials for client {}",
        client_credential.client_id
    );

    let mut client = FitbitClient::new(&client_credential, stored_token.clone(), config)
        .map_err(|e| e.context("get heartrate"))?;
    let records = client
        .get_fitbit_intraday_time_series_heartrate(at, cancel)
        .await
        .map_err(|e| e.context("get heartrate"))?;
    info!("fetched {} heart rate records", records.len());

    let token_rotated = client.current_token().access_token != stored_token.access_token;
    if token_rotated {
        let token = client.into_token();
        save_access_token(&stores.access_token, &token, cancel)
            .await
            .map_err(|e| e.context("save access token"))?;
        info!("saved rotated access token");
    }

    let latest = LatestHeartRate::from_records(&records);
    match &latest {
        Some(latest) => {
            save_latest_heartrate(&stores.latest_record, latest, cancel)
                .await
                .map_err(|e| e.context("save record"))?;
            info!("saved latest heart rate {latest:?}");
        }
        None => debug!("no heart rate records, nothing to save"),
    }

    Ok(RefreshOutcome {
        token_rotated,
        records_fetched: records.len(),
        latest,
    })
}
