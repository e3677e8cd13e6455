use log::debug;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use stack_string::{format_sstr, StackString};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use heartbeat_lib::{
    errors::{HeartbeatError as Error, RequestError},
    heartbeat_config::HeartbeatConfig,
    heartbeat_util::{parse_time_offset, run_cancellable, truncate_to_utc_day},
};

use crate::{
    fitbit_credentials::{ClientCredential, TokenCredential},
    fitbit_heartrate::FitbitHeartRate,
    fitbit_oauth::FitbitOAuthConfig,
    token_refreshing_client::TokenRefreshingClient,
};

#[derive(Debug, Clone)]
pub struct FitbitClient {
    base_url: StackString,
    oauth: FitbitOAuthConfig,
    token: TokenCredential,
}

impl FitbitClient {
    /// A token without a recorded expiry is refreshed before the first
    /// request.
    ///
    /// # Errors
    /// Returns error if the configured oauth urls are invalid
    pub fn new(
        credential: &ClientCredential,
        token: TokenCredential,
        config: &HeartbeatConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            base_url: config.fitbit_api_url.as_str().trim_end_matches('/').into(),
            oauth: FitbitOAuthConfig::new(credential, config)?,
            token,
        })
    }

    #[must_use]
    pub fn current_token(&self) -> &TokenCredential {
        &self.token
    }

    #[must_use]
    pub fn into_token(self) -> TokenCredential {
        self.token
    }

    /// Intraday heart rate url for the UTC day starting at `day`.
    ///
    /// # Errors
    /// Returns error if the configured base url is invalid
    pub fn heartrate_url(&self, day: OffsetDateTime) -> Result<Url, Error> {
        let url = format_sstr!(
            "{}/1/user/-/activities/heart/date/{}/1d/1min.json",
            self.base_url,
            day.date()
        );
        Url::parse_with_params(url.as_str(), &[("timezone", "UTC")]).map_err(Into::into)
    }

    /// Fetch every 1 minute sample for the UTC calendar day containing `at`.
    ///
    /// # Errors
    /// Returns `RequestError` if the api rejects the request, `TransportError`
    /// on network failure, a parse error on a malformed body and `Cancelled`
    /// if `cancel` fires
    pub async fn get_fitbit_intraday_time_series_heartrate(
        &mut self,
        at: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> Result<Vec<FitbitHeartRate>, Error> {
        #[derive(Deserialize)]
        struct HeartRateResp {
            #[serde(rename = "activities-heart-intraday", default)]
            intraday: HrDs,
        }
        #[derive(Deserialize, Default)]
        struct HrDs {
            #[serde(default)]
            dataset: Vec<HrDataSet>,
        }
        #[derive(Deserialize)]
        struct HrDataSet {
            time: StackString,
            value: i32,
        }

        let day = truncate_to_utc_day(at);
        let url = self.heartrate_url(day)?;
        let mut transport = TokenRefreshingClient::new(&self.oauth, self.token.clone());
        let response = transport
            .issue_request(Method::GET, url.clone(), cancel)
            .await?;
        let status = response.status();
        let body = run_cancellable(cancel, "read response", async {
            response.text().await.map_err(Into::into)
        })
        .await?;
        debug!("{url} responded {status}");

        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let err = RequestError::structured(url.as_str(), status.as_u16(), &body)?;
                return Err(err.into());
            }
            s if !s.is_success() => {
                let err = RequestError::unstructured(url.as_str(), s.as_u16(), &body);
                return Err(err.into());
            }
            _ => {}
        }

        let dataset: HeartRateResp = serde_json::from_str(&body)?;
        let hr_values: Vec<_> = dataset
            .intraday
            .dataset
            .into_iter()
            .map(|entry| -> Result<FitbitHeartRate, Error> {
                let offset = parse_time_offset(&entry.time)?;
                let datetime = day.checked_add(offset).ok_or_else(|| {
                    Error::ParseError(format_sstr!("time offset {} out of range", entry.time))
                })?;
                Ok(FitbitHeartRate {
                    datetime,
                    value: entry.value,
                })
            })
            .collect::<Result<_, _>>()?;
        self.token = transport.into_credential();
        Ok(hr_values)
    }
}
