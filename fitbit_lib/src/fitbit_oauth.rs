use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use log::debug;
use maplit::hashmap;
use rand::{thread_rng, Rng};
use reqwest::{header::HeaderMap, Client, Url};
use serde::Deserialize;
use stack_string::{format_sstr, StackString};
use std::{collections::HashMap, fmt};
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use heartbeat_lib::{
    errors::{HeartbeatError as Error, RequestError},
    heartbeat_config::HeartbeatConfig,
    heartbeat_util::run_cancellable,
};

use crate::fitbit_credentials::{ClientCredential, TokenCredential};

pub const FITBIT_SCOPES: &[&str] = &["heartrate"];

#[derive(Deserialize, Debug)]
struct AccessTokenResponse {
    access_token: StackString,
    #[serde(default)]
    refresh_token: Option<StackString>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl AccessTokenResponse {
    fn into_credential(
        self,
        previous_refresh_token: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<TokenCredential, Error> {
        let expires_at = match self.expires_in {
            Some(s) if s < 0 => {
                return Err(Error::ParseError(format_sstr!("negative expires_in {s}")));
            }
            Some(s) => Some(now.checked_add(Duration::seconds(s)).ok_or_else(|| {
                Error::ParseError(format_sstr!("expires_in {s} out of range"))
            })?),
            None => None,
        };
        let refresh_token = match (self.refresh_token, previous_refresh_token) {
            (Some(t), _) => t,
            (None, Some(t)) => t.into(),
            (None, None) => StackString::new(),
        };
        Ok(TokenCredential {
            access_token: self.access_token,
            refresh_token,
            expires_at,
        })
    }
}

/// OAuth2 client settings for the fitbit authorization server.
#[derive(Clone)]
pub struct FitbitOAuthConfig {
    pub client_id: StackString,
    client_secret: StackString,
    pub scopes: &'static [&'static str],
    pub auth_url: Url,
    pub token_url: Url,
    pub redirect_uri: Option<StackString>,
    client: Client,
}

impl fmt::Debug for FitbitOAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitbitOAuthConfig")
            .field("client_id", &self.client_id)
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .finish_non_exhaustive()
    }
}

impl FitbitOAuthConfig {
    /// # Errors
    /// Returns error if the configured urls are invalid or the http client
    /// cannot be built
    pub fn new(credential: &ClientCredential, config: &HeartbeatConfig) -> Result<Self, Error> {
        Ok(Self {
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            scopes: FITBIT_SCOPES,
            auth_url: Url::parse(config.fitbit_auth_url.as_str())?,
            token_url: Url::parse(config.fitbit_token_url.as_str())?,
            redirect_uri: config.fitbit_redirect_uri.clone(),
            client: Client::builder().build()?,
        })
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn get_random_state() -> StackString {
        let random_bytes: Vec<u8> = (0..16).map(|_| thread_rng().gen::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(random_bytes).into()
    }

    /// # Errors
    /// Returns error if the authorization url cannot be built
    pub fn auth_code_url(&self, state: &str) -> Result<Url, Error> {
        let scope = self.scopes.join(" ");
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
        ];
        if let Some(redirect_uri) = &self.redirect_uri {
            params.push(("redirect_uri", redirect_uri.as_str()));
        }
        Url::parse_with_params(self.auth_url.as_str(), &params).map_err(Into::into)
    }

    fn get_basic_headers(&self) -> Result<HeaderMap, Error> {
        let client_id: String =
            form_urlencoded::byte_serialize(self.client_id.as_str().as_bytes()).collect();
        let client_secret: String =
            form_urlencoded::byte_serialize(self.client_secret.as_str().as_bytes()).collect();
        let basic = STANDARD.encode(format!("{client_id}:{client_secret}"));
        let mut headers = HeaderMap::new();
        headers.insert("Content-type", "application/x-www-form-urlencoded".parse()?);
        headers.insert("Authorization", format!("Basic {basic}").parse()?);
        Ok(headers)
    }

    /// Exchange an authorization code for the first token pair.
    ///
    /// # Errors
    /// Returns error if the token endpoint rejects the code or is unreachable
    pub async fn exchange_code(
        &self,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenCredential, Error> {
        let mut data = hashmap! {
            "grant_type" => "authorization_code",
            "code" => code,
            "client_id" => self.client_id.as_str(),
        };
        if let Some(redirect_uri) = &self.redirect_uri {
            data.insert("redirect_uri", redirect_uri.as_str());
        }
        let resp = self.token_request(&data, cancel).await?;
        resp.into_credential(None, OffsetDateTime::now_utc())
    }

    /// Exchange the refresh token for a new token pair.  A response without a
    /// refresh token keeps the old one.
    ///
    /// # Errors
    /// Returns error if the token endpoint rejects the refresh token or is
    /// unreachable
    pub async fn refresh_token(
        &self,
        token: &TokenCredential,
        cancel: &CancellationToken,
    ) -> Result<TokenCredential, Error> {
        let data = hashmap! {
            "grant_type" => "refresh_token",
            "refresh_token" => token.refresh_token.as_str(),
        };
        let resp = self.token_request(&data, cancel).await?;
        resp.into_credential(Some(token.refresh_token.as_str()), OffsetDateTime::now_utc())
    }

    async fn token_request(
        &self,
        data: &HashMap<&str, &str>,
        cancel: &CancellationToken,
    ) -> Result<AccessTokenResponse, Error> {
        let headers = self.get_basic_headers()?;
        let url = self.token_url.clone();
        let (status, body) = run_cancellable(cancel, "token request", async {
            let response = self
                .client
                .post(url.clone())
                .headers(headers)
                .form(data)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, Error>((status, body))
        })
        .await?;
        debug!("token endpoint responded {status}");
        if !status.is_success() {
            let err = RequestError::structured(url.as_str(), status.as_u16(), &body)
                .unwrap_or_else(|_| {
                    RequestError::unstructured(url.as_str(), status.as_u16(), &body)
                });
            return Err(err.into());
        }
        serde_json::from_str(&body).map_err(Into::into)
    }
}
