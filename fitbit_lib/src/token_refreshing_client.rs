use log::info;
use reqwest::{header::AUTHORIZATION, Method, Response, Url};
use tokio_util::sync::CancellationToken;

use heartbeat_lib::{errors::HeartbeatError as Error, heartbeat_util::run_cancellable};

use crate::{fitbit_credentials::TokenCredential, fitbit_oauth::FitbitOAuthConfig};

/// Authenticated transport which re-checks token expiry before every request
/// and swaps in a refreshed token pair when needed.  The held credential is
/// the only state; nothing about validity is cached between calls.
#[derive(Debug)]
pub struct TokenRefreshingClient<'a> {
    oauth: &'a FitbitOAuthConfig,
    token: TokenCredential,
}

impl<'a> TokenRefreshingClient<'a> {
    #[must_use]
    pub fn new(oauth: &'a FitbitOAuthConfig, token: TokenCredential) -> Self {
        Self { oauth, token }
    }

    #[must_use]
    pub fn current_credential(&self) -> &TokenCredential {
        &self.token
    }

    #[must_use]
    pub fn into_credential(self) -> TokenCredential {
        self.token
    }

    /// # Errors
    /// Returns error if the token endpoint rejects the refresh
    pub async fn ensure_fresh(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        if self.token.expired() {
            info!("access token expired, refreshing");
            self.token = self.oauth.refresh_token(&self.token, cancel).await?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns error if a needed refresh fails, the request cannot be sent or
    /// `cancel` fires
    pub async fn issue_request(
        &mut self,
        method: Method,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<Response, Error> {
        self.ensure_fresh(cancel).await?;
        let request = self
            .oauth
            .client()
            .request(method, url)
            .header(AUTHORIZATION, self.token.auth_header().as_str());
        run_cancellable(cancel, "request", async {
            request.send().await.map_err(Into::into)
        })
        .await
    }
}
