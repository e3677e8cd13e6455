use log::info;
use stack_string::{format_sstr, StackString};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use url::Url;

use fitbit_lib::{
    fitbit_credentials::{ClientCredential, TokenCredential},
    fitbit_oauth::FitbitOAuthConfig,
    heartrate_refresh::{save_access_token, save_client_credential},
};
use heartbeat_lib::{
    errors::HeartbeatError as Error,
    heartbeat_config::HeartbeatConfig,
    iso_8601_datetime::convert_datetime_to_str,
    persistent_store::{HeartrateStores, PersistentStore},
};

async fn prompt<R, W>(input: &mut R, output: &mut W, message: &str) -> Result<StackString, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(message.as_bytes()).await?;
    output.flush().await?;
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Err(Error::StaticCustomError("unexpected end of input"));
    }
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::CustomError(format_sstr!(
            "empty response to {}",
            message.trim_end_matches(": ")
        )));
    }
    Ok(line.into())
}

/// Accept either the bare authorization code or the whole redirect url, in
/// which case `state` has to match what was sent.
///
/// # Errors
/// Returns error if the redirect url has no code or a mismatched state
pub fn parse_authorization_response(response: &str, state: &str) -> Result<StackString, Error> {
    let response = response.trim();
    let Ok(url) = Url::parse(response) else {
        return Ok(response.into());
    };
    let mut code = None;
    let mut returned_state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(StackString::from(value.as_ref())),
            "state" => returned_state = Some(StackString::from(value.as_ref())),
            _ => {}
        }
    }
    if returned_state.as_ref().map(StackString::as_str) != Some(state) {
        return Err(Error::StaticCustomError("state mismatch in redirect url"));
    }
    code.ok_or(Error::StaticCustomError("no code in redirect url"))
}

/// Interactive first time setup: ask for the client credential, have the user
/// authorize in a browser, exchange the code and save both credentials.
///
/// # Errors
/// Returns error if input is missing, the token exchange fails or a
/// credential cannot be saved
pub async fn authorize<R, W, S>(
    config: &HeartbeatConfig,
    stores: &HeartrateStores<S>,
    input: &mut R,
    output: &mut W,
    cancel: &CancellationToken,
) -> Result<TokenCredential, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: PersistentStore + Sync,
{
    let client_credential = ClientCredential {
        client_id: prompt(input, output, "client id: ").await?,
        client_secret: prompt(input, output, "client secret: ").await?,
    };
    let oauth = FitbitOAuthConfig::new(&client_credential, config)?;
    let state = FitbitOAuthConfig::get_random_state();
    let auth_url = oauth.auth_code_url(state.as_str())?;
    output
        .write_all(
            format_sstr!("open the following url to authorize:\n{auth_url}\n")
                .as_str()
                .as_bytes(),
        )
        .await?;

    let response = prompt(input, output, "authorization code or redirect url: ").await?;
    let code = parse_authorization_response(response.as_str(), state.as_str())?;
    let token = oauth.exchange_code(code.as_str(), cancel).await?;

    let expires_at = token
        .expires_at
        .map_or_else(|| "unknown".into(), convert_datetime_to_str);
    output
        .write_all(
            format_sstr!(
                "access token: {}\nrefresh token: {}\nexpires at: {expires_at}\n",
                token.access_token,
                token.refresh_token
            )
            .as_str()
            .as_bytes(),
        )
        .await?;
    output.flush().await?;

    save_client_credential(&stores.client_credential, &client_credential, cancel)
        .await
        .map_err(|e| e.context("save client credential"))?;
    save_access_token(&stores.access_token, &token, cancel)
        .await
        .map_err(|e| e.context("save access token"))?;
    info!("saved credentials for client {}", client_credential.client_id);
    Ok(token)
}
