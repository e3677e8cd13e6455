use mockito::{Matcher, Mock, Server, ServerGuard};
use time::{macros::datetime, Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use fitbit_lib::{
    fitbit_client::FitbitClient,
    fitbit_credentials::{ClientCredential, TokenCredential},
    fitbit_heartrate::FitbitHeartRate,
};
use heartbeat_lib::{
    errors::{ErrorBody, HeartbeatError as Error},
    heartbeat_config::{HeartbeatConfig, HeartbeatConfigInner},
};

const HEARTRATE_PATH: &str = r"^/1/user/-/activities/heart/date/2023-01-01/1d/1min\.json";

fn get_config(server: &ServerGuard) -> HeartbeatConfig {
    HeartbeatConfig::from_inner(HeartbeatConfigInner {
        fitbit_api_url: server.url().into(),
        fitbit_token_url: format!("{}/oauth2/token", server.url()).into(),
        ..HeartbeatConfigInner::default()
    })
}

fn get_credential() -> ClientCredential {
    ClientCredential {
        client_id: "testId".into(),
        client_secret: "testSecret".into(),
    }
}

fn fresh_token() -> TokenCredential {
    TokenCredential {
        access_token: "a1".into(),
        refresh_token: "r1".into(),
        expires_at: Some(OffsetDateTime::now_utc() + Duration::hours(8)),
    }
}

async fn mock_heartrate(server: &mut ServerGuard, status: usize, body: &str) -> Mock {
    server
        .mock("GET", Matcher::Regex(HEARTRATE_PATH.into()))
        .match_query(Matcher::UrlEncoded("timezone".into(), "UTC".into()))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

async fn mock_token(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/oauth2/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "refresh_token".into(),
        ))
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"access_token":"a2","refresh_token":"r2","expires_in":28800,"token_type":"Bearer","user_id":"X"}"#,
        )
        .create_async()
        .await
}

#[tokio::test]
async fn test_get_heartrate_forces_refresh_without_expiry() -> Result<(), Error> {
    let mut server = Server::new_async().await;
    let token_mock = mock_token(&mut server).await;
    let hr_mock = server
        .mock("GET", Matcher::Regex(HEARTRATE_PATH.into()))
        .match_query(Matcher::UrlEncoded("timezone".into(), "UTC".into()))
        .match_header("authorization", "Bearer a2")
        .with_body(r#"{"activities-heart-intraday":{"dataset":[{"time":"01:02:03","value":78}]}}"#)
        .create_async()
        .await;

    let config = get_config(&server);
    let token = TokenCredential {
        expires_at: None,
        ..fresh_token()
    };
    let mut client = FitbitClient::new(&get_credential(), token, &config)?;
    let cancel = CancellationToken::new();
    let records = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await?;

    assert_eq!(
        records,
        vec![FitbitHeartRate {
            datetime: datetime!(2023-01-01 01:02:03 UTC),
            value: 78,
        }]
    );
    assert_eq!(client.current_token().access_token.as_str(), "a2");
    assert_eq!(client.current_token().refresh_token.as_str(), "r2");

    token_mock.assert_async().await;
    hr_mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_same_utc_day() -> Result<(), Error> {
    let mut server = Server::new_async().await;
    let hr_mock = server
        .mock("GET", Matcher::Regex(HEARTRATE_PATH.into()))
        .match_query(Matcher::UrlEncoded("timezone".into(), "UTC".into()))
        .with_body(
            r#"{"activities-heart":[],"activities-heart-intraday":{"dataset":[{"time":"00:00:00","value":60},{"time":"01:02:03","value":78}],"datasetInterval":1,"datasetType":"minute"}}"#,
        )
        .expect(2)
        .create_async()
        .await;

    let config = get_config(&server);
    let mut client = FitbitClient::new(&get_credential(), fresh_token(), &config)?;
    let cancel = CancellationToken::new();
    let utc = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await?;
    let jst = client
        .get_fitbit_intraday_time_series_heartrate(
            datetime!(2023-01-01 10:02:03 +09:00),
            &cancel,
        )
        .await?;

    assert_eq!(utc.len(), 2);
    assert_eq!(utc, jst);
    assert_eq!(utc[0].datetime, datetime!(2023-01-01 00:00:00 UTC));
    assert_eq!(utc[1].datetime, datetime!(2023-01-01 01:02:03 UTC));
    assert_eq!(client.current_token().access_token.as_str(), "a1");

    hr_mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_expired_token() -> Result<(), Error> {
    let mut server = Server::new_async().await;
    let body = r#"{"errors":[{"errorType":"expired_token","message":"Access token expired"}],"success":false}"#;
    let _hr_mock = mock_heartrate(&mut server, 401, body).await;

    let config = get_config(&server);
    let mut client = FitbitClient::new(&get_credential(), fresh_token(), &config)?;
    let cancel = CancellationToken::new();
    let err = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await
        .unwrap_err();

    let request_error = err.request_error().unwrap();
    assert_eq!(request_error.status, 401);
    assert_eq!(request_error.body.raw(), body);
    let first = request_error.first_error().unwrap();
    assert_eq!(first.error_type.as_str(), "expired_token");
    assert_eq!(first.message.as_str(), "Access token expired");
    assert!(err.to_string().ends_with("(expired_token): Access token expired"));
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_unparseable_error_body() -> Result<(), Error> {
    let mut server = Server::new_async().await;
    let _hr_mock = mock_heartrate(&mut server, 400, "<html>bad request</html>").await;

    let config = get_config(&server);
    let mut client = FitbitClient::new(&get_credential(), fresh_token(), &config)?;
    let cancel = CancellationToken::new();
    let err = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SerdeJsonError(_)));
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_server_error() -> Result<(), Error> {
    let mut server = Server::new_async().await;
    let _hr_mock = mock_heartrate(&mut server, 503, "busy").await;

    let config = get_config(&server);
    let mut client = FitbitClient::new(&get_credential(), fresh_token(), &config)?;
    let cancel = CancellationToken::new();
    let err = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await
        .unwrap_err();
    let request_error = err.request_error().unwrap();
    assert_eq!(request_error.status, 503);
    assert_eq!(
        request_error.body,
        ErrorBody::Unstructured { raw: "busy".into() }
    );
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_malformed_time() -> Result<(), Error> {
    let mut server = Server::new_async().await;
    let _hr_mock = mock_heartrate(
        &mut server,
        200,
        r#"{"activities-heart-intraday":{"dataset":[{"time":"01:02","value":78}]}}"#,
    )
    .await;

    let config = get_config(&server);
    let mut client = FitbitClient::new(&get_credential(), fresh_token(), &config)?;
    let cancel = CancellationToken::new();
    let err = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ParseError(_)));
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_time_offset_out_of_range() -> Result<(), Error> {
    let mut server = Server::new_async().await;
    let _hr_mock = mock_heartrate(
        &mut server,
        200,
        r#"{"activities-heart-intraday":{"dataset":[{"time":"00:00:00","value":60},{"time":"4000000000:00:00","value":78}]}}"#,
    )
    .await;

    let config = get_config(&server);
    let mut client = FitbitClient::new(&get_credential(), fresh_token(), &config)?;
    let cancel = CancellationToken::new();
    let err = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ParseError(_)));
    assert!(err.to_string().contains("4000000000:00:00"));
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_refresh_expiry_out_of_range() -> Result<(), Error> {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth2/token")
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"access_token":"a2","refresh_token":"r2","expires_in":9223372036854775807,"token_type":"Bearer"}"#,
        )
        .create_async()
        .await;
    let hr_mock = server
        .mock("GET", Matcher::Regex(HEARTRATE_PATH.into()))
        .expect(0)
        .create_async()
        .await;

    let config = get_config(&server);
    let token = TokenCredential {
        expires_at: None,
        ..fresh_token()
    };
    let mut client = FitbitClient::new(&get_credential(), token, &config)?;
    let cancel = CancellationToken::new();
    let err = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ParseError(_)));
    assert_eq!(client.current_token().access_token.as_str(), "a1");

    token_mock.assert_async().await;
    hr_mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_missing_dataset()-> Result<(), Error> {
    let mut server = Server::new_async().await;
    let _hr_mock = mock_heartrate(&mut server, 200, r#"{"activities-heart":[]}"#).await;

    let config = get_config(&server);
    let mut client = FitbitClient::new(&get_credential(), fresh_token(), &config)?;
    let cancel = CancellationToken::new();
    let records = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await?;
    assert!(records.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_get_heartrate_cancelled() -> Result<(), Error> {
    let server = Server::new_async().await;
    let config = get_config(&server);
    let mut client = FitbitClient::new(&get_credential(), fresh_token(), &config)?;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = client
        .get_fitbit_intraday_time_series_heartrate(datetime!(2023-01-01 01:02:03 UTC), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    Ok(())
}
