use serde::Deserialize;
use stack_string::StackString;
use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::errors::HeartbeatError as Error;

/// `HeartbeatConfig` holds configuration information which can be set either
/// through environment variables or the config.env file, see the dotenvy crate
/// for more information about the config file format.
#[derive(Deserialize, Debug, PartialEq)]
pub struct HeartbeatConfigInner {
    pub aws_region: Option<StackString>,
    pub bucket_name: Option<StackString>,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default = "default_client_credential_key")]
    pub client_credential_key: StackString,
    #[serde(default = "default_access_token_key")]
    pub access_token_key: StackString,
    #[serde(default = "default_latest_record_key")]
    pub latest_record_key: StackString,
    #[serde(default = "default_fitbit_api_url")]
    pub fitbit_api_url: StackString,
    #[serde(default = "default_fitbit_auth_url")]
    pub fitbit_auth_url: StackString,
    #[serde(default = "default_fitbit_token_url")]
    pub fitbit_token_url: StackString,
    pub fitbit_redirect_uri: Option<StackString>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_store_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| Path::new("/tmp").to_path_buf())
        .join(".heartbeatmon")
}
fn default_client_credential_key() -> StackString {
    "clientCredential.json".into()
}
fn default_access_token_key() -> StackString {
    "accessToken.json".into()
}
fn default_latest_record_key() -> StackString {
    "latest.json".into()
}
fn default_fitbit_api_url() -> StackString {
    "https://api.fitbit.com".into()
}
fn default_fitbit_auth_url() -> StackString {
    "https://www.fitbit.com/oauth2/authorize".into()
}
fn default_fitbit_token_url() -> StackString {
    "https://api.fitbit.com/oauth2/token".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for HeartbeatConfigInner {
    fn default() -> Self {
        Self {
            aws_region: None,
            bucket_name: None,
            store_dir: default_store_dir(),
            client_credential_key: default_client_credential_key(),
            access_token_key: default_access_token_key(),
            latest_record_key: default_latest_record_key(),
            fitbit_api_url: default_fitbit_api_url(),
            fitbit_auth_url: default_fitbit_auth_url(),
            fitbit_token_url: default_fitbit_token_url(),
            fitbit_redirect_uri: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct HeartbeatConfig(Arc<HeartbeatConfigInner>);

impl HeartbeatConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_inner(inner: HeartbeatConfigInner) -> Self {
        Self(Arc::new(inner))
    }

    /// Read configuration from the process environment only.
    ///
    /// # Errors
    /// Returns error if an environment variable fails to deserialize
    pub fn from_env() -> Result<Self, Error> {
        let conf: HeartbeatConfigInner = envy::from_env()?;
        Ok(Self(Arc::new(conf)))
    }

    /// Pull configuration from a file if it exists,
    /// first look for the given file name,
    /// then try `${CONFIG_DIR}/heartbeatmon/config.env`,
    /// then a config.env file in the current directory.
    ///
    /// # Errors
    /// Returns error if an environment variable fails to deserialize
    pub fn get_config(fname: Option<&Path>) -> Result<Self, Error> {
        let default_fname = dirs::config_dir()
            .map(|d| d.join("heartbeatmon").join("config.env"))
            .unwrap_or_else(|| Path::new("config.env").to_path_buf());

        let env_file = match fname {
            Some(fname) if fname.exists() => fname,
            _ => &default_fname,
        };

        dotenvy::dotenv().ok();

        if env_file.exists() {
            dotenvy::from_path(env_file).ok();
        } else if Path::new("config.env").exists() {
            dotenvy::from_filename("config.env").ok();
        }

        Self::from_env()
    }
}

impl Deref for HeartbeatConfig {
    type Target = HeartbeatConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
