use anyhow::Error;
use clap::{Parser, Subcommand};
use log::error;
use std::{path::PathBuf, time::Duration};
use tokio::io::{stdin, stdout, BufReader};
use tokio_util::sync::CancellationToken;

use fitbit_lib::heartrate_refresh::{load_latest_heartrate, refresh_heartrate};
use heartbeat_lib::{
    heartbeat_config::HeartbeatConfig, heartbeat_util::cancel_after,
    persistent_store::HeartrateStores,
};

use crate::heartbeat_auth::authorize;

#[derive(Parser, Debug)]
#[command(author, version, about = "Keep the latest fitbit heart rate up to date", long_about = None)]
pub struct HeartbeatCliOpts {
    /// config.env file read before the environment
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: HeartbeatCommand,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatCommand {
    /// Fetch today's heart rate, save a rotated token and the latest record
    Refresh,
    /// Authorize with fitbit and save the client credential and first token
    Auth,
    /// Print the saved latest heart rate
    Latest,
}

impl HeartbeatCliOpts {
    /// # Errors
    /// Return error if the selected command fails
    pub async fn process_args() -> Result<(), Error> {
        Self::parse().run().await
    }

    /// # Errors
    /// Return error if the selected command fails
    pub async fn run(self) -> Result<(), Error> {
        let config = HeartbeatConfig::get_config(self.config.as_deref())?;
        let stores = HeartrateStores::from_config(&config).await;
        let cancel = CancellationToken::new();

        match self.command {
            HeartbeatCommand::Refresh => {
                let timeout = Duration::from_secs(config.request_timeout_secs);
                let deadline = cancel_after(&cancel, timeout);
                let result = refresh_heartrate(&stores, &config, &cancel).await;
                deadline.abort();
                let outcome = result.inspect_err(|e| error!("refresh failed: {e}"))?;
                match outcome.latest {
                    Some(latest) => println!("{}", serde_json::to_string(&latest)?),
                    None => println!("no heart rate records"),
                }
                if outcome.token_rotated {
                    println!("access token rotated");
                }
            }
            HeartbeatCommand::Auth => {
                let mut input = BufReader::new(stdin());
                let mut output = stdout();
                authorize(&config, &stores, &mut input, &mut output, &cancel).await?;
            }
            HeartbeatCommand::Latest => {
                let latest = load_latest_heartrate(&stores.latest_record, &cancel).await?;
                println!("{}", serde_json::to_string_pretty(&latest)?);
            }
        }
        Ok(())
    }
}
