use anyhow::Error;

use heartbeat_cli::heartbeat_cli_opts::HeartbeatCliOpts;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    match HeartbeatCliOpts::process_args().await {
        Err(e) if e.to_string().contains("Broken pipe") => Ok(()),
        result => result,
    }
}
