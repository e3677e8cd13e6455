#![allow(clippy::module_name_repetitions)]

pub mod fitbit_client;
pub mod fitbit_credentials;
pub mod fitbit_heartrate;
pub mod fitbit_oauth;
pub mod heartrate_refresh;
pub mod token_refreshing_client;
