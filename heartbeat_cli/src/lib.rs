#![allow(clippy::module_name_repetitions)]

pub mod heartbeat_auth;
pub mod heartbeat_cli_opts;
