#![allow(clippy::module_name_repetitions)]

pub mod errors;
pub mod heartbeat_config;
pub mod heartbeat_util;
pub mod iso_8601_datetime;
pub mod persistent_store;
