use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use heartbeat_lib::iso_8601_datetime;

/// One intraday sample, timestamp normalized to UTC.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct FitbitHeartRate {
    #[serde(with = "iso_8601_datetime")]
    pub datetime: OffsetDateTime,
    pub value: i32,
}

/// The single record kept between invocations.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct LatestHeartRate {
    #[serde(with = "iso_8601_datetime")]
    pub time: OffsetDateTime,
    pub heart_rate: i32,
}

impl From<FitbitHeartRate> for LatestHeartRate {
    fn from(item: FitbitHeartRate) -> Self {
        Self {
            time: item.datetime,
            heart_rate: item.value,
        }
    }
}

impl LatestHeartRate {
    /// Chronologically last record of a batch, `None` for an empty batch.
    #[must_use]
    pub fn from_records(records: &[FitbitHeartRate]) -> Option<Self> {
        records
            .iter()
            .max_by_key(|r| r.datetime)
            .copied()
            .map(Into::into)
    }
}
