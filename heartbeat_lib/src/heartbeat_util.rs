use log::debug;
use smallvec::SmallVec;
use stack_string::format_sstr;
use std::future::Future;
use time::{Duration, OffsetDateTime, Time, UtcOffset};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::errors::HeartbeatError as Error;

/// Parse an intraday offset such as `"01:02:03"` into a duration from
/// midnight.  Hours are unbounded, minutes and seconds are taken as given.
///
/// # Errors
/// Return `ParseError` if the string is not three `:` separated integers
pub fn parse_time_offset(time_str: &str) -> Result<Duration, Error> {
    let entries: SmallVec<[&str; 3]> = time_str.trim().split(':').collect();
    let [h, m, s] = *entries.as_slice() else {
        return Err(Error::ParseError(format_sstr!(
            "parse time {time_str}: expected H:M:S"
        )));
    };
    let parse_field = |field: &str| {
        field
            .parse::<u32>()
            .map(i64::from)
            .map_err(|e| Error::ParseError(format_sstr!("parse time {time_str}: {e}")))
    };
    let (h, m, s) = (parse_field(h)?, parse_field(m)?, parse_field(s)?);
    Ok(Duration::seconds(h * 3600 + m * 60 + s))
}

/// Midnight of the UTC calendar day containing `instant`.
#[must_use]
pub fn truncate_to_utc_day(instant: OffsetDateTime) -> OffsetDateTime {
    instant.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

/// Race `fut` against `cancel`; a fired token wins even if both are ready.
///
/// # Errors
/// Returns `Cancelled(operation)` if the token fires first, otherwise the
/// result of `fut`
pub async fn run_cancellable<T, F>(
    cancel: &CancellationToken,
    operation: &'static str,
    fut: F,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("{operation} cancelled");
            Err(Error::Cancelled(operation))
        }
        result = fut => result,
    }
}

/// Cancel `cancel` once `timeout` elapses.  Abort the returned handle when the
/// guarded work finishes first.
#[must_use]
pub fn cancel_after(cancel: &CancellationToken, timeout: std::time::Duration) -> JoinHandle<()> {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        sleep(timeout).await;
        debug!("deadline of {timeout:?} reached");
        cancel.cancel();
    })
}
