use log::debug;
use serde::{de, ser, Deserialize, Deserializer, Serializer};
use stack_string::{format_sstr, StackString};
use time::{format_description::well_known::Rfc3339, macros::datetime, OffsetDateTime};
use time_tz::{timezones::db::UTC, OffsetDateTimeExt};

use crate::errors::HeartbeatError as Error;

/// The zero instant written by earlier deployments for "no expiry".
#[must_use]
pub fn sentinel_datetime() -> OffsetDateTime {
    datetime!(0001-01-01 00:00:00).assume_utc()
}

/// Format as RFC3339 in UTC with a `Z` suffix.
///
/// # Errors
/// Return error if the year falls outside 0..=9999
pub fn try_convert_datetime_to_str(datetime: OffsetDateTime) -> Result<StackString, Error> {
    datetime
        .to_timezone(UTC)
        .format(&Rfc3339)
        .map(Into::into)
        .map_err(|e| Error::ParseError(format_sstr!("format timestamp {datetime}: {e}")))
}

/// Infallible form for display, empty when the timestamp cannot be written.
#[must_use]
pub fn convert_datetime_to_str(datetime: OffsetDateTime) -> StackString {
    try_convert_datetime_to_str(datetime).unwrap_or_else(|e| {
        debug!("{e}");
        StackString::new()
    })
}

/// # Errors
/// Return error if the string is not a valid RFC3339 timestamp
pub fn convert_str_to_datetime(s: &str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map(|x| x.to_timezone(UTC))
        .map_err(|e| Error::ParseError(format!("invalid timestamp {s}: {e}").into()))
}

/// # Errors
/// Returns error if serialization fails
pub fn serialize<S>(date: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = try_convert_datetime_to_str(*date).map_err(ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// # Errors
/// Returns error if deserialization fails
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = StackString::deserialize(deserializer)?;
    convert_str_to_datetime(&s).map_err(de::Error::custom)
}

/// Optional timestamps: `None` is skipped on write (pair with
/// `skip_serializing_if = "Option::is_none"`), and the zero instant reads
/// back as `None`.
pub mod option {
    use serde::{de, ser, Deserialize, Deserializer, Serializer};
    use stack_string::StackString;
    use time::OffsetDateTime;

    use super::{convert_str_to_datetime, sentinel_datetime, try_convert_datetime_to_str};

    /// # Errors
    /// Returns error if serialization fails
    pub fn serialize<S>(date: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => {
                let s = try_convert_datetime_to_str(*date).map_err(ser::Error::custom)?;
                serializer.serialize_str(&s)
            }
            None => serializer.serialize_none(),
        }
    }

    /// # Errors
    /// Returns error if deserialization fails
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<StackString> = Option::deserialize(deserializer)?;
        match s {
            Some(s) if !s.is_empty() => {
                let datetime = convert_str_to_datetime(&s).map_err(de::Error::custom)?;
                if datetime == sentinel_datetime() {
                    Ok(None)
                } else {
                    Ok(Some(datetime))
                }
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use time::macros::datetime;
    use time::{Date, Month, OffsetDateTime};

    use crate::errors::HeartbeatError as Error;
    use crate::iso_8601_datetime::{
        convert_datetime_to_str, convert_str_to_datetime, try_convert_datetime_to_str,
    };

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Stamped {
        #[serde(with = "crate::iso_8601_datetime")]
        time: OffsetDateTime,
        #[serde(
            default,
            with = "crate::iso_8601_datetime::option",
            skip_serializing_if = "Option::is_none"
        )]
        expires: Option<OffsetDateTime>,
    }

    #[test]
    fn test_convert_datetime_to_str() {
        let dt = datetime!(2023-01-02 01:02:03 +09:00);
        assert_eq!(convert_datetime_to_str(dt).as_str(), "2023-01-01T16:02:03Z");
        let dt = datetime!(2023-01-01 01:02:03.25 UTC);
        assert_eq!(convert_datetime_to_str(dt).as_str(), "2023-01-01T01:02:03.25Z");
    }

    #[test]
    fn test_convert_datetime_out_of_range() {
        let dt = Date::from_calendar_date(-1, Month::January, 1)
            .unwrap()
            .midnight()
            .assume_utc();
        assert!(matches!(
            try_convert_datetime_to_str(dt),
            Err(Error::ParseError(_))
        ));
        assert_eq!(convert_datetime_to_str(dt).as_str(), "");

        let s = Stamped {
            time: datetime!(2023-01-01 01:02:03 UTC),
            expires: Some(dt),
        };
        assert!(serde_json::to_string(&s).is_err());
    }

    #[test]
    fn test_convert_str_to_datetime() -> Result<(), Error> {
        let dt = convert_str_to_datetime("2023-01-02T01:02:03+09:00")?;
        assert_eq!(dt, datetime!(2023-01-01 16:02:03 UTC));
        assert!(dt.offset().is_utc());
        assert!(convert_str_to_datetime("yesterday").is_err());
        Ok(())
    }

    #[test]
    fn test_optional_datetime() -> Result<(), Error> {
        let s: Stamped = serde_json::from_str(r#"{"time":"2023-01-01T01:02:03Z"}"#)?;
        assert_eq!(s.expires, None);
        assert_eq!(serde_json::to_string(&s)?, r#"{"time":"2023-01-01T01:02:03Z"}"#);

        let s: Stamped = serde_json::from_str(
            r#"{"time":"2023-01-01T01:02:03Z","expires":"0001-01-01T00:00:00Z"}"#,
        )?;
        assert_eq!(s.expires, None);

        let s: Stamped = serde_json::from_str(
            r#"{"time":"2023-01-01T01:02:03Z","expires":"2023-01-01T09:02:03Z"}"#,
        )?;
        assert_eq!(s.expires, Some(datetime!(2023-01-01 09:02:03 UTC)));
        Ok(())
    }
}
