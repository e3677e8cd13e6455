use serde::{Deserialize, Serialize};
use stack_string::{format_sstr, StackString};
use std::fmt;
use time::{Duration, OffsetDateTime};

use heartbeat_lib::iso_8601_datetime;

/// Tokens are treated as expired this long before their recorded expiry.
pub const EXPIRY_DELTA: Duration = Duration::seconds(10);

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ClientCredential {
    #[serde(rename = "clientId")]
    pub client_id: StackString,
    #[serde(rename = "clientSecret")]
    pub client_secret: StackString,
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Access/refresh token pair.  A missing `expires_at` means the access token
/// must be refreshed before first use.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenCredential {
    #[serde(rename = "accessToken")]
    pub access_token: StackString,
    #[serde(rename = "refreshToken")]
    pub refresh_token: StackString,
    #[serde(
        rename = "expiresAt",
        default,
        with = "iso_8601_datetime::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<OffsetDateTime>,
}

impl fmt::Debug for TokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCredential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenCredential {
    #[must_use]
    pub fn expired_at(&self, now: OffsetDateTime) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - EXPIRY_DELTA <= now,
            None => true,
        }
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        self.expired_at(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn auth_header(&self) -> StackString {
        format_sstr!("Bearer {}", self.access_token)
    }
}
