use aws_sdk_s3::operation::{get_object::GetObjectError, put_object::PutObjectError};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::byte_stream::error::Error as AwsByteStreamError;
use envy::Error as EnvyError;
use http::header::InvalidHeaderValue;
use reqwest::Error as ReqwestError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use stack_string::StackString;
use std::fmt;
use thiserror::Error;
use time::error::Format as TimeFormatError;
use url::ParseError as UrlParseError;

pub type AwsGetObjectError = SdkError<GetObjectError, aws_smithy_runtime_api::http::Response>;
pub type AwsPutObjectError = SdkError<PutObjectError, aws_smithy_runtime_api::http::Response>;

/// One entry of the `errors` array returned by the fitbit api on 400/401.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiErrorEntry {
    #[serde(rename = "errorType")]
    pub error_type: StackString,
    pub message: StackString,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

/// Body of a rejected request.  `Structured` is only produced for statuses
/// whose body follows the `{"errors": [...]}` contract (400 and 401).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorBody {
    Structured {
        raw: StackString,
        errors: Vec<ApiErrorEntry>,
    },
    Unstructured {
        raw: StackString,
    },
}

impl ErrorBody {
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Structured { raw, .. } | Self::Unstructured { raw } => raw.as_str(),
        }
    }

    #[must_use]
    pub fn errors(&self) -> &[ApiErrorEntry] {
        match self {
            Self::Structured { errors, .. } => errors,
            Self::Unstructured { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub url: StackString,
    pub status: u16,
    pub body: ErrorBody,
}

impl RequestError {
    /// # Errors
    /// Returns `SerdeJsonError` if the body is not a structured error payload
    pub fn structured(url: &str, status: u16, raw: &str) -> Result<Self, HeartbeatError> {
        let parsed: ApiErrorResponse = serde_json::from_str(raw)?;
        Ok(Self {
            url: url.into(),
            status,
            body: ErrorBody::Structured {
                raw: raw.into(),
                errors: parsed.errors,
            },
        })
    }

    #[must_use]
    pub fn unstructured(url: &str, status: u16, raw: &str) -> Self {
        Self {
            url: url.into(),
            status,
            body: ErrorBody::Unstructured { raw: raw.into() },
        }
    }

    #[must_use]
    pub fn first_error(&self) -> Option<&ApiErrorEntry> {
        self.body.errors().first()
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.first_error() {
            Some(e) => write!(
                f,
                "failed to request: {} ({}): {}",
                self.url, e.error_type, e.message
            ),
            None => write!(f, "failed to request: {}", self.url),
        }
    }
}

impl std::error::Error for RequestError {}

#[derive(Error, Debug)]
pub enum HeartbeatError {
    #[error("LoadError {key}: {source}")]
    LoadError {
        key: StackString,
        source: Box<HeartbeatError>,
    },
    #[error("SaveError {key}: {source}")]
    SaveError {
        key: StackString,
        source: Box<HeartbeatError>,
    },
    #[error("RequestError {0}")]
    RequestError(Box<RequestError>),
    #[error("TransportError {0}")]
    TransportError(#[from] ReqwestError),
    #[error("ParseError {0}")]
    ParseError(StackString),
    #[error("SerdeJsonError {0}")]
    SerdeJsonError(#[from] SerdeJsonError),
    #[error("Cancelled {0}")]
    Cancelled(&'static str),
    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        source: Box<HeartbeatError>,
    },
    #[error("EnvyError {0}")]
    EnvyError(#[from] EnvyError),
    #[error("UrlParseError {0}")]
    UrlParseError(#[from] UrlParseError),
    #[error("InvalidHeaderValue {0}")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),
    #[error("TimeFormatError {0}")]
    TimeFormatError(#[from] TimeFormatError),
    #[error("AwsByteStreamError {0}")]
    AwsByteStreamError(#[from] AwsByteStreamError),
    #[error("AwsGetObjectError {0}")]
    AwsGetObjectError(Box<AwsGetObjectError>),
    #[error("AwsPutObjectError {0}")]
    AwsPutObjectError(Box<AwsPutObjectError>),
    #[error("io Error {0}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    StaticCustomError(&'static str),
    #[error("{0}")]
    CustomError(StackString),
}

impl HeartbeatError {
    pub fn load(key: impl Into<StackString>, source: impl Into<Self>) -> Self {
        Self::LoadError {
            key: key.into(),
            source: Box::new(source.into()),
        }
    }

    pub fn save(key: impl Into<StackString>, source: impl Into<Self>) -> Self {
        Self::SaveError {
            key: key.into(),
            source: Box::new(source.into()),
        }
    }

    #[must_use]
    pub fn context(self, context: &'static str) -> Self {
        Self::Context {
            context,
            source: Box::new(self),
        }
    }

    /// The underlying error with any `Context` layers stripped.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            e => e,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self.root() {
            Self::Cancelled(_) => true,
            Self::LoadError { source, .. } | Self::SaveError { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn request_error(&self) -> Option<&RequestError> {
        match self.root() {
            Self::RequestError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RequestError> for HeartbeatError {
    fn from(value: RequestError) -> Self {
        Self::RequestError(value.into())
    }
}

impl From<AwsGetObjectError> for HeartbeatError {
    fn from(value: AwsGetObjectError) -> Self {
        Self::AwsGetObjectError(value.into())
    }
}

impl From<AwsPutObjectError> for HeartbeatError {
    fn from(value: AwsPutObjectError) -> Self {
        Self::AwsPutObjectError(value.into())
    }
}
