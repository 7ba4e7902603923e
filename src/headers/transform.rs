//! Ordered header transforms.
//!
//! Config carries plain strings; they are parsed into typed header names and
//! values once, at load time, so applying a pipeline never fails.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::schema::HeaderTransformConfig;

/// Why a configured transform was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("invalid header name '{0}'")]
    InvalidName(String),

    #[error("invalid value for header '{0}'")]
    InvalidValue(String),

    #[error("header '{0}' is managed by the proxy and cannot be transformed")]
    ProtectedHeader(String),
}

/// One step of a header pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderTransform {
    /// Drop every value of the header.
    Remove(HeaderName),
    /// Replace all values of the header with one value.
    Set(HeaderName, HeaderValue),
    /// Copy every value of `from` into `to`, unless `to` already exists.
    CopyUnlessPresent { from: HeaderName, to: HeaderName },
}

impl HeaderTransform {
    pub fn apply(&self, headers: &mut HeaderMap) {
        match self {
            HeaderTransform::Remove(name) => {
                headers.remove(name);
            }
            HeaderTransform::Set(name, value) => {
                headers.insert(name.clone(), value.clone());
            }
            HeaderTransform::CopyUnlessPresent { from, to } => {
                if headers.contains_key(to) {
                    return;
                }
                let values: Vec<HeaderValue> = headers.get_all(from).iter().cloned().collect();
                for value in values {
                    headers.append(to.clone(), value);
                }
            }
        }
    }
}

/// Apply `transforms` in order.
pub fn apply_all(transforms: &[HeaderTransform], headers: &mut HeaderMap) {
    for transform in transforms {
        transform.apply(headers);
    }
}

fn parse_name(raw: &str) -> Result<HeaderName, TransformError> {
    let name = HeaderName::from_bytes(raw.trim().as_bytes())
        .map_err(|_| TransformError::InvalidName(raw.to_string()))?;
    // Host is always the origin authority; Connection framing belongs to hyper.
    if name == header::HOST || name == header::CONNECTION {
        return Err(TransformError::ProtectedHeader(name.to_string()));
    }
    Ok(name)
}

impl TryFrom<&HeaderTransformConfig> for HeaderTransform {
    type Error = TransformError;

    fn try_from(config: &HeaderTransformConfig) -> Result<Self, Self::Error> {
        match config {
            HeaderTransformConfig::Remove { name } => Ok(HeaderTransform::Remove(parse_name(name)?)),
            HeaderTransformConfig::Set { name, value } => {
                let name = parse_name(name)?;
                let value = HeaderValue::from_str(value)
                    .map_err(|_| TransformError::InvalidValue(name.to_string()))?;
                Ok(HeaderTransform::Set(name, value))
            }
            HeaderTransformConfig::CopyUnlessPresent { from, to } => {
                Ok(HeaderTransform::CopyUnlessPresent {
                    from: parse_name(from)?,
                    to: parse_name(to)?,
                })
            }
        }
    }
}

/// Parse a configured list, stopping at the first bad entry.
pub fn parse_all(configs: &[HeaderTransformConfig]) -> Result<Vec<HeaderTransform>, TransformError> {
    configs.iter().map(HeaderTransform::try_from).collect()
}
