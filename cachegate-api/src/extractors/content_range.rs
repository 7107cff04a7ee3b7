//! `Content-Range` header extractor for part uploads.

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::CONTENT_RANGE, request::Parts},
};
use once_cell::sync::Lazy;
use regex::Regex;

static CONTENT_RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<unit>\w+) ((?P<start>\d+)-(?P<end>\d+)|\*)/((?P<size>\d+)|\*)")
        .expect("Invalid Content-Range regex")
});

/// Parsed `Content-Range: <unit> <start>-<end>/<size|*>` header.
///
/// Only concrete ranges are accepted; `*` ranges are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRange {
    pub unit: String,
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    pub size: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Result<Self, ApiError> {
        let invalid = || ApiError::invalid_format("Content-Range", "'<unit> <start>-<end>/<size|*>'");

        let captures = CONTENT_RANGE_PATTERN.captures(value).ok_or_else(invalid)?;

        let number = |name: &str| -> Result<Option<u64>, ApiError> {
            captures
                .name(name)
                .map(|m| m.as_str().parse::<u64>().map_err(|_| invalid()))
                .transpose()
        };

        let start = number("start")?.ok_or_else(invalid)?;
        let end = number("end")?.ok_or_else(invalid)?;
        let size = number("size")?;

        Ok(Self {
            unit: captures
                .name("unit")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            start,
            end,
            size,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ContentRange
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CONTENT_RANGE)
            .ok_or_else(|| ApiError::missing_field("Content-Range"))?
            .to_str()
            .map_err(|_| ApiError::invalid_format("Content-Range", "ASCII header value"))?;

        ContentRange::parse(value)
    }
}
