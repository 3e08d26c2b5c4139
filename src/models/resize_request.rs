//! Turns a request path into the size and object location it names.
//!
//! Paths look like `/{width}[x{height}]/{bucket}/{key...}`. The key keeps
//! any embedded slashes.

use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing some arguments, {path:?}")]
    MissingArguments { path: String },
    #[error("dimension `{0}` is out of range")]
    InvalidDimension(String),
    #[error("bucket segment is empty")]
    MissingBucket,
    #[error("object key is empty")]
    MissingKey,
}

/// A single resize job, built once from the inbound path.
///
/// `0` in either axis means unconstrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeRequest {
    pub width: u32,
    pub height: u32,
    pub bucket: String,
    pub key: String,
}

impl ResizeRequest {
    /// Parse a request path.
    ///
    /// The path is percent-decoded before it is split so that encoded
    /// characters in keys reach storage as the caller wrote them.
    pub fn from_path(raw_path: &str) -> Result<Self, ParseError> {
        let path = urlencoding::decode(raw_path).unwrap_or(Cow::Borrowed(raw_path));
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() <= 3 {
            return Err(ParseError::MissingArguments {
                path: path.into_owned(),
            });
        }

        let (width, height) = parse_dimensions(segments[1])?;

        let bucket = segments[2];
        if bucket.is_empty() {
            return Err(ParseError::MissingBucket);
        }
        let key = segments[3..].join("/");
        if key.is_empty() {
            return Err(ParseError::MissingKey);
        }

        Ok(Self {
            width,
            height,
            bucket: bucket.to_string(),
            key,
        })
    }
}

/// Read `W` or `WxH` from the size segment.
///
/// Anything that is not exactly that shape yields `(0, 0)`. A well-formed
/// number too large for `u32` is an error.
fn parse_dimensions(segment: &str) -> Result<(u32, u32), ParseError> {
    let (w, h) = match segment.split_once('x') {
        Some((w, h)) => (w, Some(h)),
        None => (segment, None),
    };

    if !is_digits(w) || !h.is_none_or(is_digits) {
        return Ok((0, 0));
    }

    let width = parse_axis(w)?;
    let height = match h {
        Some(h) => parse_axis(h)?,
        None => 0,
    };
    Ok((width, height))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_axis(digits: &str) -> Result<u32, ParseError> {
    digits
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidDimension(digits.to_string()))
}

/// Escape text for inclusion in an HTML document.
pub fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}
