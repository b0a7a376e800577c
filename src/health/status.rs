//! Expected status code matching for HTTP probes.
//!
//! Encoded as a single integer in config:
//! - `100..=599`: exact status code
//! - `1..=31`: class mask, bit `i` accepts any `(i+1)XX` code
//! - `0`: any status code

use std::fmt;

use serde::{Deserialize, Serialize};

/// Expected HTTP status of a health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum StatusCodeMatcher {
    #[default]
    Any,
    Exact(u16),
    Classes(u8),
}

impl StatusCodeMatcher {
    pub fn matches(&self, status: u16) -> bool {
        match *self {
            StatusCodeMatcher::Any => true,
            StatusCodeMatcher::Exact(code) => code == status,
            StatusCodeMatcher::Classes(mask) => {
                let class = status / 100;
                (1..=5).contains(&class) && mask & (1 << (class - 1)) != 0
            }
        }
    }
}

impl TryFrom<i32> for StatusCodeMatcher {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCodeMatcher::Any),
            1..=31 => Ok(StatusCodeMatcher::Classes(value as u8)),
            100..=599 => Ok(StatusCodeMatcher::Exact(value as u16)),
            _ => Err(format!(
                "status code {} should be 100~599 (normal) or 0~31 (special)",
                value
            )),
        }
    }
}

impl From<StatusCodeMatcher> for i32 {
    fn from(m: StatusCodeMatcher) -> Self {
        match m {
            StatusCodeMatcher::Any => 0,
            StatusCodeMatcher::Exact(code) => code as i32,
            StatusCodeMatcher::Classes(mask) => mask as i32,
        }
    }
}

impl fmt::Display for StatusCodeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StatusCodeMatcher::Any => write!(f, "ANY"),
            StatusCodeMatcher::Exact(code) => write!(f, "{}", code),
            StatusCodeMatcher::Classes(mask) => {
                for i in 0..5 {
                    if mask & (1 << i) != 0 {
                        write!(f, "{}XX", i + 1)?;
                    }
                }
                Ok(())
            }
        }
    }
}
