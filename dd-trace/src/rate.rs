// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, str::FromStr};

use crate::{Error, ErrorCode, Result};

/// A sampling probability validated to lie within `[0.0, 1.0]`.
///
/// Configuration paths construct rates through [`Rate::try_new`] so an
/// out-of-range value fails finalization instead of silently clamping.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Rate(f64);

impl Rate {
    pub fn try_new(value: f64) -> Result<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Rate(value))
        } else {
            Err(Error::new(
                ErrorCode::RateOutOfRange,
                format!("rate must be within [0, 1], got {value}"),
            ))
        }
    }

    pub const fn one() -> Self {
        Rate(1.0)
    }

    pub const fn zero() -> Self {
        Rate(0.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Rate {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Rate::try_new(value)
    }
}

impl FromStr for Rate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.parse::<f64>().map_err(|_| {
            Error::new(
                ErrorCode::RateOutOfRange,
                format!("rate is not a number: {s:?}"),
            )
        })?;
        Rate::try_new(value)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
