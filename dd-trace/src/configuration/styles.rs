// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, str::FromStr};

/// A context propagation header style.
///
/// `B3` is the single-header variant; `B3Multi` the `x-b3-*` header set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TracePropagationStyle {
    Datadog,
    TraceContext,
    B3,
    B3Multi,
    None,
}

impl FromStr for TracePropagationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "datadog" => Ok(TracePropagationStyle::Datadog),
            "tracecontext" => Ok(TracePropagationStyle::TraceContext),
            "b3" | "b3 single header" => Ok(TracePropagationStyle::B3),
            "b3multi" => Ok(TracePropagationStyle::B3Multi),
            "none" => Ok(TracePropagationStyle::None),
            _ => Err(format!("unknown propagation style: {s:?}")),
        }
    }
}

impl fmt::Display for TracePropagationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let style = match self {
            TracePropagationStyle::Datadog => "datadog",
            TracePropagationStyle::TraceContext => "tracecontext",
            TracePropagationStyle::B3 => "b3",
            TracePropagationStyle::B3Multi => "b3multi",
            TracePropagationStyle::None => "none",
        };

        write!(f, "{style}")
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::TracePropagationStyle;

    #[test]
    fn test_style_round_trip() {
        for style in [
            TracePropagationStyle::Datadog,
            TracePropagationStyle::TraceContext,
            TracePropagationStyle::B3,
            TracePropagationStyle::B3Multi,
            TracePropagationStyle::None,
        ] {
            let parsed = TracePropagationStyle::from_str(&style.to_string()).unwrap();
            assert_eq!(parsed, style);
        }
    }

    #[test]
    fn test_style_parse_is_case_insensitive() {
        assert_eq!(
            TracePropagationStyle::from_str(" TraceContext ").unwrap(),
            TracePropagationStyle::TraceContext
        );
        assert!(TracePropagationStyle::from_str("w3c-ish").is_err());
    }
}
