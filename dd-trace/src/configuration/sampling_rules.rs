// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde::Deserialize;

use crate::{rate::Rate, Error, ErrorCode, Result};

/// One user trace-sampling rule, as configured in code or through
/// `DD_TRACE_SAMPLING_RULES`.
///
/// Patterns are shell-style globs; a missing field matches everything.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TraceSamplingRuleConfig {
    pub sample_rate: f64,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default = "default_provenance")]
    pub provenance: String,
}

fn default_provenance() -> String {
    "default".to_string()
}

/// One single-span sampling rule, as configured in code or through
/// `DD_SPAN_SAMPLING_RULES`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SpanSamplingRuleConfig {
    #[serde(default = "default_span_sample_rate")]
    pub sample_rate: f64,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub max_per_second: Option<f64>,
}

fn default_span_sample_rate() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct TraceSamplingRulesConfig {
    rules: Vec<TraceSamplingRuleConfig>,
}

pub(crate) fn parse_trace_sampling_rules(json: &str) -> Result<Vec<TraceSamplingRuleConfig>> {
    let config: TraceSamplingRulesConfig = serde_json::from_str(json).map_err(|e| {
        Error::new(
            ErrorCode::Other,
            format!("failed to parse trace sampling rules: {e}"),
        )
    })?;
    for rule in &config.rules {
        Rate::try_new(rule.sample_rate).map_err(|e| e.with_prefix("trace sampling rule"))?;
    }
    Ok(config.rules)
}

pub(crate) fn parse_span_sampling_rules(json: &str) -> Result<Vec<SpanSamplingRuleConfig>> {
    let rules: Vec<SpanSamplingRuleConfig> = serde_json::from_str(json).map_err(|e| {
        Error::new(
            ErrorCode::Other,
            format!("failed to parse span sampling rules: {e}"),
        )
    })?;
    for rule in &rules {
        Rate::try_new(rule.sample_rate).map_err(|e| e.with_prefix("span sampling rule"))?;
    }
    Ok(rules)
}
