// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use dd_trace::{configuration::SpanSamplingRuleConfig, Config};

use crate::{
    rate_limiter::RateLimiter,
    rate_sampler::RateSampler,
    span_matcher::{SpanMatcher, SpanView},
};

/// A single-span sampling rule with its own rate and optional per-rule
/// limiter.
#[derive(Debug, Clone)]
pub struct SpanSamplingRule {
    pub sample_rate: f64,
    pub max_per_second: Option<f64>,

    matcher: SpanMatcher,
    rate_sampler: RateSampler,
    limiter: Option<RateLimiter>,
}

impl SpanSamplingRule {
    pub fn new(
        sample_rate: f64,
        service: Option<String>,
        name: Option<String>,
        resource: Option<String>,
        tags: HashMap<String, String>,
        max_per_second: Option<f64>,
    ) -> Self {
        SpanSamplingRule {
            sample_rate,
            max_per_second,
            matcher: SpanMatcher::new(service, name, resource, tags),
            rate_sampler: RateSampler::new(sample_rate),
            limiter: max_per_second.map(|limit| RateLimiter::new(limit, None)),
        }
    }

    fn from_config(config: &SpanSamplingRuleConfig) -> Self {
        SpanSamplingRule::new(
            config.sample_rate,
            config.service.clone(),
            config.name.clone(),
            config.resource.clone(),
            config.tags.clone(),
            config.max_per_second,
        )
    }
}

/// What a kept span records about the rule that kept it.
///
/// Turned into the `_dd.span_sampling.*` tags, with mechanism 8.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanSamplingVerdict {
    pub rule_rate: f64,
    pub max_per_second: Option<f64>,
}

/// Single-span sampler, independent of the trace-level decision.
///
/// Spans kept here survive in the backend even when their trace is dropped.
#[derive(Debug, Clone, Default)]
pub struct SpanSampler {
    rules: Vec<SpanSamplingRule>,
}

impl SpanSampler {
    pub fn new(config: &Config) -> Self {
        SpanSampler {
            rules: config
                .span_sampling_rules()
                .iter()
                .map(SpanSamplingRule::from_config)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluates the ordered rules against one span.
    ///
    /// The keep draw hashes the span id, not the trace id, so each span of a
    /// trace rolls independently.
    pub fn sample(&self, span: &SpanView<'_>) -> Option<SpanSamplingVerdict> {
        let rule = self.rules.iter().find(|rule| rule.matcher.matches(span))?;

        if !rule.rate_sampler.sample(span.span_id) {
            return None;
        }

        if let Some(ref limiter) = rule.limiter {
            if !limiter.allow().allowed {
                return None;
            }
        }

        Some(SpanSamplingVerdict {
            rule_rate: rule.sample_rate,
            max_per_second: rule.max_per_second,
        })
    }
}
