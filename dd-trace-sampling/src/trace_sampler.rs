// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use dd_trace::{
    configuration::TraceSamplingRuleConfig,
    sampling::{mechanism, priority, SamplingMechanism, SamplingPriority},
    Config,
};

use crate::{
    rate_limiter::RateLimiter,
    rate_sampler::RateSampler,
    service_rates::{service_rate_key, ServicesSampler},
    span_matcher::{SpanMatcher, SpanView},
};

/// A user sampling rule: a span predicate plus the rate to apply when it
/// matches.
#[derive(Debug, Clone)]
pub struct SamplingRule {
    pub sample_rate: f64,

    /// Where this rule comes from (customer, dynamic, default)
    pub provenance: String,

    matcher: SpanMatcher,

    rate_sampler: RateSampler,
}

impl SamplingRule {
    pub fn new(
        sample_rate: f64,
        service: Option<String>,
        name: Option<String>,
        resource: Option<String>,
        tags: HashMap<String, String>,
        provenance: String,
    ) -> Self {
        SamplingRule {
            sample_rate,
            provenance,
            matcher: SpanMatcher::new(service, name, resource, tags),
            rate_sampler: RateSampler::new(sample_rate),
        }
    }

    fn from_config(config: &TraceSamplingRuleConfig) -> Self {
        SamplingRule::new(
            config.sample_rate,
            config.service.clone(),
            config.name.clone(),
            config.resource.clone(),
            config.tags.clone(),
            config.provenance.clone(),
        )
    }

    pub fn matches(&self, span: &SpanView<'_>) -> bool {
        self.matcher.matches(span)
    }

    pub fn sample(&self, trace_id_low: u64) -> bool {
        self.rate_sampler.sample(trace_id_low)
    }

    fn mechanism(&self) -> SamplingMechanism {
        match self.provenance.as_str() {
            "customer" => mechanism::REMOTE_USER_TRACE_SAMPLING_RULE,
            "dynamic" => mechanism::REMOTE_DYNAMIC_TRACE_SAMPLING_RULE,
            _ => mechanism::LOCAL_USER_TRACE_SAMPLING_RULE,
        }
    }
}

/// The outcome of the trace-level sampling algorithm for one local root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSamplingDecision {
    pub priority: SamplingPriority,
    pub mechanism: SamplingMechanism,
    /// The matched rule's rate, reported as `_dd.rule_psr`
    pub rule_rate: Option<f64>,
    /// The agent-pushed rate, reported as `_dd.agent_psr`
    pub agent_rate: Option<f64>,
    /// The limiter's effective rate when it was consulted, reported as
    /// `_dd.limit_psr`
    pub limiter_rate: Option<f64>,
}

/// Trace-level sampler: ordered user rules, then agent-pushed per-service
/// rates, then the configured default rate, gated by a global token bucket.
#[derive(Debug, Clone)]
pub struct TraceSampler {
    rules: Vec<SamplingRule>,
    default_sampler: Option<RateSampler>,
    service_rates: ServicesSampler,
    limiter: RateLimiter,
}

impl TraceSampler {
    pub fn new(config: &Config) -> Self {
        let rules = config
            .trace_sampling_rules()
            .iter()
            .map(SamplingRule::from_config)
            .collect();

        TraceSampler {
            rules,
            default_sampler: config
                .trace_sample_rate()
                .map(|rate| RateSampler::new(rate.value())),
            service_rates: ServicesSampler::default(),
            limiter: RateLimiter::new(config.trace_rate_limit(), None),
        }
    }

    /// Runs the local sampling algorithm for a root span.
    ///
    /// Contexts that already carry a priority (extracted or manually
    /// overridden) never reach this method; the segment honors them directly.
    pub fn decide(&self, span: &SpanView<'_>) -> TraceSamplingDecision {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(span)) {
            let keep = rule.sample(span.trace_id_low);
            return self.gate(keep, rule.mechanism(), Some(rule.sample_rate), None);
        }

        let key = service_rate_key(span.service, span.env);
        if let Some(sampler) = self.service_rates.get(&key) {
            let keep = sampler.sample(span.trace_id_low);
            return self.gate(
                keep,
                mechanism::AGENT_RATE_BY_SERVICE,
                None,
                Some(sampler.sample_rate()),
            );
        }

        match &self.default_sampler {
            Some(sampler) => {
                let keep = sampler.sample(span.trace_id_low);
                self.gate(keep, mechanism::DEFAULT, None, None)
            }
            // Nothing configured and nothing learned from the agent yet:
            // keep everything and let the agent rates take over
            None => self.gate(true, mechanism::DEFAULT, None, None),
        }
    }

    /// Applies the global limiter to a keep decision.
    ///
    /// Automatic decisions always land on the AUTO pair, whatever made them;
    /// the USER priorities are reserved for extracted contexts and manual
    /// overrides. A limiter veto downgrades to `AUTO_REJECT` but reports the
    /// original mechanism, so the backend can still see why the trace was
    /// considered.
    fn gate(
        &self,
        keep: bool,
        mechanism: SamplingMechanism,
        rule_rate: Option<f64>,
        agent_rate: Option<f64>,
    ) -> TraceSamplingDecision {
        if !keep {
            return TraceSamplingDecision {
                priority: priority::AUTO_REJECT,
                mechanism,
                rule_rate,
                agent_rate,
                limiter_rate: None,
            };
        }

        let allowed = self.limiter.allow();
        let priority = if allowed.allowed {
            priority::AUTO_KEEP
        } else {
            priority::AUTO_REJECT
        };

        TraceSamplingDecision {
            priority,
            mechanism,
            rule_rate,
            agent_rate,
            limiter_rate: Some(allowed.effective_rate),
        }
    }

    /// Atomically replaces the agent rate table.
    pub fn update_agent_rates<I: IntoIterator<Item = (String, f64)>>(&self, rates: I) {
        self.service_rates.update_rates(rates);
    }

    /// Share of keep decisions the limiter let through recently.
    pub fn limiter_effective_rate(&self) -> f64 {
        self.limiter.effective_rate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use dd_trace::{
        configuration::TraceSamplingRuleConfig,
        sampling::{mechanism, priority},
        Config, Rate,
    };

    use super::{SpanView, TraceSampler};

    fn span<'a>(service: &'a str, name: &'a str, tags: &'a HashMap<String, String>) -> SpanView<'a> {
        SpanView {
            trace_id_low: 0, // hashes to 0, kept by any nonzero rate
            span_id: 1,
            service,
            env: Some("prod"),
            name,
            resource: name,
            tags,
        }
    }

    fn rule(service: &str, name: &str, sample_rate: f64) -> TraceSamplingRuleConfig {
        TraceSamplingRuleConfig {
            sample_rate,
            service: Some(service.to_string()),
            name: Some(name.to_string()),
            resource: None,
            tags: HashMap::new(),
            provenance: "default".to_string(),
        }
    }

    fn config(f: impl FnOnce(&mut dd_trace::configuration::ConfigBuilder)) -> Config {
        let mut builder = Config::builder();
        builder.set_service("svc".to_string());
        f(&mut builder);
        builder.build().unwrap()
    }

    #[test]
    fn test_rule_match_keeps() {
        let sampler = TraceSampler::new(&config(|b| {
            b.set_trace_sampling_rules(vec![rule("svc", "db.*", 1.0)]);
        }));

        let tags = HashMap::new();
        let decision = sampler.decide(&span("svc", "db.query", &tags));

        assert_eq!(decision.priority, priority::AUTO_KEEP);
        assert_eq!(decision.mechanism, mechanism::LOCAL_USER_TRACE_SAMPLING_RULE);
        assert_eq!(decision.rule_rate, Some(1.0));
        assert_eq!(decision.agent_rate, None);
    }

    #[test]
    fn test_rule_with_zero_rate_drops() {
        let sampler = TraceSampler::new(&config(|b| {
            b.set_trace_sampling_rules(vec![rule("svc", "db.*", 0.0)]);
        }));

        let tags = HashMap::new();
        let decision = sampler.decide(&span("svc", "db.query", &tags));

        assert_eq!(decision.priority, priority::AUTO_REJECT);
        assert_eq!(decision.mechanism, mechanism::LOCAL_USER_TRACE_SAMPLING_RULE);
        assert_eq!(decision.rule_rate, Some(0.0));
        assert_eq!(decision.limiter_rate, None);
    }

    #[test]
    fn test_rules_apply_in_order() {
        let sampler = TraceSampler::new(&config(|b| {
            b.set_trace_sampling_rules(vec![rule("svc", "db.*", 0.0), rule("svc", "*", 1.0)]);
        }));

        let tags = HashMap::new();
        assert_eq!(
            sampler.decide(&span("svc", "db.query", &tags)).priority,
            priority::AUTO_REJECT
        );
        assert_eq!(
            sampler.decide(&span("svc", "http.request", &tags)).priority,
            priority::AUTO_KEEP
        );
    }

    #[test]
    fn test_agent_rates_apply_when_no_rule_matches() {
        let sampler = TraceSampler::new(&config(|_| {}));
        sampler.update_agent_rates([("service:svc,env:prod".to_string(), 0.0)]);

        let tags = HashMap::new();
        let decision = sampler.decide(&span("svc", "op", &tags));

        assert_eq!(decision.priority, priority::AUTO_REJECT);
        assert_eq!(decision.mechanism, mechanism::AGENT_RATE_BY_SERVICE);
        assert_eq!(decision.agent_rate, Some(0.0));

        // other services fall back to the default
        let decision = sampler.decide(&span("other", "op", &tags));
        assert_eq!(decision.priority, priority::AUTO_KEEP);
        assert_eq!(decision.mechanism, mechanism::DEFAULT);
    }

    #[test]
    fn test_agent_rate_table_replacement() {
        let sampler = TraceSampler::new(&config(|_| {}));
        sampler.update_agent_rates([("service:svc,env:prod".to_string(), 0.0)]);
        sampler.update_agent_rates([("service:unrelated,env:".to_string(), 0.0)]);

        let tags = HashMap::new();
        let decision = sampler.decide(&span("svc", "op", &tags));
        assert_eq!(decision.mechanism, mechanism::DEFAULT);
    }

    #[test]
    fn test_default_rate_keeps_with_auto_priority() {
        let sampler = TraceSampler::new(&config(|b| {
            b.set_trace_sample_rate(Rate::try_new(1.0).unwrap());
        }));

        let tags = HashMap::new();
        let decision = sampler.decide(&span("svc", "op", &tags));

        assert_eq!(decision.priority, priority::AUTO_KEEP);
        assert_eq!(decision.mechanism, mechanism::DEFAULT);
        assert_eq!(decision.rule_rate, None);
        assert!(decision.limiter_rate.is_some());
    }

    #[test]
    fn test_limiter_downgrades_to_auto_reject() {
        let sampler = TraceSampler::new(&config(|b| {
            b.set_trace_sampling_rules(vec![rule("svc", "db.*", 1.0)]);
            b.set_trace_rate_limit(1.0);
        }));

        let tags = HashMap::new();
        let first = sampler.decide(&span("svc", "db.query", &tags));
        assert_eq!(first.priority, priority::AUTO_KEEP);

        let second = sampler.decide(&span("svc", "db.query", &tags));
        assert_eq!(second.priority, priority::AUTO_REJECT);
        // mechanism reports the rule even though the limiter vetoed
        assert_eq!(second.mechanism, mechanism::LOCAL_USER_TRACE_SAMPLING_RULE);
        assert_eq!(second.rule_rate, Some(1.0));
        assert!(second.limiter_rate.is_some());
    }

    #[test]
    fn test_decision_is_deterministic_for_a_trace_id() {
        let sampler = TraceSampler::new(&config(|b| {
            b.set_trace_sample_rate(Rate::try_new(0.5).unwrap());
        }));

        let tags = HashMap::new();
        let mut view = span("svc", "op", &tags);
        view.trace_id_low = 0xdead_beef_cafe_f00d;

        let first = sampler.decide(&view).priority;
        for _ in 0..8 {
            assert_eq!(sampler.decide(&view).priority, first);
        }
    }
}
