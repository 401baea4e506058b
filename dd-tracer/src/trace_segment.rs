// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::HashMap,
    mem,
    sync::{Arc, Mutex},
    time::Duration,
};

use dd_trace::{
    constants, dd_warn,
    sampling::{mechanism, SamplingMechanism, SamplingPriority},
    TimePoint,
};
use dd_trace_propagation::{
    carrier::Injector,
    context::{Sampling, SpanContext, SpanLink, Tracestate, DATADOG_PROPAGATION_TAG_PREFIX},
    Propagator,
};
use dd_trace_sampling::SpanView;

use crate::{
    span::{Span, SpanConfig, SpanData},
    tracer::Components,
};

/// The segment-level sampling decision, as realized at finalization or forced
/// by injection / manual override.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SegmentDecision {
    pub priority: SamplingPriority,
    pub mechanism: Option<SamplingMechanism>,
    pub rule_rate: Option<f64>,
    pub agent_rate: Option<f64>,
    pub limiter_rate: Option<f64>,
}

/// The in-process portion of one distributed trace.
///
/// Owns every `SpanData` slot; live [`Span`] handles refer into it. The
/// segment finalizes exactly once, when its local root has finished and no
/// span remains open, and is then handed to the collector.
pub struct TraceSegment {
    components: Arc<Components>,
    trace_id: u128,
    shared: Mutex<SegmentState>,
}

struct SegmentState {
    spans: Vec<SpanData>,
    finish_order: Vec<usize>,
    num_open: usize,
    num_finished: usize,
    root_index: usize,
    root_finished: bool,
    decision: Option<SegmentDecision>,
    origin: Option<String>,
    tags_to_propagate: HashMap<String, String>,
    extracted_tracestate: Option<Tracestate>,
    links: Vec<SpanLink>,
    sent: bool,
}

impl SegmentState {
    fn empty() -> Self {
        SegmentState {
            spans: Vec::new(),
            finish_order: Vec::new(),
            num_open: 0,
            num_finished: 0,
            root_index: 0,
            root_finished: false,
            decision: None,
            origin: None,
            tags_to_propagate: HashMap::new(),
            extracted_tracestate: None,
            links: Vec::new(),
            sent: false,
        }
    }
}

impl TraceSegment {
    /// A segment for a trace that starts in this process.
    pub(crate) fn new_local(components: Arc<Components>, trace_id: u128) -> Arc<Self> {
        Arc::new(TraceSegment {
            components,
            trace_id,
            shared: Mutex::new(SegmentState::empty()),
        })
    }

    /// A segment continuing a trace extracted from a carrier.
    pub(crate) fn new_extracted(components: Arc<Components>, context: &SpanContext) -> Arc<Self> {
        let mut state = SegmentState::empty();

        state.origin = context.origin.clone();
        state.tags_to_propagate = context
            .tags
            .iter()
            .filter(|(key, _)| key.starts_with(DATADOG_PROPAGATION_TAG_PREFIX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        state.extracted_tracestate = context.tracestate.clone();
        state.links = context.links.clone();
        state.decision = context.sampling.priority.map(|priority| SegmentDecision {
            priority,
            mechanism: context.sampling.mechanism,
            rule_rate: None,
            agent_rate: None,
            limiter_rate: None,
        });

        Arc::new(TraceSegment {
            components,
            trace_id: context.trace_id,
            shared: Mutex::new(state),
        })
    }

    pub fn trace_id(&self) -> u128 {
        self.trace_id
    }

    pub(crate) fn now(&self) -> TimePoint {
        (self.components.clock)()
    }

    /// Creates a span slot and the handle owning it. The first span of the
    /// segment becomes the local root.
    pub(crate) fn start_span(self: &Arc<Self>, config: SpanConfig, parent_id: u64) -> Span {
        let now = self.now();
        let defaults = &self.components.defaults;

        let name = config.name.unwrap_or_default();
        let resource = config.resource.unwrap_or_else(|| name.clone());
        let mut tags: HashMap<String, String> = defaults
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        tags.extend(config.tags);

        let data = SpanData {
            service: config.service.unwrap_or_else(|| defaults.service.clone()),
            service_type: config
                .service_type
                .unwrap_or_else(|| defaults.service_type.clone()),
            environment: config
                .environment
                .or_else(|| defaults.environment.clone()),
            version: config.version.or_else(|| defaults.version.clone()),
            name,
            resource,
            span_type: config.span_type,
            trace_id: self.trace_id,
            span_id: self.components.generator.span_id(),
            parent_id,
            start: config.start.unwrap_or(now.wall),
            duration: Duration::ZERO,
            tags,
            numeric_tags: HashMap::new(),
            error: false,
        };
        let span_id = data.span_id;

        let mut state = self.shared.lock().unwrap();
        if state.sent {
            dd_warn!("TraceSegment.start_span: span created on an already delivered segment");
        }
        let index = state.spans.len();
        state.spans.push(data);
        state.num_open += 1;
        drop(state);

        Span::new(self.clone(), index, self.trace_id, span_id, now.tick)
    }

    pub(crate) fn with_span_mut<T>(
        &self,
        index: usize,
        f: impl FnOnce(&mut SpanData) -> T,
    ) -> Option<T> {
        let mut state = self.shared.lock().unwrap();
        state.spans.get_mut(index).map(f)
    }

    pub(crate) fn with_span<T>(&self, index: usize, f: impl FnOnce(&SpanData) -> T) -> Option<T> {
        let state = self.shared.lock().unwrap();
        state.spans.get(index).map(f)
    }

    /// Commits a finished span. When this was the last open span and the
    /// local root is done, the segment finalizes and moves to the collector.
    pub(crate) fn finish_span(&self, index: usize, duration: Duration) {
        let trace = {
            let mut state = self.shared.lock().unwrap();
            if let Some(span) = state.spans.get_mut(index) {
                span.duration = duration;
            }
            state.finish_order.push(index);
            state.num_finished += 1;
            state.num_open = state.num_open.saturating_sub(1);
            if index == state.root_index {
                state.root_finished = true;
            }

            if state.root_finished && state.num_open == 0 && !state.sent {
                state.sent = true;
                Some(self.finalize(&mut state))
            } else {
                None
            }
        };

        if let Some(trace) = trace {
            self.components.collector.send(trace);
        }
    }

    /// Replaces the sampling decision with a manual one. No effect once the
    /// segment has been delivered.
    pub fn override_sampling_priority(&self, priority: SamplingPriority) {
        let mut state = self.shared.lock().unwrap();
        if state.sent {
            dd_warn!(
                "TraceSegment.override_sampling_priority: segment already delivered, ignoring"
            );
            return;
        }
        state.decision = Some(SegmentDecision {
            priority,
            mechanism: Some(mechanism::MANUAL),
            rule_rate: None,
            agent_rate: None,
            limiter_rate: None,
        });
    }

    /// Writes the context of `span_id` into the carrier with every configured
    /// injection style. Forces a sampling decision so the downstream service
    /// sees a priority.
    pub(crate) fn inject(&self, span_id: u64, carrier: &mut dyn Injector) {
        let (decision, tags, origin, tracestate) = {
            let mut state = self.shared.lock().unwrap();
            let decision = self.decision_for(&state);
            state.decision = Some(decision);

            let mut tags = state.tags_to_propagate.clone();
            if let Some(mechanism) = decision.mechanism {
                tags.insert(
                    constants::SAMPLING_DECISION_MAKER_TAG_KEY.to_string(),
                    mechanism.to_cow().into_owned(),
                );
            }
            (
                decision,
                tags,
                state.origin.clone(),
                state.extracted_tracestate.clone(),
            )
        };

        let mut context = SpanContext {
            trace_id: self.trace_id,
            span_id,
            sampling: Sampling {
                priority: Some(decision.priority),
                mechanism: decision.mechanism,
            },
            origin,
            tags,
            links: Vec::new(),
            is_remote: false,
            tracestate,
        };

        self.components
            .propagator
            .inject(&mut context, carrier, &self.components.config);
    }

    /// The current decision, computing one from the trace sampler when the
    /// segment doesn't have one yet.
    fn decision_for(&self, state: &SegmentState) -> SegmentDecision {
        if let Some(decision) = state.decision {
            return decision;
        }

        let root = &state.spans[state.root_index];
        let view = SpanView {
            trace_id_low: root.trace_id as u64,
            span_id: root.span_id,
            service: &root.service,
            env: root.environment.as_deref(),
            name: &root.name,
            resource: &root.resource,
            tags: &root.tags,
        };
        let decision = self.components.trace_sampler.decide(&view);
        SegmentDecision {
            priority: decision.priority,
            mechanism: Some(decision.mechanism),
            rule_rate: decision.rule_rate,
            agent_rate: decision.agent_rate,
            limiter_rate: decision.limiter_rate,
        }
    }

    /// Realizes the sampling decision, stamps the sampling and segment tags
    /// onto the spans, and returns them in finish order.
    fn finalize(&self, state: &mut SegmentState) -> Vec<SpanData> {
        debug_assert_eq!(state.num_finished, state.spans.len());
        debug_assert_eq!(state.num_finished, state.finish_order.len());

        let decision = self.decision_for(state);
        state.decision = Some(decision);

        let higher_bits = (self.trace_id >> 64) as u64;
        if higher_bits != 0 {
            state.tags_to_propagate.insert(
                constants::HIGHER_ORDER_TRACE_ID_BITS_TAG.to_string(),
                format!("{higher_bits:016x}"),
            );
        }
        if let Some(mechanism) = decision.mechanism {
            state.tags_to_propagate.insert(
                constants::SAMPLING_DECISION_MAKER_TAG_KEY.to_string(),
                mechanism.to_cow().into_owned(),
            );
        }

        // Single-span sampling, independent of the trace decision
        let span_sampler = &self.components.span_sampler;
        let verdicts: Vec<_> = if span_sampler.is_empty() {
            Vec::new()
        } else {
            state
                .spans
                .iter()
                .map(|span| {
                    span_sampler.sample(&SpanView {
                        trace_id_low: span.trace_id as u64,
                        span_id: span.span_id,
                        service: &span.service,
                        env: span.environment.as_deref(),
                        name: &span.name,
                        resource: &span.resource,
                        tags: &span.tags,
                    })
                })
                .collect()
        };
        for (span, verdict) in state.spans.iter_mut().zip(verdicts) {
            let Some(verdict) = verdict else { continue };
            span.numeric_tags.insert(
                constants::SPAN_SAMPLING_MECHANISM_TAG_KEY.to_string(),
                f64::from(mechanism::SPAN_SAMPLING_RULE.into_u8()),
            );
            span.numeric_tags.insert(
                constants::SPAN_SAMPLING_RULE_RATE_TAG_KEY.to_string(),
                verdict.rule_rate,
            );
            if let Some(max_per_second) = verdict.max_per_second {
                span.numeric_tags.insert(
                    constants::SPAN_SAMPLING_MAX_PER_SECOND_TAG_KEY.to_string(),
                    max_per_second,
                );
            }
        }

        if let Some(origin) = &state.origin {
            for span in &mut state.spans {
                span.tags
                    .insert(constants::ORIGIN_TAG_KEY.to_string(), origin.clone());
            }
        }

        let links_json = links_to_json(&state.links);
        let config = &self.components.config;
        let root_index = state.root_index;
        if let Some(root) = state.spans.get_mut(root_index) {
            root.numeric_tags.insert(
                constants::SAMPLING_PRIORITY_TAG_KEY.to_string(),
                f64::from(decision.priority.into_i8()),
            );
            if let Some(rate) = decision.rule_rate {
                root.numeric_tags
                    .insert(constants::SAMPLING_RULE_RATE_TAG_KEY.to_string(), rate);
            }
            if let Some(rate) = decision.agent_rate {
                root.numeric_tags
                    .insert(constants::SAMPLING_AGENT_RATE_TAG_KEY.to_string(), rate);
            }
            if let Some(rate) = decision.limiter_rate {
                root.numeric_tags
                    .insert(constants::SAMPLING_LIMIT_RATE_TAG_KEY.to_string(), rate);
            }
            for (key, value) in &state.tags_to_propagate {
                root.tags.insert(key.clone(), value.clone());
            }
            if config.report_hostname() {
                if let Some(hostname) = config.hostname() {
                    root.tags.insert(
                        constants::HOSTNAME_TAG_KEY.to_string(),
                        hostname.to_string(),
                    );
                }
            }
            if let Some(links_json) = links_json {
                root.tags.insert("_dd.span_links".to_string(), links_json);
            }
        }

        // Serialize in finish order
        let mut slots: Vec<Option<SpanData>> = mem::take(&mut state.spans)
            .into_iter()
            .map(Some)
            .collect();
        state
            .finish_order
            .iter()
            .filter_map(|&index| slots.get_mut(index).and_then(Option::take))
            .collect()
    }
}

fn links_to_json(links: &[SpanLink]) -> Option<String> {
    if links.is_empty() {
        return None;
    }

    let values: Vec<serde_json::Value> = links
        .iter()
        .map(|link| {
            let trace_id = match link.trace_id_high {
                Some(high) => format!("{high:016x}{:016x}", link.trace_id),
                None => format!("{:032x}", link.trace_id),
            };
            let mut value = serde_json::json!({
                "trace_id": trace_id,
                "span_id": format!("{:016x}", link.span_id),
            });
            if let Some(flags) = link.flags {
                value["flags"] = serde_json::json!(flags);
            }
            if let Some(tracestate) = &link.tracestate {
                value["tracestate"] = serde_json::json!(tracestate);
            }
            if let Some(attributes) = &link.attributes {
                value["attributes"] = serde_json::json!(attributes);
            }
            value
        })
        .collect();

    Some(serde_json::Value::Array(values).to_string())
}
