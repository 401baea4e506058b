// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use dd_trace::{constants, sampling::SamplingPriority, Config};
use dd_trace_propagation::carrier::Injector;

use crate::trace_segment::TraceSegment;

/// One finished or in-progress unit of work, as shipped to the agent.
///
/// Mutated only through its owning [`Span`] before finish; read-only after.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanData {
    pub service: String,
    pub service_type: String,
    pub environment: Option<String>,
    pub version: Option<String>,

    /// The operation name
    pub name: String,
    /// The resource, defaults to the operation name
    pub resource: String,
    pub span_type: Option<String>,

    pub trace_id: u128,
    pub span_id: u64,
    /// 0 marks the local root
    pub parent_id: u64,

    pub start: SystemTime,
    pub duration: Duration,

    pub tags: HashMap<String, String>,
    pub numeric_tags: HashMap<String, f64>,
    pub error: bool,
}

impl Default for SpanData {
    fn default() -> Self {
        SpanData {
            service: String::new(),
            service_type: String::new(),
            environment: None,
            version: None,
            name: String::new(),
            resource: String::new(),
            span_type: None,
            trace_id: 0,
            span_id: 0,
            parent_id: 0,
            start: UNIX_EPOCH,
            duration: Duration::ZERO,
            tags: HashMap::new(),
            numeric_tags: HashMap::new(),
            error: false,
        }
    }
}

/// Per-span overrides applied at creation time.
#[derive(Debug, Clone, Default)]
pub struct SpanConfig {
    pub name: Option<String>,
    pub service: Option<String>,
    pub service_type: Option<String>,
    pub resource: Option<String>,
    pub span_type: Option<String>,
    pub environment: Option<String>,
    pub version: Option<String>,
    pub start: Option<SystemTime>,
    pub tags: HashMap<String, String>,
}

impl SpanConfig {
    pub fn with_name(name: impl Into<String>) -> Self {
        SpanConfig {
            name: Some(name.into()),
            ..SpanConfig::default()
        }
    }
}

/// The values spans start from when their `SpanConfig` doesn't say otherwise,
/// snapshotted from the finalized `Config` when the tracer is built.
#[derive(Debug, Clone)]
pub struct SpanDefaults {
    pub service: String,
    pub service_type: String,
    pub environment: Option<String>,
    pub version: Option<String>,
    pub tags: Vec<(String, String)>,
}

impl SpanDefaults {
    pub fn from_config(config: &Config) -> Self {
        SpanDefaults {
            service: config.service().to_string(),
            service_type: "web".to_string(),
            environment: config.env().map(str::to_string),
            version: config.version().map(str::to_string),
            tags: config
                .global_tags()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Exclusive handle to one span slot inside a trace segment.
///
/// Finish happens exactly once: explicitly through [`Span::finish`] (or
/// [`Span::finish_with_duration`]), or on drop. Setters are no-ops once the
/// span has finished.
pub struct Span {
    segment: Arc<TraceSegment>,
    index: usize,
    trace_id: u128,
    span_id: u64,
    start_tick: Instant,
    finished: bool,
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("index", &self.index)
            .field("trace_id", &self.trace_id)
            .field("span_id", &self.span_id)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Span {
    pub(crate) fn new(
        segment: Arc<TraceSegment>,
        index: usize,
        trace_id: u128,
        span_id: u64,
        start_tick: Instant,
    ) -> Self {
        Span {
            segment,
            index,
            trace_id,
            span_id,
            start_tick,
            finished: false,
        }
    }

    pub fn trace_id(&self) -> u128 {
        self.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    pub fn parent_id(&self) -> u64 {
        self.with_data(|data| data.parent_id).unwrap_or(0)
    }

    /// Starts a child span sharing this span's segment.
    pub fn create_child(&self, config: SpanConfig) -> Span {
        self.segment.start_span(config, self.span_id)
    }

    /// Writes this span's context into the carrier, using every configured
    /// injection style.
    ///
    /// Injecting forces a sampling decision for the segment so downstream
    /// services see a priority. A later `override_sampling_priority` changes
    /// this segment but cannot reach requests that were already sent.
    pub fn inject(&self, carrier: &mut dyn Injector) {
        self.segment.inject(self.span_id, carrier);
    }

    /// Replaces the segment's sampling decision with a manual one.
    pub fn override_sampling_priority(&self, priority: SamplingPriority) {
        self.segment.override_sampling_priority(priority);
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.mutate(|data| data.name = name);
    }

    pub fn set_service_name(&mut self, service: impl Into<String>) {
        let service = service.into();
        self.mutate(|data| data.service = service);
    }

    pub fn set_resource_name(&mut self, resource: impl Into<String>) {
        let resource = resource.into();
        self.mutate(|data| data.resource = resource);
    }

    pub fn set_span_type(&mut self, span_type: impl Into<String>) {
        let span_type = span_type.into();
        self.mutate(|data| data.span_type = Some(span_type));
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.mutate(|data| {
            data.tags.insert(key, value);
        });
    }

    pub fn set_numeric_tag(&mut self, key: impl Into<String>, value: f64) {
        let key = key.into();
        self.mutate(|data| {
            data.numeric_tags.insert(key, value);
        });
    }

    pub fn set_error(&mut self, error: bool) {
        self.mutate(|data| data.error = error);
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.mutate(|data| {
            data.error = true;
            data.tags
                .insert(constants::ERROR_MESSAGE_TAG_KEY.to_string(), message);
        });
    }

    pub fn set_error_type(&mut self, error_type: impl Into<String>) {
        let error_type = error_type.into();
        self.mutate(|data| {
            data.error = true;
            data.tags
                .insert(constants::ERROR_TYPE_TAG_KEY.to_string(), error_type);
        });
    }

    pub fn set_error_stack(&mut self, stack: impl Into<String>) {
        let stack = stack.into();
        self.mutate(|data| {
            data.error = true;
            data.tags
                .insert(constants::ERROR_STACK_TAG_KEY.to_string(), stack);
        });
    }

    /// Finishes the span, computing the duration from monotonic ticks.
    ///
    /// A second call is a no-op.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        let now = self.segment.now();
        let duration = now.tick.saturating_duration_since(self.start_tick);
        self.finished = true;
        self.segment.finish_span(self.index, duration);
    }

    /// Finishes the span with a caller-provided duration.
    pub fn finish_with_duration(&mut self, duration: Duration) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.segment.finish_span(self.index, duration);
    }

    fn mutate(&mut self, f: impl FnOnce(&mut SpanData)) {
        if self.finished {
            return;
        }
        let _ = self.segment.with_span_mut(self.index, f);
    }

    fn with_data<T>(&self, f: impl FnOnce(&SpanData) -> T) -> Option<T> {
        self.segment.with_span(self.index, f)
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.finish();
    }
}
