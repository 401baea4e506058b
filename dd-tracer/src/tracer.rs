// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use dd_trace::{
    constants, dd_info, dd_warn, default_clock, Clock, Config, Error, ErrorCode, IdGenerator,
    RandIdGenerator,
};
use dd_trace_propagation::{
    carrier::Extractor,
    context::SpanContext,
    DatadogCompositePropagator, Propagator,
};
use dd_trace_sampling::{SpanSampler, TraceSampler};

use crate::{
    collector::{Collector, DatadogAgent},
    http::HttpClient,
    scheduler::EventScheduler,
    span::{Span, SpanConfig, SpanDefaults},
    trace_segment::TraceSegment,
};

/// Everything a trace segment needs to live past the tracer façade.
///
/// Segments share this bundle, so outstanding spans stay valid even when the
/// `Tracer` itself has gone out of scope.
pub(crate) struct Components {
    pub(crate) config: Arc<Config>,
    pub(crate) clock: Clock,
    pub(crate) generator: Arc<dyn IdGenerator>,
    pub(crate) defaults: Arc<SpanDefaults>,
    pub(crate) trace_sampler: Arc<TraceSampler>,
    pub(crate) span_sampler: Arc<SpanSampler>,
    pub(crate) collector: Arc<dyn Collector>,
    pub(crate) propagator: Arc<DatadogCompositePropagator>,
}

/// The tracer façade: creates spans, restores trace context from carriers,
/// and owns the machinery that delivers finished segments to the agent.
pub struct Tracer {
    components: Arc<Components>,
    agent: Arc<DatadogAgent>,
    scheduler: Arc<EventScheduler>,
    shutdown_done: AtomicBool,
}

impl Tracer {
    /// Builds a tracer from a finalized configuration and the host's HTTP
    /// client. Construction cannot fail.
    pub fn new(config: Config, http: Arc<dyn HttpClient>) -> Self {
        Self::with_components(config, http, Arc::new(RandIdGenerator), default_clock())
    }

    /// Construction seam with injectable id generation and clock.
    pub fn with_components(
        config: Config,
        http: Arc<dyn HttpClient>,
        generator: Arc<dyn IdGenerator>,
        clock: Clock,
    ) -> Self {
        dd_trace::log::set_max_level(config.log_level());

        let config = Arc::new(config);
        let trace_sampler = Arc::new(TraceSampler::new(&config));
        let span_sampler = Arc::new(SpanSampler::new(&config));
        let defaults = Arc::new(SpanDefaults::from_config(&config));
        let propagator = Arc::new(DatadogCompositePropagator::new(&config));

        let agent = DatadogAgent::new(config.clone(), http, trace_sampler.clone());
        let scheduler = Arc::new(EventScheduler::new());
        agent.start_flush_task(&scheduler);

        if config.startup_logs() {
            dd_info!("DATADOG TRACER CONFIGURATION - {}", config.startup_summary());
        }

        Tracer {
            components: Arc::new(Components {
                config,
                clock,
                generator,
                defaults,
                trace_sampler,
                span_sampler,
                collector: agent.clone(),
                propagator,
            }),
            agent,
            scheduler,
            shutdown_done: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.components.config
    }

    /// Starts a new trace rooted in this process.
    pub fn create_span(&self, span_config: SpanConfig) -> Span {
        let trace_id = self.components.generator.trace_id();
        let segment = TraceSegment::new_local(self.components.clone(), trace_id);
        segment.start_span(span_config, 0)
    }

    /// Restores a trace context from the carrier and returns the local root
    /// continuing it.
    pub fn extract_span(
        &self,
        carrier: &dyn Extractor,
        span_config: SpanConfig,
    ) -> Result<Span, Error> {
        match self
            .components
            .propagator
            .extract(carrier, &self.components.config)
        {
            Some(context) => Ok(self.span_from_context(context, span_config)),
            None if self.has_trace_headers(carrier) => Err(Error::new(
                ErrorCode::MalformedHeaders,
                "the carrier contains trace headers, but no context could be extracted",
            )),
            None => Err(Error::new(
                ErrorCode::MissingTraceId,
                "no trace context found in the carrier",
            )),
        }
    }

    /// Like [`Tracer::extract_span`], but never fails: a carrier without a
    /// usable context yields a fresh root, tagged with
    /// `_dd.propagation_error` when extraction was attempted and failed.
    pub fn extract_or_create_span(
        &self,
        carrier: &dyn Extractor,
        span_config: SpanConfig,
    ) -> Span {
        match self
            .components
            .propagator
            .extract(carrier, &self.components.config)
        {
            Some(context) => self.span_from_context(context, span_config),
            None => {
                let failed_extraction = self.has_trace_headers(carrier);
                let mut span = self.create_span(span_config);
                if failed_extraction {
                    dd_warn!(
                        "[{}] failed to extract a trace context, starting a new trace",
                        ErrorCode::MalformedHeaders.as_str()
                    );
                    span.set_tag(constants::PROPAGATION_ERROR_TAG_KEY, "extraction_error");
                }
                span
            }
        }
    }

    /// Immediately ships everything queued for the agent.
    pub fn flush(&self) {
        self.agent.flush();
    }

    /// Synchronous, bounded shutdown: stops the periodic flush, performs one
    /// final flush, and joins the worker thread. Also runs on drop.
    pub fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.agent
            .shutdown(self.components.config.shutdown_timeout());
        self.scheduler.shutdown();
    }

    fn span_from_context(&self, context: SpanContext, span_config: SpanConfig) -> Span {
        if context.trace_id == 0 {
            // A deny marker (`b3: 0`) carries a decision but no ids
            let trace_id = self.components.generator.trace_id();
            let context = SpanContext {
                trace_id,
                span_id: 0,
                ..context
            };
            let segment = TraceSegment::new_extracted(self.components.clone(), &context);
            return segment.start_span(span_config, 0);
        }

        let parent_id = context.span_id;
        let segment = TraceSegment::new_extracted(self.components.clone(), &context);
        segment.start_span(span_config, parent_id)
    }

    fn has_trace_headers(&self, carrier: &dyn Extractor) -> bool {
        self.components
            .propagator
            .keys()
            .iter()
            .any(|key| carrier.get(key).is_some())
    }
}

impl Drop for Tracer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
