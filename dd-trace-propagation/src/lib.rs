// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::context::{SpanContext, SpanLink};
use carrier::{Extractor, Injector};
use datadog::DATADOG_LAST_PARENT_ID_KEY;
use dd_trace::{configuration::TracePropagationStyle, dd_warn, Config, ErrorCode};
use tracecontext::TRACESTATE_KEY;

pub mod b3;
pub mod carrier;
pub mod context;
mod datadog;
mod error;
pub mod trace_propagation_style;
pub mod tracecontext;

pub use error::Error;

pub trait Propagator {
    fn extract(&self, carrier: &dyn Extractor, config: &Config) -> Option<SpanContext>;
    fn inject(&self, context: &mut SpanContext, carrier: &mut dyn Injector, config: &Config);
    fn keys(&self) -> &[String];
}

/// Ordered multi-style propagator.
///
/// Extraction tries each configured style in order; the first successful one
/// becomes the primary context. Later styles either refine it (tracecontext
/// with a matching trace id contributes its tracestate and last parent id) or,
/// when their trace id disagrees, are preserved as terminated-context span
/// links and reported as an inconsistency.
#[derive(Debug)]
pub struct DatadogCompositePropagator {
    extractors: Vec<TracePropagationStyle>,
    injectors: Vec<TracePropagationStyle>,
    keys: Vec<String>,
}

impl Propagator for DatadogCompositePropagator {
    fn extract(&self, carrier: &dyn Extractor, config: &Config) -> Option<SpanContext> {
        let contexts = self.extract_available_contexts(carrier, config);
        if contexts.is_empty() {
            return None;
        }

        let context = Self::resolve_contexts(contexts);

        Some(context)
    }

    fn inject(&self, context: &mut SpanContext, carrier: &mut dyn Injector, config: &Config) {
        self.injectors
            .iter()
            .for_each(|propagator| propagator.inject(context, carrier, config));
    }

    fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl DatadogCompositePropagator {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let extractors: Vec<TracePropagationStyle> = config
            .trace_propagation_style_extract()
            .iter()
            .filter(|style| **style != TracePropagationStyle::None)
            .copied()
            .collect();

        let injectors: Vec<TracePropagationStyle> = config
            .trace_propagation_style_inject()
            .iter()
            .filter(|style| **style != TracePropagationStyle::None)
            .copied()
            .collect();

        let keys = extractors.iter().fold(Vec::new(), |mut keys, extractor| {
            extractor
                .keys()
                .iter()
                .for_each(|key| keys.push(key.clone()));
            keys
        });

        Self {
            extractors,
            injectors,
            keys,
        }
    }

    fn extract_available_contexts(
        &self,
        carrier: &dyn Extractor,
        config: &Config,
    ) -> Vec<(SpanContext, TracePropagationStyle)> {
        let mut contexts = vec![];

        for propagator in self.extractors.iter() {
            if let Some(context) = propagator.extract(carrier, config) {
                contexts.push((context, *propagator));
            }
        }

        contexts
    }

    fn resolve_contexts(contexts: Vec<(SpanContext, TracePropagationStyle)>) -> SpanContext {
        let mut primary_context = contexts[0].0.clone();
        let mut links = Vec::<SpanLink>::new();

        for context_and_style in contexts.iter().skip(1) {
            let style = context_and_style.1;
            let context = &context_and_style.0;

            if context.span_id != 0
                && context.trace_id != 0
                && context.trace_id != primary_context.trace_id
            {
                dd_warn!(
                    "[{}] trace id from {style} headers disagrees with the {} one, keeping the \
                     extracted context as a span link",
                    ErrorCode::InconsistentExtractionStyles.as_str(),
                    contexts[0].1
                );
                links.push(SpanLink::terminated_context(context, style));
            } else if style == TracePropagationStyle::TraceContext {
                if let Some(tracestate) = context.tags.get(TRACESTATE_KEY) {
                    primary_context
                        .tags
                        .insert(TRACESTATE_KEY.to_string(), tracestate.clone());
                }

                if primary_context.trace_id == context.trace_id
                    && primary_context.span_id != context.span_id
                {
                    let dd_context = contexts
                        .iter()
                        .find(|(_, style)| *style == TracePropagationStyle::Datadog)
                        .map(|(context, _)| context);

                    if let Some(parent_id) = context.tags.get(DATADOG_LAST_PARENT_ID_KEY) {
                        primary_context
                            .tags
                            .insert(DATADOG_LAST_PARENT_ID_KEY.to_string(), parent_id.clone());
                    } else if let Some(sc) = dd_context {
                        primary_context.tags.insert(
                            DATADOG_LAST_PARENT_ID_KEY.to_string(),
                            format!("{:016x}", sc.span_id),
                        );
                    }

                    primary_context.span_id = context.span_id;
                }
            }
        }

        primary_context.links = links;

        primary_context
    }
}
