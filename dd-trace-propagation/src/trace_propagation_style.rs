// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use dd_trace::{configuration::TracePropagationStyle, Config};

use crate::{
    b3,
    carrier::{Extractor, Injector},
    context::SpanContext,
    datadog, tracecontext, Propagator,
};

const NONE_KEYS: [String; 0] = [];

impl Propagator for TracePropagationStyle {
    fn extract(&self, carrier: &dyn Extractor, config: &Config) -> Option<SpanContext> {
        match self {
            Self::Datadog => datadog::extract(carrier, config),
            Self::TraceContext => tracecontext::extract(carrier, config),
            Self::B3 => b3::extract_single(carrier, config),
            Self::B3Multi => b3::extract_multi(carrier, config),
            Self::None => None,
        }
    }

    fn inject(&self, context: &mut SpanContext, carrier: &mut dyn Injector, config: &Config) {
        match self {
            Self::Datadog => datadog::inject(context, carrier, config),
            Self::TraceContext => tracecontext::inject(context, carrier, config),
            Self::B3 => b3::inject_single(context, carrier, config),
            Self::B3Multi => b3::inject_multi(context, carrier, config),
            Self::None => {}
        }
    }

    fn keys(&self) -> &[String] {
        match self {
            Self::Datadog => datadog::keys(),
            Self::TraceContext => tracecontext::keys(),
            Self::B3 => b3::single_keys(),
            Self::B3Multi => b3::multi_keys(),
            Self::None => &NONE_KEYS,
        }
    }
}
