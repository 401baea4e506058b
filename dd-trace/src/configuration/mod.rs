// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[allow(clippy::module_inception)]
mod configuration;
mod sampling_rules;
mod sources;
mod styles;

pub use configuration::{Config, ConfigBuilder, TRACER_VERSION};
pub use sampling_rules::{SpanSamplingRuleConfig, TraceSamplingRuleConfig};
pub use styles::TracePropagationStyle;
