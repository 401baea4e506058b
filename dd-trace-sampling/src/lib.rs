// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod constants;
pub mod glob_matcher;
pub mod rate_limiter;
pub mod rate_sampler;
pub mod service_rates;
pub mod span_matcher;
pub mod span_sampler;
pub mod trace_sampler;

pub use glob_matcher::GlobMatcher;
pub use rate_limiter::RateLimiter;
pub use rate_sampler::RateSampler;
pub use service_rates::ServicesSampler;
pub use span_matcher::{SpanMatcher, SpanView};
pub use span_sampler::{SpanSampler, SpanSamplingVerdict};
pub use trace_sampler::{TraceSampler, TraceSamplingDecision};
