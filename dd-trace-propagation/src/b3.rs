// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use lazy_static::lazy_static;

use crate::{
    carrier::{get_single_value_from_extractor, Extractor, Injector},
    context::{Sampling, SpanContext},
    error::Error,
};

use dd_trace::{
    dd_debug,
    sampling::{priority, SamplingPriority},
    Config, ErrorCode,
};

// B3 Keys
const B3_SINGLE_KEY: &str = "b3";
const B3_TRACE_ID_KEY: &str = "x-b3-traceid";
const B3_SPAN_ID_KEY: &str = "x-b3-spanid";
const B3_SAMPLED_KEY: &str = "x-b3-sampled";
const B3_FLAGS_KEY: &str = "x-b3-flags";

lazy_static! {
    static ref B3_SINGLE_HEADER_KEYS: [String; 1] = [B3_SINGLE_KEY.to_owned()];
    static ref B3_MULTI_HEADER_KEYS: [String; 4] = [
        B3_TRACE_ID_KEY.to_owned(),
        B3_SPAN_ID_KEY.to_owned(),
        B3_SAMPLED_KEY.to_owned(),
        B3_FLAGS_KEY.to_owned(),
    ];
}

/// Extracts the single-header variant, `b3: traceid-spanid[-sampled[-parentspanid]]`.
///
/// A lone `b3: 0` is the deny marker: it carries no ids, only an
/// `AUTO_REJECT` decision for whatever trace the callee starts.
pub fn extract_single(carrier: &dyn Extractor, _config: &Config) -> Option<SpanContext> {
    let value = match get_single_value_from_extractor(carrier, B3_SINGLE_KEY) {
        Ok(value) => value?.trim(),
        Err(e) => {
            dd_debug!("{e}");
            return None;
        }
    };

    if value == "0" {
        return Some(SpanContext {
            sampling: Sampling {
                priority: Some(priority::AUTO_REJECT),
                mechanism: None,
            },
            is_remote: true,
            ..SpanContext::default()
        });
    }

    let mut parts = value.splitn(4, '-');
    let trace_id = parts.next().unwrap_or_default();
    let span_id = parts.next();
    let sampled = parts.next();
    // The trailing parent span id names the caller's parent, not ours.
    let _parent_span_id = parts.next();

    let trace_id = match extract_trace_id(trace_id) {
        Ok(trace_id) => trace_id,
        Err(e) => {
            dd_debug!("{e}");
            return None;
        }
    };

    let Some(span_id) = span_id else {
        dd_debug!(
            "{}",
            Error::extract(
                ErrorCode::MissingParentSpanId,
                "b3 header carries a trace id but no span id",
                "b3",
            )
        );
        return None;
    };

    let span_id = match extract_span_id(span_id) {
        Ok(span_id) => span_id,
        Err(e) => {
            dd_debug!("{e}");
            return None;
        }
    };

    Some(SpanContext {
        trace_id,
        span_id,
        sampling: Sampling {
            priority: sampled.map(sampled_to_priority),
            mechanism: None,
        },
        is_remote: true,
        ..SpanContext::default()
    })
}

/// Extracts the multi-header variant (`x-b3-traceid`, `x-b3-spanid`,
/// `x-b3-sampled`, `x-b3-flags`).
pub fn extract_multi(carrier: &dyn Extractor, _config: &Config) -> Option<SpanContext> {
    let trace_id = carrier.get(B3_TRACE_ID_KEY)?;
    let trace_id = match extract_trace_id(trace_id) {
        Ok(trace_id) => trace_id,
        Err(e) => {
            dd_debug!("{e}");
            return None;
        }
    };

    let Some(span_id) = carrier.get(B3_SPAN_ID_KEY) else {
        dd_debug!(
            "{}",
            Error::extract(
                ErrorCode::MissingParentSpanId,
                "x-b3-traceid present without x-b3-spanid",
                "b3multi",
            )
        );
        return None;
    };
    let span_id = match extract_span_id(span_id) {
        Ok(span_id) => span_id,
        Err(e) => {
            dd_debug!("{e}");
            return None;
        }
    };

    // `x-b3-flags: 1` is the debug marker and forces a keep
    let sampling_priority = if carrier.get(B3_FLAGS_KEY) == Some("1") {
        Some(priority::USER_KEEP)
    } else {
        carrier.get(B3_SAMPLED_KEY).map(sampled_to_priority)
    };

    Some(SpanContext {
        trace_id,
        span_id,
        sampling: Sampling {
            priority: sampling_priority,
            mechanism: None,
        },
        is_remote: true,
        ..SpanContext::default()
    })
}

/// Injects the single-header variant.
pub fn inject_single(context: &mut SpanContext, carrier: &mut dyn Injector, _config: &Config) {
    if context.trace_id == 0 || context.span_id == 0 {
        dd_debug!("Propagator (b3): skipping inject");
        return;
    }

    let sampled = match context.sampling.priority {
        Some(priority) if !priority.is_keep() => "0",
        _ => "1",
    };

    carrier.set(
        B3_SINGLE_KEY,
        format!(
            "{:032x}-{:016x}-{sampled}",
            context.trace_id, context.span_id
        ),
    );
}

/// Injects the multi-header variant.
pub fn inject_multi(context: &mut SpanContext, carrier: &mut dyn Injector, _config: &Config) {
    if context.trace_id == 0 || context.span_id == 0 {
        dd_debug!("Propagator (b3multi): skipping inject");
        return;
    }

    let sampled = match context.sampling.priority {
        Some(priority) if !priority.is_keep() => "0",
        _ => "1",
    };

    carrier.set(B3_TRACE_ID_KEY, format!("{:032x}", context.trace_id));
    carrier.set(B3_SPAN_ID_KEY, format!("{:016x}", context.span_id));
    carrier.set(B3_SAMPLED_KEY, sampled.to_string());
}

fn sampled_to_priority(sampled: &str) -> SamplingPriority {
    if sampled == "d" {
        // debug flag, an explicit user decision upstream
        priority::USER_KEEP
    } else if sampled == "1" || sampled.eq_ignore_ascii_case("true") {
        priority::AUTO_KEEP
    } else {
        priority::AUTO_REJECT
    }
}

fn extract_trace_id(trace_id: &str) -> Result<u128, Error> {
    if trace_id.len() != 16 && trace_id.len() != 32 {
        return Err(Error::extract(
            ErrorCode::MalformedTraceId,
            "b3 trace id must be 16 or 32 hex characters",
            "b3",
        ));
    }
    let trace_id = u128::from_str_radix(trace_id, 16).map_err(|_| {
        Error::extract(ErrorCode::MalformedTraceId, "Failed to decode trace_id", "b3")
    })?;
    if trace_id == 0 {
        return Err(Error::extract(
            ErrorCode::MalformedTraceId,
            "`0` value for trace_id is invalid",
            "b3",
        ));
    }
    Ok(trace_id)
}

fn extract_span_id(span_id: &str) -> Result<u64, Error> {
    if span_id.len() != 16 {
        return Err(Error::extract(
            ErrorCode::MalformedSpanId,
            "b3 span id must be 16 hex characters",
            "b3",
        ));
    }
    let span_id = u64::from_str_radix(span_id, 16).map_err(|_| {
        Error::extract(ErrorCode::MalformedSpanId, "Failed to decode span_id", "b3")
    })?;
    if span_id == 0 {
        return Err(Error::extract(
            ErrorCode::MalformedSpanId,
            "`0` value for span_id is invalid",
            "b3",
        ));
    }
    Ok(span_id)
}

pub fn single_keys() -> &'static [String] {
    B3_SINGLE_HEADER_KEYS.as_slice()
}

pub fn multi_keys() -> &'static [String] {
    B3_MULTI_HEADER_KEYS.as_slice()
}
