// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    carrier::{get_comma_separated_value_from_extractor, Extractor, Injector},
    context::{combine_trace_id, split_trace_id, Sampling, SpanContext},
    error::Error,
};

use dd_trace::{
    dd_debug, dd_warn,
    sampling::{SamplingMechanism, SamplingPriority},
    Config, ErrorCode,
};

// Datadog Keys
const DATADOG_TRACE_ID_KEY: &str = "x-datadog-trace-id";
const DATADOG_PARENT_ID_KEY: &str = "x-datadog-parent-id";
const DATADOG_SAMPLING_PRIORITY_KEY: &str = "x-datadog-sampling-priority";
const DATADOG_ORIGIN_KEY: &str = "x-datadog-origin";
const DATADOG_TAGS_KEY: &str = "x-datadog-tags";
const DATADOG_HIGHER_ORDER_TRACE_ID_BITS_KEY: &str = "_dd.p.tid";
const DATADOG_PROPAGATION_ERROR_KEY: &str = "_dd.propagation_error";
pub const DATADOG_LAST_PARENT_ID_KEY: &str = "_dd.parent_id";
const DATADOG_SAMPLING_DECISION_KEY: &str = "_dd.p.dm";

lazy_static! {
    pub static ref INVALID_SEGMENT_REGEX: Regex =
        Regex::new(r"^0+$").expect("failed creating regex");
    static ref VALID_SAMPLING_DECISION_REGEX: Regex =
        Regex::new(r"^-([0-9]+)$").expect("failed creating regex");
    static ref DATADOG_HEADER_KEYS: [String; 5] = [
        DATADOG_TRACE_ID_KEY.to_owned(),
        DATADOG_ORIGIN_KEY.to_owned(),
        DATADOG_PARENT_ID_KEY.to_owned(),
        DATADOG_SAMPLING_PRIORITY_KEY.to_owned(),
        DATADOG_TAGS_KEY.to_owned(),
    ];
}

pub fn extract(carrier: &dyn Extractor, config: &Config) -> Option<SpanContext> {
    let lower_trace_id = match extract_trace_id(carrier) {
        Ok(trace_id) => trace_id,
        Err(e) => {
            dd_debug!("{e}");
            return None;
        }
    };

    let parent_id = extract_parent_id(carrier).unwrap_or(0);
    let sampling_priority = match extract_sampling_priority(carrier) {
        Ok(sampling_priority) => sampling_priority,
        Err(e) => {
            dd_debug!("{e}");
            return None;
        }
    };
    let origin = extract_origin(carrier);
    let tags = extract_tags(carrier, config.tags_header_max_length());

    let trace_id = combine_trace_id(
        lower_trace_id,
        tags.get(DATADOG_HIGHER_ORDER_TRACE_ID_BITS_KEY),
    );

    let mechanism = tags
        .get(DATADOG_SAMPLING_DECISION_KEY)
        .and_then(|dm| SamplingMechanism::from_str(dm).ok());

    Some(SpanContext {
        trace_id,
        span_id: parent_id,
        sampling: Sampling {
            priority: Some(sampling_priority),
            mechanism,
        },
        origin,
        tags,
        links: Vec::new(),
        is_remote: true,
        tracestate: None,
    })
}

pub fn inject(context: &mut SpanContext, carrier: &mut dyn Injector, config: &Config) {
    if context.trace_id == 0 {
        dd_debug!("Propagator (datadog): skipping inject, no trace id");
        return;
    }

    let (higher_bits, lower_bits) = split_trace_id(context.trace_id);
    if let Some(higher) = higher_bits {
        context.tags.insert(
            DATADOG_HIGHER_ORDER_TRACE_ID_BITS_KEY.to_string(),
            format!("{higher:016x}"),
        );
    }

    carrier.set(DATADOG_TRACE_ID_KEY, lower_bits.to_string());
    if context.span_id != 0 {
        carrier.set(DATADOG_PARENT_ID_KEY, context.span_id.to_string());
    }
    if let Some(priority) = context.sampling.priority {
        carrier.set(DATADOG_SAMPLING_PRIORITY_KEY, priority.to_string());
    }
    if let Some(origin) = context.origin.as_deref() {
        carrier.set(DATADOG_ORIGIN_KEY, origin.to_string());
    }

    inject_tags(context, carrier, config.tags_header_max_length());
}

fn inject_tags(context: &mut SpanContext, carrier: &mut dyn Injector, max_length: usize) {
    let mut keys = context
        .tags
        .keys()
        .filter(|key| key.starts_with(crate::context::DATADOG_PROPAGATION_TAG_PREFIX))
        .cloned()
        .collect::<Vec<_>>();
    keys.sort();

    let mut encoding_error = false;
    let mut pairs = Vec::with_capacity(keys.len());
    for key in keys {
        let value = &context.tags[&key];
        // `=` and `,` are the pair and list separators, values containing them
        // cannot be represented in the header
        if value.contains('=') || value.contains(',') || key.contains('=') || key.contains(',') {
            dd_warn!("Propagator (datadog): dropping unencodable trace tag {key}");
            encoding_error = true;
            continue;
        }
        pairs.push(format!("{key}={value}"));
    }

    let header = pairs.join(",");
    if header.len() > max_length {
        dd_warn!(
            "Propagator (datadog): x-datadog-tags exceeds the maximum length of {max_length}, \
             dropping the header"
        );
        context.tags.insert(
            DATADOG_PROPAGATION_ERROR_KEY.to_string(),
            "inject_max_size".to_string(),
        );
        return;
    }
    if encoding_error {
        context.tags.insert(
            DATADOG_PROPAGATION_ERROR_KEY.to_string(),
            "encoding_error".to_string(),
        );
    }

    if !header.is_empty() {
        carrier.set(DATADOG_TAGS_KEY, header);
    }
}

fn extract_trace_id(carrier: &dyn Extractor) -> Result<u64, Error> {
    let trace_id = carrier.get(DATADOG_TRACE_ID_KEY).ok_or(Error::extract(
        ErrorCode::MissingTraceId,
        "`trace_id` not found",
        "datadog",
    ))?;

    if INVALID_SEGMENT_REGEX.is_match(trace_id) {
        return Err(Error::extract(
            ErrorCode::MalformedTraceId,
            "Invalid `trace_id` found",
            "datadog",
        ));
    }

    trace_id.parse::<u64>().map_err(|_| {
        Error::extract(
            ErrorCode::MalformedTraceId,
            "Failed to decode `trace_id`",
            "datadog",
        )
    })
}

fn extract_parent_id(carrier: &dyn Extractor) -> Option<u64> {
    let parent_id = carrier.get(DATADOG_PARENT_ID_KEY)?;

    parent_id.parse::<u64>().ok()
}

fn extract_sampling_priority(carrier: &dyn Extractor) -> Result<SamplingPriority, Error> {
    // A trace id without a priority means an upstream tracer made a keep
    // decision it could not encode, default to USER_KEEP
    let sampling_priority = carrier.get(DATADOG_SAMPLING_PRIORITY_KEY).unwrap_or("2");

    SamplingPriority::from_str(sampling_priority).map_err(|()| {
        Error::extract(
            ErrorCode::MalformedHeaders,
            "Failed to decode `sampling_priority`",
            "datadog",
        )
    })
}

fn extract_origin(carrier: &dyn Extractor) -> Option<String> {
    let origin = carrier.get(DATADOG_ORIGIN_KEY)?;
    Some(origin.to_string())
}

pub fn extract_tags(carrier: &dyn Extractor, max_length: usize) -> HashMap<String, String> {
    let mut tags: HashMap<String, String> = HashMap::new();

    let carrier_tags =
        get_comma_separated_value_from_extractor(carrier, DATADOG_TAGS_KEY).unwrap_or_default();

    if carrier_tags.len() > max_length {
        dd_warn!(
            "Propagator (datadog): x-datadog-tags exceeds the maximum length of {max_length}, \
             ignoring the header"
        );
        tags.insert(
            DATADOG_PROPAGATION_ERROR_KEY.to_string(),
            "extract_max_size".to_string(),
        );
        return tags;
    }

    let pairs = carrier_tags.split(',');
    for pair in pairs {
        if let Some((k, v)) = pair.split_once('=') {
            if k.starts_with(crate::context::DATADOG_PROPAGATION_TAG_PREFIX) {
                tags.insert(k.to_string(), v.to_string());
            }
        }
    }

    // Handle 128bit trace ID
    if !tags.is_empty() {
        if let Some(trace_id_higher_order_bits) = tags.get(DATADOG_HIGHER_ORDER_TRACE_ID_BITS_KEY) {
            if !higher_order_bits_valid(trace_id_higher_order_bits) {
                dd_warn!("Malformed Trace ID: {trace_id_higher_order_bits} Failed to decode trace ID from carrier.");
                tags.insert(
                    DATADOG_PROPAGATION_ERROR_KEY.to_string(),
                    format!("malformed_tid {trace_id_higher_order_bits}"),
                );
                tags.remove(DATADOG_HIGHER_ORDER_TRACE_ID_BITS_KEY);
            }
        }
    }

    if !tags.contains_key(DATADOG_SAMPLING_DECISION_KEY) {
        tags.insert(DATADOG_SAMPLING_DECISION_KEY.to_string(), "-3".to_string());
    }

    validate_sampling_decision(&mut tags);

    tags
}

fn validate_sampling_decision(tags: &mut HashMap<String, String>) {
    let should_remove = tags
        .get(DATADOG_SAMPLING_DECISION_KEY)
        .is_some_and(|sampling_decision| {
            let is_invalid = !VALID_SAMPLING_DECISION_REGEX.is_match(sampling_decision);
            if is_invalid {
                dd_warn!("Failed to decode `_dd.p.dm`: {}", sampling_decision);
            }
            is_invalid
        });

    if should_remove {
        tags.remove(DATADOG_SAMPLING_DECISION_KEY);
        tags.insert(
            DATADOG_PROPAGATION_ERROR_KEY.to_string(),
            "decoding_error".to_string(),
        );
    }
}

fn higher_order_bits_valid(trace_id_higher_order_bits: &str) -> bool {
    if trace_id_higher_order_bits.len() != 16 {
        return false;
    }

    u64::from_str_radix(trace_id_higher_order_bits, 16).is_ok()
}

pub fn keys() -> &'static [String] {
    DATADOG_HEADER_KEYS.as_slice()
}
