// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub const HIGHER_ORDER_TRACE_ID_BITS_TAG: &str = "_dd.p.tid";

pub const SAMPLING_PRIORITY_TAG_KEY: &str = "_sampling_priority_v1";

pub const SAMPLING_DECISION_MAKER_TAG_KEY: &str = "_dd.p.dm";

pub const SAMPLING_RULE_RATE_TAG_KEY: &str = "_dd.rule_psr";

pub const SAMPLING_AGENT_RATE_TAG_KEY: &str = "_dd.agent_psr";

pub const SAMPLING_LIMIT_RATE_TAG_KEY: &str = "_dd.limit_psr";

pub const SPAN_SAMPLING_MECHANISM_TAG_KEY: &str = "_dd.span_sampling.mechanism";

pub const SPAN_SAMPLING_RULE_RATE_TAG_KEY: &str = "_dd.span_sampling.rule_rate";

pub const SPAN_SAMPLING_MAX_PER_SECOND_TAG_KEY: &str = "_dd.span_sampling.max_per_second";

pub const ORIGIN_TAG_KEY: &str = "_dd.origin";

pub const HOSTNAME_TAG_KEY: &str = "_dd.hostname";

pub const PROPAGATION_ERROR_TAG_KEY: &str = "_dd.propagation_error";

pub const DROPPED_SEGMENTS_TAG_KEY: &str = "_dd.tracer.dropped_segments";

pub const ENVIRONMENT_TAG_KEY: &str = "env";

pub const VERSION_TAG_KEY: &str = "version";

pub const ERROR_MESSAGE_TAG_KEY: &str = "error.message";

pub const ERROR_TYPE_TAG_KEY: &str = "error.type";

pub const ERROR_STACK_TAG_KEY: &str = "error.stack";
