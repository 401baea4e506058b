// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;

use thiserror::Error;

/// Stable error codes, kept in sync with the other Datadog tracing libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    Other,
    ServiceNameRequired,
    RateOutOfRange,
    InvalidInteger,
    OutOfRangeInteger,
    MalformedTraceId,
    MalformedSpanId,
    MalformedHeaders,
    MissingParentSpanId,
    MissingTraceId,
    InconsistentExtractionStyles,
    AgentHttpFailure,
    AgentResponseMalformed,
    BufferOverflow,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Other => "OTHER",
            ErrorCode::ServiceNameRequired => "SERVICE_NAME_REQUIRED",
            ErrorCode::RateOutOfRange => "RATE_OUT_OF_RANGE",
            ErrorCode::InvalidInteger => "INVALID_INTEGER",
            ErrorCode::OutOfRangeInteger => "OUT_OF_RANGE_INTEGER",
            ErrorCode::MalformedTraceId => "MALFORMED_TRACE_ID",
            ErrorCode::MalformedSpanId => "MALFORMED_SPAN_ID",
            ErrorCode::MalformedHeaders => "MALFORMED_HEADERS",
            ErrorCode::MissingParentSpanId => "MISSING_PARENT_SPAN_ID",
            ErrorCode::MissingTraceId => "MISSING_TRACE_ID",
            ErrorCode::InconsistentExtractionStyles => "INCONSISTENT_EXTRACTION_STYLES",
            ErrorCode::AgentHttpFailure => "AGENT_HTTP_FAILURE",
            ErrorCode::AgentResponseMalformed => "AGENT_RESPONSE_MALFORMED",
            ErrorCode::BufferOverflow => "BUFFER_OVERFLOW",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("[{}] {message}", code.as_str())]
pub struct Error {
    pub code: ErrorCode,
    pub message: Cow<'static, str>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.message = Cow::Owned(format!("{prefix}: {}", self.message));
        self
    }
}

pub type Result<T> = std::result::Result<T, Error>;
