// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use crate::glob_matcher::GlobMatcher;

/// Constant to represent "no rule" for a field
pub const NO_RULE: &str = "";

/// The span fields the samplers match rules against.
#[derive(Debug, Clone, Copy)]
pub struct SpanView<'a> {
    pub trace_id_low: u64,
    pub span_id: u64,
    pub service: &'a str,
    pub env: Option<&'a str>,
    pub name: &'a str,
    pub resource: &'a str,
    pub tags: &'a HashMap<String, String>,
}

/// A predicate over span fields, each independently globbed.
///
/// A missing or empty pattern matches everything; configured fields are
/// conjunctive.
#[derive(Debug, Clone)]
pub struct SpanMatcher {
    pub service: Option<String>,
    pub name: Option<String>,
    pub resource: Option<String>,
    pub tags: HashMap<String, String>,

    service_matcher: Option<GlobMatcher>,
    name_matcher: Option<GlobMatcher>,
    resource_matcher: Option<GlobMatcher>,
    tag_matchers: HashMap<String, GlobMatcher>,
}

impl SpanMatcher {
    pub fn new(
        service: Option<String>,
        name: Option<String>,
        resource: Option<String>,
        tags: HashMap<String, String>,
    ) -> Self {
        let service_matcher = service.as_ref().and_then(|s| {
            if s != NO_RULE {
                Some(GlobMatcher::new(s))
            } else {
                None
            }
        });

        let name_matcher = name.as_ref().and_then(|n| {
            if n != NO_RULE {
                Some(GlobMatcher::new(n))
            } else {
                None
            }
        });

        let resource_matcher = resource.as_ref().and_then(|r| {
            if r != NO_RULE {
                Some(GlobMatcher::new(r))
            } else {
                None
            }
        });

        let mut tag_matchers = HashMap::with_capacity(tags.len());
        for (key, value) in &tags {
            if value != NO_RULE {
                tag_matchers.insert(key.clone(), GlobMatcher::new(value));
            }
        }

        SpanMatcher {
            service,
            name,
            resource,
            tags,
            service_matcher,
            name_matcher,
            resource_matcher,
            tag_matchers,
        }
    }

    /// Checks if this matcher accepts the given span fields
    pub fn matches(&self, span: &SpanView<'_>) -> bool {
        if let Some(ref matcher) = self.service_matcher {
            if !matcher.matches(span.service) {
                return false;
            }
        }

        if let Some(ref matcher) = self.name_matcher {
            if !matcher.matches(span.name) {
                return false;
            }
        }

        if let Some(ref matcher) = self.resource_matcher {
            if !matcher.matches(span.resource) {
                return false;
            }
        }

        for (key, matcher) in &self.tag_matchers {
            match span.tags.get(key) {
                Some(value) => {
                    if !matcher.matches(value) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        true
    }
}
