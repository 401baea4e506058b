// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::rate_sampler::RateSampler;

/// Builds the `service:{service},env:{env}` key the agent reports rates under.
pub fn service_rate_key(service: &str, env: Option<&str>) -> String {
    format!("service:{},env:{}", service, env.unwrap_or_default())
}

/// Per-service samplers pushed by the agent in flush responses.
///
/// The table is swapped wholesale on update; readers clone the sampler they
/// need so rate lookups never block a writer.
#[derive(Debug, Default, Clone)]
pub struct ServicesSampler {
    inner: Arc<RwLock<HashMap<String, RateSampler>>>,
}

impl ServicesSampler {
    pub fn get(&self, service_key: &str) -> Option<RateSampler> {
        self.inner.read().unwrap().get(service_key).cloned()
    }

    pub fn update_rates<I: IntoIterator<Item = (String, f64)>>(&self, rates: I) {
        let new_rates: HashMap<_, _> = rates
            .into_iter()
            .map(|(s, r)| (s, RateSampler::new(r)))
            .collect();
        *self.inner.write().unwrap() = new_rates;
    }

    // used for testing purposes

    #[allow(dead_code)]
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }

    #[allow(dead_code)]
    pub(crate) fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}
