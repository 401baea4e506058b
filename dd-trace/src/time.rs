// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::Arc,
    time::{Instant, SystemTime},
};

/// A wall-clock reading paired with a monotonic tick taken at the same moment.
///
/// Span start times come from `wall`; durations are always the difference of
/// two `tick` values, so a wall-clock jump never produces a negative or
/// inflated duration.
#[derive(Debug, Clone, Copy)]
pub struct TimePoint {
    pub wall: SystemTime,
    pub tick: Instant,
}

pub type Clock = Arc<dyn Fn() -> TimePoint + Send + Sync>;

pub fn default_clock() -> Clock {
    Arc::new(|| TimePoint {
        wall: SystemTime::now(),
        tick: Instant::now(),
    })
}
