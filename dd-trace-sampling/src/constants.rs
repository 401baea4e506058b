// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod numeric {
    /// Multiplier of the deterministic trace-id hash, from Knuth's
    /// multiplicative hashing scheme. Shared by every Datadog tracer so the
    /// same trace id samples identically in every language.
    pub const KNUTH_FACTOR: u64 = 1_111_111_111_111_111_111;

    pub const MAX_UINT_64BITS: u64 = u64::MAX;
}

pub mod rate {
    pub const MIN_SAMPLE_RATE: f64 = 0.0;

    pub const MAX_SAMPLE_RATE: f64 = 1.0;
}
