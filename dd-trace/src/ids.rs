// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use rand::Rng;

/// Source of span and trace identifiers.
///
/// Pluggable so tests can pin ids; the default draws uniformly random values.
/// Zero is reserved to mean "absent", so generated ids are never zero.
pub trait IdGenerator: Send + Sync {
    fn span_id(&self) -> u64;

    fn trace_id(&self) -> u128;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandIdGenerator;

impl IdGenerator for RandIdGenerator {
    fn span_id(&self) -> u64 {
        let mut rng = rand::rng();
        loop {
            let id: u64 = rng.random();
            if id != 0 {
                return id;
            }
        }
    }

    fn trace_id(&self) -> u128 {
        let mut rng = rand::rng();
        loop {
            let id: u128 = rng.random();
            // The low half doubles as the legacy 64-bit id, keep it nonzero too.
            if id as u64 != 0 {
                return id;
            }
        }
    }
}
