// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod configuration;
pub mod constants;
pub use configuration::Config;

mod error;
pub use error::{Error, ErrorCode, Result};

pub mod ids;
pub mod log;
pub mod rate;
pub mod sampling;
pub mod time;

pub use ids::{IdGenerator, RandIdGenerator};
pub use rate::Rate;
pub use time::{default_clock, Clock, TimePoint};
