// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Datadog distributed tracing client.
//!
//! The [`Tracer`] is the entry point: build one from a finalized
//! [`Config`] and the host's [`HttpClient`], instrument code with
//! [`Span`]s, and propagate context through carriers at process boundaries.
//! Finished trace segments are batched and shipped to the Datadog agent in
//! the background.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dd_tracer::{SpanConfig, Tracer};
//!
//! # struct MyHttpClient;
//! # impl dd_tracer::HttpClient for MyHttpClient {
//! #     fn post(
//! #         &self,
//! #         _url: &str,
//! #         _headers: &[(String, String)],
//! #         _body: Vec<u8>,
//! #     ) -> Result<dd_tracer::HttpResponse, dd_tracer::TransportError> {
//! #         unimplemented!()
//! #     }
//! # }
//! let mut builder = dd_tracer::Config::builder();
//! builder.set_service("web-api".to_string());
//! let config = builder.build().expect("invalid tracer configuration");
//!
//! let tracer = Tracer::new(config, Arc::new(MyHttpClient));
//!
//! let mut root = tracer.create_span(SpanConfig::with_name("handle.request"));
//! let mut child = root.create_child(SpanConfig::with_name("db.query"));
//! child.set_tag("db.system", "postgres");
//! child.finish();
//! root.finish();
//! ```

pub mod collector;
pub mod http;
pub mod msgpack;
pub mod scheduler;
pub mod span;
pub mod trace_segment;
pub mod tracer;

pub use collector::{Collector, DatadogAgent};
pub use http::{HttpClient, HttpResponse, TransportError};
pub use scheduler::{CancelToken, EventScheduler};
pub use span::{Span, SpanConfig, SpanData, SpanDefaults};
pub use trace_segment::TraceSegment;
pub use tracer::Tracer;

pub use dd_trace::Config;
