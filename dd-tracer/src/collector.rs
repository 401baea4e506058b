// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, VecDeque},
    mem,
    sync::{mpsc, Arc, Mutex},
    thread,
    time::{Duration, Instant, UNIX_EPOCH},
};

use serde::Deserialize;

use dd_trace::{constants, dd_debug, dd_error, dd_warn, Config, ErrorCode};
use dd_trace_sampling::TraceSampler;

use crate::{
    http::HttpClient,
    msgpack::Packer,
    scheduler::{CancelToken, EventScheduler},
    span::SpanData,
};

/// Destination of finalized trace segments.
pub trait Collector: Send + Sync {
    /// Takes ownership of one finalized segment's spans, in finish order.
    fn send(&self, trace: Vec<SpanData>);
}

const DEFAULT_QUEUE_CAPACITY: usize = 1000;
const FAILURE_ESCALATION_WINDOW: Duration = Duration::from_secs(60);
const TRACES_ENDPOINT: &str = "/v0.4/traces";

/// The Datadog agent client: queues finalized segments, periodically encodes
/// them as a MessagePack v0.4 payload and POSTs them to the agent, feeding
/// the agent's per-service sampling rates back into the trace sampler.
pub struct DatadogAgent {
    config: Arc<Config>,
    http: Arc<dyn HttpClient>,
    trace_sampler: Arc<TraceSampler>,
    traces_url: String,
    queue: Mutex<PendingQueue>,
    failures: Mutex<FailureWindow>,
    flush_task: Mutex<Option<CancelToken>>,
}

struct PendingQueue {
    segments: VecDeque<Vec<SpanData>>,
    capacity: usize,
    dropped_segments: u64,
}

#[derive(Default)]
struct FailureWindow {
    since: Option<Instant>,
    count: u32,
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    rate_by_service: Option<std::collections::HashMap<String, f64>>,
}

impl Collector for DatadogAgent {
    fn send(&self, trace: Vec<SpanData>) {
        if trace.is_empty() || !self.config.enabled() {
            return;
        }

        let mut queue = self.queue.lock().unwrap();
        if queue.segments.len() >= queue.capacity {
            queue.segments.pop_front();
            queue.dropped_segments += 1;
        }
        queue.segments.push_back(trace);
    }
}

impl DatadogAgent {
    pub fn new(
        config: Arc<Config>,
        http: Arc<dyn HttpClient>,
        trace_sampler: Arc<TraceSampler>,
    ) -> Arc<Self> {
        let traces_url = format!(
            "{}{TRACES_ENDPOINT}",
            config.trace_agent_url().trim_end_matches('/')
        );
        Arc::new(DatadogAgent {
            config,
            http,
            trace_sampler,
            traces_url,
            queue: Mutex::new(PendingQueue {
                segments: VecDeque::new(),
                capacity: DEFAULT_QUEUE_CAPACITY,
                dropped_segments: 0,
            }),
            failures: Mutex::new(FailureWindow::default()),
            flush_task: Mutex::new(None),
        })
    }

    /// Registers the periodic flush on the scheduler's worker thread.
    pub(crate) fn start_flush_task(self: &Arc<Self>, scheduler: &EventScheduler) {
        let weak = Arc::downgrade(self);
        let token = scheduler.schedule_recurring(
            self.config.flush_interval(),
            Box::new(move || {
                if let Some(agent) = weak.upgrade() {
                    agent.flush();
                }
            }),
        );
        *self.flush_task.lock().unwrap() = Some(token);
    }

    /// Swaps out the pending queue, encodes it and ships it to the agent.
    ///
    /// Failed batches are not retried; their spans are gone. Repeated
    /// failures escalate from warn to error after a minute.
    pub fn flush(&self) {
        let (mut batch, dropped) = {
            let mut queue = self.queue.lock().unwrap();
            if queue.segments.is_empty() {
                return;
            }
            let segments: Vec<Vec<SpanData>> = mem::take(&mut queue.segments).into();
            let dropped = mem::take(&mut queue.dropped_segments);
            (segments, dropped)
        };

        if dropped > 0 {
            dd_warn!("DatadogAgent.flush: dropped {dropped} trace segments on queue overflow");
            if let Some(root) = first_root_span(&mut batch) {
                root.numeric_tags.insert(
                    constants::DROPPED_SEGMENTS_TAG_KEY.to_string(),
                    dropped as f64,
                );
            }
        }

        // The limiter's effective rate converges over its window; report the
        // value as of delivery rather than as of each decision
        let limiter_rate = self.trace_sampler.limiter_effective_rate();
        for trace in &mut batch {
            for span in trace {
                if span
                    .numeric_tags
                    .contains_key(constants::SAMPLING_LIMIT_RATE_TAG_KEY)
                {
                    span.numeric_tags.insert(
                        constants::SAMPLING_LIMIT_RATE_TAG_KEY.to_string(),
                        limiter_rate,
                    );
                }
            }
        }

        let payload = match encode_traces(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                dd_error!("DatadogAgent.flush: failed to encode traces: {e}");
                return;
            }
        };

        let headers = self.request_headers(batch.len());
        match self.http.post(&self.traces_url, &headers, payload) {
            Ok(response) if response.is_success() => {
                *self.failures.lock().unwrap() = FailureWindow::default();
                self.apply_agent_response(&response.body);
            }
            Ok(response) => {
                self.note_failure(format_args!("agent returned status {}", response.status));
            }
            Err(e) => self.note_failure(format_args!("{e}")),
        }
    }

    /// Cancels the periodic flush and performs one final flush, bounded by
    /// `timeout`. Whatever the flush could not deliver in time is discarded.
    pub(crate) fn shutdown(self: &Arc<Self>, timeout: Duration) {
        let token = self.flush_task.lock().unwrap().take();
        if let Some(token) = token {
            token.cancel();
        }

        let agent = self.clone();
        let (tx, rx) = mpsc::channel();
        let flusher = thread::Builder::new()
            .name("dd-trace-final-flush".to_string())
            .spawn(move || {
                agent.flush();
                let _ = tx.send(());
            });

        match flusher {
            Ok(_handle) => {
                if rx.recv_timeout(timeout).is_err() {
                    dd_warn!(
                        "DatadogAgent.shutdown: final flush did not complete within {}ms, \
                         discarding pending traces",
                        timeout.as_millis()
                    );
                }
            }
            Err(_) => self.flush(),
        }
    }

    fn request_headers(&self, trace_count: usize) -> Vec<(String, String)> {
        let mut headers = vec![
            (
                "Content-Type".to_string(),
                "application/msgpack".to_string(),
            ),
            ("X-Datadog-Trace-Count".to_string(), trace_count.to_string()),
            (
                "Datadog-Meta-Lang".to_string(),
                self.config.language().to_string(),
            ),
            (
                "Datadog-Meta-Lang-Version".to_string(),
                self.config.language_version().to_string(),
            ),
            (
                "Datadog-Meta-Tracer-Version".to_string(),
                self.config.tracer_version().to_string(),
            ),
        ];
        if self.config.client_computed_stats() {
            headers.push((
                "Datadog-Client-Computed-Stats".to_string(),
                "yes".to_string(),
            ));
        }
        headers
    }

    fn apply_agent_response(&self, body: &[u8]) {
        if body.is_empty() {
            return;
        }
        match serde_json::from_slice::<AgentResponse>(body) {
            Ok(AgentResponse {
                rate_by_service: Some(rates),
            }) => {
                dd_debug!(
                    "DatadogAgent.flush: agent pushed sampling rates for {} services",
                    rates.len()
                );
                self.trace_sampler.update_agent_rates(rates);
            }
            Ok(AgentResponse {
                rate_by_service: None,
            }) => {}
            Err(e) => {
                dd_warn!(
                    "[{}] failed to parse the agent response: {e}",
                    ErrorCode::AgentResponseMalformed.as_str()
                );
            }
        }
    }

    fn note_failure(&self, message: std::fmt::Arguments<'_>) {
        let mut failures = self.failures.lock().unwrap();
        failures.count += 1;
        let now = Instant::now();
        match failures.since {
            None => {
                failures.since = Some(now);
                dd_warn!(
                    "[{}] failed to deliver traces: {message}",
                    ErrorCode::AgentHttpFailure.as_str()
                );
            }
            Some(since) if now.duration_since(since) >= FAILURE_ESCALATION_WINDOW => {
                dd_error!(
                    "[{}] trace delivery has been failing for over a minute ({} failures): \
                     {message}",
                    ErrorCode::AgentHttpFailure.as_str(),
                    failures.count
                );
                failures.since = Some(now);
                failures.count = 0;
            }
            Some(_) => {
                dd_warn!(
                    "[{}] failed to deliver traces: {message}",
                    ErrorCode::AgentHttpFailure.as_str()
                );
            }
        }
    }
}

/// The root span of the first segment in the batch, for best-effort batch
/// level tags.
fn first_root_span(batch: &mut [Vec<SpanData>]) -> Option<&mut SpanData> {
    let first = batch.first_mut()?;
    let index = first
        .iter()
        .position(|span| span.parent_id == 0)
        .unwrap_or(0);
    first.get_mut(index)
}

/// Encodes traces in the agent's v0.4 wire format: an outer array of traces,
/// each an array of span maps.
pub(crate) fn encode_traces(traces: &[Vec<SpanData>]) -> dd_trace::Result<Vec<u8>> {
    let mut packer = Packer::with_capacity(512 * traces.len());
    packer.pack_array_len(traces.len())?;
    for trace in traces {
        packer.pack_array_len(trace.len())?;
        for span in trace {
            encode_span(&mut packer, span)?;
        }
    }
    Ok(packer.into_inner())
}

fn encode_span(packer: &mut Packer, span: &SpanData) -> dd_trace::Result<()> {
    let mut meta: BTreeMap<&str, &str> = span
        .tags
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if let Some(environment) = &span.environment {
        meta.insert(constants::ENVIRONMENT_TAG_KEY, environment);
    }
    if let Some(version) = &span.version {
        meta.insert(constants::VERSION_TAG_KEY, version);
    }

    let field_count = 11 + usize::from(span.span_type.is_some());
    packer.pack_map_len(field_count)?;

    packer.pack_str("service")?;
    packer.pack_str(&span.service)?;

    packer.pack_str("name")?;
    packer.pack_str(&span.name)?;

    packer.pack_str("resource")?;
    packer.pack_str(&span.resource)?;

    packer.pack_str("trace_id")?;
    packer.pack_uint(span.trace_id as u64);

    packer.pack_str("span_id")?;
    packer.pack_uint(span.span_id);

    packer.pack_str("parent_id")?;
    packer.pack_uint(span.parent_id);

    packer.pack_str("start")?;
    let start = span
        .start
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or(0);
    packer.pack_int(start);

    packer.pack_str("duration")?;
    packer.pack_int(span.duration.as_nanos() as i64);

    packer.pack_str("error")?;
    packer.pack_int(i64::from(span.error));

    packer.pack_str("meta")?;
    packer.pack_map_len(meta.len())?;
    for (key, value) in meta {
        packer.pack_str(key)?;
        packer.pack_str(value)?;
    }

    packer.pack_str("metrics")?;
    packer.pack_map_len(span.numeric_tags.len())?;
    for (key, value) in &span.numeric_tags {
        packer.pack_str(key)?;
        packer.pack_f64(*value);
    }

    if let Some(span_type) = &span.span_type {
        packer.pack_str("type")?;
        packer.pack_str(span_type)?;
    }

    Ok(())
}
