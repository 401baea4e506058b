// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{borrow::Cow, ops::Deref, sync::OnceLock, time::Duration};

use crate::{
    configuration::{
        sampling_rules::{parse_span_sampling_rules, parse_trace_sampling_rules},
        sources::{CompositeConfigSourceResult, CompositeSource},
        SpanSamplingRuleConfig, TracePropagationStyle, TraceSamplingRuleConfig,
    },
    log::LogLevelFilter,
    rate::Rate,
    Error, ErrorCode, Result,
};

pub const TRACER_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_AGENT_URL: &str = "http://localhost:8126";
const DEFAULT_AGENT_PORT: u16 = 8126;
const DEFAULT_TRACE_RATE_LIMIT: f64 = 200.0;
const DEFAULT_TAGS_HEADER_MAX_LENGTH: usize = 512;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

fn default_propagation_styles() -> Vec<TracePropagationStyle> {
    vec![
        TracePropagationStyle::Datadog,
        TracePropagationStyle::TraceContext,
    ]
}

/// Finalized configuration for the Datadog tracer.
///
/// Values are pulled from the environment and overridden in code through the
/// builder. [`ConfigBuilder::build`] is the only fallible step: once a
/// `Config` exists, constructing a tracer from it cannot fail.
///
/// # Usage
/// ```
/// use dd_trace::Config;
///
/// let mut builder = Config::builder();
///
/// builder
///     .set_service("my-service".to_string())
///     .set_version("1.0.0".to_string());
///
/// let config = builder.build().expect("config is valid");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    // # Global
    runtime_id: &'static str,

    // # Tracer
    tracer_version: &'static str,
    language: &'static str,
    language_version: String,

    // # Service tagging
    service: String,
    env: Option<String>,
    version: Option<String>,

    // # Agent
    /// Default tags added to every span, parsed from `DD_TAGS` (`k:v,k:v`)
    global_tags: Vec<(String, String)>,
    /// url of the trace agent
    trace_agent_url: Cow<'static, str>,

    // # Trace sampling
    /// Default sample rate applied when no rule and no agent rate matches
    trace_sample_rate: Option<Rate>,
    /// Maximum number of locally-sampled traces per second, per process
    trace_rate_limit: f64,
    trace_sampling_rules: Vec<TraceSamplingRuleConfig>,
    span_sampling_rules: Vec<SpanSamplingRuleConfig>,

    // # Propagation
    trace_propagation_style_extract: Vec<TracePropagationStyle>,
    trace_propagation_style_inject: Vec<TracePropagationStyle>,
    /// Decoded-length cap on the `x-datadog-tags` header
    tags_header_max_length: usize,

    // # Behavior
    report_hostname: bool,
    hostname: Option<String>,
    startup_logs: bool,
    /// Disables shipping traces if this is false
    enabled: bool,
    log_level: LogLevelFilter,
    client_computed_stats: bool,

    // # Delivery tuning
    flush_interval: Duration,
    request_timeout: Duration,
    shutdown_timeout: Duration,
}

fn to_val<T>(res: CompositeConfigSourceResult<T>) -> Option<T> {
    res.value.map(|c| c.value)
}

impl Config {
    /// Creates a new builder over the default configuration sources
    /// (environment variables).
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::with_sources(CompositeSource::default_sources())
    }

    pub fn runtime_id(&self) -> &str {
        self.runtime_id
    }

    pub fn tracer_version(&self) -> &str {
        self.tracer_version
    }

    pub fn language(&self) -> &str {
        self.language
    }

    pub fn language_version(&self) -> &str {
        &self.language_version
    }

    pub fn service(&self) -> &str {
        self.service.deref()
    }

    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn global_tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.global_tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn trace_agent_url(&self) -> &str {
        &self.trace_agent_url
    }

    pub fn trace_sample_rate(&self) -> Option<Rate> {
        self.trace_sample_rate
    }

    pub fn trace_rate_limit(&self) -> f64 {
        self.trace_rate_limit
    }

    pub fn trace_sampling_rules(&self) -> &[TraceSamplingRuleConfig] {
        &self.trace_sampling_rules
    }

    pub fn span_sampling_rules(&self) -> &[SpanSamplingRuleConfig] {
        &self.span_sampling_rules
    }

    pub fn trace_propagation_style_extract(&self) -> &[TracePropagationStyle] {
        &self.trace_propagation_style_extract
    }

    pub fn trace_propagation_style_inject(&self) -> &[TracePropagationStyle] {
        &self.trace_propagation_style_inject
    }

    pub fn tags_header_max_length(&self) -> usize {
        self.tags_header_max_length
    }

    pub fn report_hostname(&self) -> bool {
        self.report_hostname
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn startup_logs(&self) -> bool {
        self.startup_logs
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_level(&self) -> LogLevelFilter {
        self.log_level
    }

    pub fn client_computed_stats(&self) -> bool {
        self.client_computed_stats
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// One-line JSON description of the finalized configuration, logged once
    /// at startup when startup logs are enabled.
    pub fn startup_summary(&self) -> String {
        serde_json::json!({
            "version": self.tracer_version,
            "lang": self.language,
            "lang_version": self.language_version,
            "runtime_id": self.runtime_id,
            "service": self.service,
            "env": self.env,
            "dd_version": self.version,
            "agent_url": self.trace_agent_url.as_ref(),
            "sample_rate": self.trace_sample_rate.map(|r| r.value()),
            "rate_limit": self.trace_rate_limit,
            "trace_sampling_rules": self.trace_sampling_rules.len(),
            "span_sampling_rules": self.span_sampling_rules.len(),
            "propagation_style_extract": self
                .trace_propagation_style_extract
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "propagation_style_inject": self
                .trace_propagation_style_inject
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "report_hostname": self.report_hostname,
            "enabled": self.enabled,
        })
        .to_string()
    }

    /// Static runtime id of the process
    fn process_runtime_id() -> &'static str {
        static RUNTIME_ID: OnceLock<String> = OnceLock::new();
        RUNTIME_ID.get_or_init(|| uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Default)]
pub struct ConfigBuilder {
    sources: Option<CompositeSource>,

    service: Option<String>,
    env: Option<String>,
    version: Option<String>,
    language_version: Option<String>,
    global_tags: Option<Vec<(String, String)>>,
    trace_agent_url: Option<String>,
    trace_sample_rate: Option<Rate>,
    trace_rate_limit: Option<f64>,
    trace_sampling_rules: Option<Vec<TraceSamplingRuleConfig>>,
    span_sampling_rules: Option<Vec<SpanSamplingRuleConfig>>,
    trace_propagation_style_extract: Option<Vec<TracePropagationStyle>>,
    trace_propagation_style_inject: Option<Vec<TracePropagationStyle>>,
    tags_header_max_length: Option<usize>,
    report_hostname: Option<bool>,
    hostname: Option<String>,
    startup_logs: Option<bool>,
    enabled: Option<bool>,
    log_level: Option<LogLevelFilter>,
    client_computed_stats: Option<bool>,
    flush_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    shutdown_timeout: Option<Duration>,
}

impl ConfigBuilder {
    fn with_sources(sources: CompositeSource) -> Self {
        ConfigBuilder {
            sources: Some(sources),
            ..ConfigBuilder::default()
        }
    }

    /// Finalizes the builder, validating overrides and environment together.
    pub fn build(self) -> Result<Config> {
        let sources = self
            .sources
            .unwrap_or_else(CompositeSource::default_sources);

        let service = self
            .service
            .or_else(|| to_val(sources.get("DD_SERVICE")))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::ServiceNameRequired,
                    "a service name is required; set one in code or with DD_SERVICE",
                )
            })?;

        let env = self.env.or_else(|| to_val(sources.get("DD_ENV")));
        let version = self.version.or_else(|| to_val(sources.get("DD_VERSION")));

        let global_tags = match self.global_tags {
            Some(tags) => tags,
            None => to_val(sources.get("DD_TAGS"))
                .map(|raw| parse_tags(&raw))
                .unwrap_or_default(),
        };

        let trace_agent_url = match self.trace_agent_url {
            Some(url) => Cow::Owned(url),
            None => resolve_agent_url(&sources)?,
        };

        let trace_sample_rate = match self.trace_sample_rate {
            Some(rate) => Some(rate),
            None => to_val(sources.get("DD_TRACE_SAMPLE_RATE"))
                .map(|raw| {
                    raw.parse::<Rate>()
                        .map_err(|e| e.with_prefix("DD_TRACE_SAMPLE_RATE"))
                })
                .transpose()?,
        };

        let trace_rate_limit = match self.trace_rate_limit {
            Some(limit) => limit,
            None => match to_val(sources.get("DD_TRACE_RATE_LIMIT")) {
                Some(raw) => parse_rate_limit(&raw)?,
                None => DEFAULT_TRACE_RATE_LIMIT,
            },
        };

        let trace_sampling_rules = match self.trace_sampling_rules {
            Some(rules) => rules,
            None => match to_val(sources.get("DD_TRACE_SAMPLING_RULES")) {
                Some(json) => parse_trace_sampling_rules(&json)
                    .map_err(|e| e.with_prefix("DD_TRACE_SAMPLING_RULES"))?,
                None => Vec::new(),
            },
        };

        let span_sampling_rules = match self.span_sampling_rules {
            Some(rules) => rules,
            None => match to_val(sources.get("DD_SPAN_SAMPLING_RULES")) {
                Some(json) => parse_span_sampling_rules(&json)
                    .map_err(|e| e.with_prefix("DD_SPAN_SAMPLING_RULES"))?,
                None => Vec::new(),
            },
        };

        let shared_styles = to_val(sources.get("DD_TRACE_PROPAGATION_STYLE"));

        let trace_propagation_style_extract = match self.trace_propagation_style_extract {
            Some(styles) => styles,
            None => match to_val(sources.get("DD_TRACE_PROPAGATION_STYLE_EXTRACT"))
                .or_else(|| shared_styles.clone())
            {
                Some(raw) => parse_styles(&raw)?,
                None => default_propagation_styles(),
            },
        };

        let trace_propagation_style_inject = match self.trace_propagation_style_inject {
            Some(styles) => styles,
            None => match to_val(sources.get("DD_TRACE_PROPAGATION_STYLE_INJECT"))
                .or_else(|| shared_styles.clone())
            {
                Some(raw) => parse_styles(&raw)?,
                None => default_propagation_styles(),
            },
        };

        let tags_header_max_length = match self.tags_header_max_length {
            Some(length) => length,
            None => match to_val(sources.get("DD_TRACE_X_DATADOG_TAGS_MAX_LENGTH")) {
                Some(raw) => parse_non_negative(&raw, "DD_TRACE_X_DATADOG_TAGS_MAX_LENGTH")?,
                None => DEFAULT_TAGS_HEADER_MAX_LENGTH,
            },
        };

        let report_hostname = match self.report_hostname {
            Some(report) => report,
            None => match to_val(sources.get("DD_TRACE_REPORT_HOSTNAME")) {
                Some(raw) => parse_bool(&raw, "DD_TRACE_REPORT_HOSTNAME")?,
                None => false,
            },
        };

        #[allow(clippy::disallowed_methods)]
        let hostname = if report_hostname {
            self.hostname.or_else(|| std::env::var("HOSTNAME").ok())
        } else {
            None
        };

        let startup_logs = match self.startup_logs {
            Some(startup_logs) => startup_logs,
            None => match to_val(sources.get("DD_TRACE_STARTUP_LOGS")) {
                Some(raw) => parse_bool(&raw, "DD_TRACE_STARTUP_LOGS")?,
                None => true,
            },
        };

        let enabled = match self.enabled {
            Some(enabled) => enabled,
            None => match to_val(sources.get("DD_TRACE_ENABLED")) {
                Some(raw) => parse_bool(&raw, "DD_TRACE_ENABLED")?,
                None => true,
            },
        };

        let log_level = match self.log_level {
            Some(level) => level,
            None => to_val(sources.get_parse::<LogLevelFilter>("DD_LOG_LEVEL"))
                .unwrap_or_default(),
        };

        Ok(Config {
            runtime_id: Config::process_runtime_id(),
            tracer_version: TRACER_VERSION,
            language: "rust",
            language_version: self
                .language_version
                .unwrap_or_else(|| "unknown".to_string()),
            service,
            env,
            version,
            global_tags,
            trace_agent_url,
            trace_sample_rate,
            trace_rate_limit,
            trace_sampling_rules,
            span_sampling_rules,
            trace_propagation_style_extract,
            trace_propagation_style_inject,
            tags_header_max_length,
            report_hostname,
            hostname,
            startup_logs,
            enabled,
            log_level,
            client_computed_stats: self.client_computed_stats.unwrap_or(false),
            flush_interval: self.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
        })
    }

    pub fn set_service(&mut self, service: String) -> &mut Self {
        self.service = Some(service);
        self
    }

    pub fn set_env(&mut self, env: String) -> &mut Self {
        self.env = Some(env);
        self
    }

    pub fn set_version(&mut self, version: String) -> &mut Self {
        self.version = Some(version);
        self
    }

    pub fn set_language_version(&mut self, language_version: String) -> &mut Self {
        self.language_version = Some(language_version);
        self
    }

    pub fn set_global_tags(&mut self, tags: Vec<(String, String)>) -> &mut Self {
        self.global_tags = Some(tags);
        self
    }

    pub fn add_global_tag(&mut self, key: String, value: String) -> &mut Self {
        self.global_tags
            .get_or_insert_with(Vec::new)
            .push((key, value));
        self
    }

    pub fn set_trace_agent_url(&mut self, url: String) -> &mut Self {
        self.trace_agent_url = Some(url);
        self
    }

    pub fn set_trace_sample_rate(&mut self, rate: Rate) -> &mut Self {
        self.trace_sample_rate = Some(rate);
        self
    }

    pub fn set_trace_rate_limit(&mut self, rate_limit: f64) -> &mut Self {
        self.trace_rate_limit = Some(rate_limit);
        self
    }

    pub fn set_trace_sampling_rules(&mut self, rules: Vec<TraceSamplingRuleConfig>) -> &mut Self {
        self.trace_sampling_rules = Some(rules);
        self
    }

    pub fn set_span_sampling_rules(&mut self, rules: Vec<SpanSamplingRuleConfig>) -> &mut Self {
        self.span_sampling_rules = Some(rules);
        self
    }

    pub fn set_trace_propagation_style_extract(
        &mut self,
        styles: Vec<TracePropagationStyle>,
    ) -> &mut Self {
        self.trace_propagation_style_extract = Some(styles);
        self
    }

    pub fn set_trace_propagation_style_inject(
        &mut self,
        styles: Vec<TracePropagationStyle>,
    ) -> &mut Self {
        self.trace_propagation_style_inject = Some(styles);
        self
    }

    pub fn set_tags_header_max_length(&mut self, length: usize) -> &mut Self {
        self.tags_header_max_length = Some(length);
        self
    }

    pub fn set_report_hostname(&mut self, report: bool) -> &mut Self {
        self.report_hostname = Some(report);
        self
    }

    pub fn set_hostname(&mut self, hostname: String) -> &mut Self {
        self.hostname = Some(hostname);
        self
    }

    pub fn set_startup_logs(&mut self, startup_logs: bool) -> &mut Self {
        self.startup_logs = Some(startup_logs);
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) -> &mut Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn set_log_level(&mut self, log_level: LogLevelFilter) -> &mut Self {
        self.log_level = Some(log_level);
        self
    }

    pub fn set_client_computed_stats(&mut self, enabled: bool) -> &mut Self {
        self.client_computed_stats = Some(enabled);
        self
    }

    pub fn set_flush_interval(&mut self, interval: Duration) -> &mut Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn set_shutdown_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.shutdown_timeout = Some(timeout);
        self
    }
}

fn parse_tags(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (entry.to_string(), String::new()),
        })
        .collect()
}

fn parse_styles(raw: &str) -> Result<Vec<TracePropagationStyle>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<TracePropagationStyle>()
                .map_err(|e| Error::new(ErrorCode::Other, e))
        })
        .collect()
}

fn parse_bool(raw: &str, name: &str) -> Result<bool> {
    if raw.eq_ignore_ascii_case("true") || raw == "1" {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") || raw == "0" {
        Ok(false)
    } else {
        Err(Error::new(
            ErrorCode::Other,
            format!("{name} should be a boolean, got {raw:?}"),
        ))
    }
}

fn parse_rate_limit(raw: &str) -> Result<f64> {
    let limit = raw.parse::<f64>().map_err(|_| {
        Error::new(
            ErrorCode::InvalidInteger,
            format!("DD_TRACE_RATE_LIMIT is not a number: {raw:?}"),
        )
    })?;
    if !limit.is_finite() || limit < 0.0 {
        return Err(Error::new(
            ErrorCode::OutOfRangeInteger,
            format!("DD_TRACE_RATE_LIMIT must be non-negative, got {raw:?}"),
        ));
    }
    Ok(limit)
}

fn parse_non_negative(raw: &str, name: &str) -> Result<usize> {
    let value = raw.parse::<i64>().map_err(|_| {
        Error::new(
            ErrorCode::InvalidInteger,
            format!("{name} is not an integer: {raw:?}"),
        )
    })?;
    usize::try_from(value).map_err(|_| {
        Error::new(
            ErrorCode::OutOfRangeInteger,
            format!("{name} must be non-negative, got {raw:?}"),
        )
    })
}

fn parse_port(raw: &str) -> Result<u16> {
    let port = raw.parse::<i64>().map_err(|_| {
        Error::new(
            ErrorCode::InvalidInteger,
            format!("DD_TRACE_AGENT_PORT is not an integer: {raw:?}"),
        )
    })?;
    if !(1..=i64::from(u16::MAX)).contains(&port) {
        return Err(Error::new(
            ErrorCode::OutOfRangeInteger,
            format!("DD_TRACE_AGENT_PORT out of range: {raw:?}"),
        ));
    }
    Ok(port as u16)
}

fn resolve_agent_url(sources: &CompositeSource) -> Result<Cow<'static, str>> {
    if let Some(url) = to_val(sources.get("DD_TRACE_AGENT_URL")) {
        return Ok(Cow::Owned(url));
    }

    let host = to_val(sources.get("DD_AGENT_HOST"));
    let port = to_val(sources.get("DD_TRACE_AGENT_PORT"));
    if host.is_none() && port.is_none() {
        return Ok(Cow::Borrowed(DEFAULT_AGENT_URL));
    }

    let host = host.unwrap_or_else(|| "localhost".to_string());
    let port = match port {
        Some(raw) => parse_port(&raw)?,
        None => DEFAULT_AGENT_PORT,
    };
    Ok(Cow::Owned(format!("http://{host}:{port}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{Config, ConfigBuilder};
    use crate::{
        configuration::{
            sources::{CompositeSource, ConfigSourceOrigin, HashMapSource},
            TracePropagationStyle,
        },
        ErrorCode, Rate,
    };

    fn builder_with_env<'a, T: IntoIterator<Item = (&'a str, &'a str)>>(vars: T) -> ConfigBuilder {
        let mut sources = CompositeSource::new();
        sources.add_source(HashMapSource::from_iter(vars, ConfigSourceOrigin::EnvVar));
        ConfigBuilder::with_sources(sources)
    }

    #[test]
    fn test_config_from_source() {
        let config = builder_with_env([
            ("DD_SERVICE", "test-service"),
            ("DD_ENV", "test-env"),
            ("DD_VERSION", "x.y.z"),
            ("DD_TAGS", "abc:def,foo:bar"),
            ("DD_TRACE_AGENT_URL", "http://localhost:1234"),
            ("DD_TRACE_SAMPLE_RATE", "0.25"),
            ("DD_TRACE_RATE_LIMIT", "100"),
            ("DD_TRACE_ENABLED", "false"),
            ("DD_LOG_LEVEL", "DEBUG"),
            (
                "DD_TRACE_SAMPLING_RULES",
                r#"{"rules":[{"sample_rate":0.5,"service":"web-api"}]}"#,
            ),
            ("DD_TRACE_PROPAGATION_STYLE_EXTRACT", "tracecontext,b3"),
        ])
        .build()
        .unwrap();

        assert_eq!(config.service(), "test-service");
        assert_eq!(config.env(), Some("test-env"));
        assert_eq!(config.version(), Some("x.y.z"));
        assert_eq!(
            config.global_tags().collect::<Vec<_>>(),
            vec![("abc", "def"), ("foo", "bar")]
        );
        assert_eq!(config.trace_agent_url(), "http://localhost:1234");
        assert_eq!(config.trace_sample_rate(), Some(Rate::try_new(0.25).unwrap()));
        assert_eq!(config.trace_rate_limit(), 100.0);
        assert!(!config.enabled());
        assert_eq!(config.log_level(), crate::log::LogLevelFilter::Debug);
        assert_eq!(config.trace_sampling_rules().len(), 1);
        assert_eq!(
            config.trace_propagation_style_extract(),
            &[
                TracePropagationStyle::TraceContext,
                TracePropagationStyle::B3
            ]
        );
        // inject style untouched, falls back to defaults
        assert_eq!(
            config.trace_propagation_style_inject(),
            &[
                TracePropagationStyle::Datadog,
                TracePropagationStyle::TraceContext
            ]
        );
    }

    #[test]
    fn test_config_manual_override() {
        let mut builder = builder_with_env([
            ("DD_SERVICE", "env-service"),
            ("DD_ENV", "env-env"),
            ("DD_TRACE_AGENT_URL", "http://localhost:1234"),
        ]);
        builder.set_service("manual-service".to_string());
        builder.set_env("manual-env".to_string());
        builder.set_version("manual-version".to_string());
        builder.add_global_tag("manual".to_string(), "tag".to_string());
        builder.set_trace_agent_url("http://localhost:4321".to_string());
        builder.set_trace_rate_limit(200.0);
        builder.set_flush_interval(Duration::from_millis(500));

        let config = builder.build().unwrap();

        assert_eq!(config.service(), "manual-service");
        assert_eq!(config.env(), Some("manual-env"));
        assert_eq!(config.version(), Some("manual-version"));
        assert_eq!(
            config.global_tags().collect::<Vec<_>>(),
            vec![("manual", "tag")]
        );
        assert_eq!(config.trace_agent_url(), "http://localhost:4321");
        assert_eq!(config.trace_rate_limit(), 200.0);
        assert_eq!(config.flush_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_service_is_required() {
        let error = builder_with_env([("DD_ENV", "prod")]).build().unwrap_err();
        assert_eq!(error.code, ErrorCode::ServiceNameRequired);
    }

    #[test]
    fn test_sample_rate_out_of_range() {
        let error = builder_with_env([
            ("DD_SERVICE", "svc"),
            ("DD_TRACE_SAMPLE_RATE", "1.5"),
        ])
        .build()
        .unwrap_err();
        assert_eq!(error.code, ErrorCode::RateOutOfRange);
    }

    #[test]
    fn test_agent_host_and_port_compose_url() {
        let config = builder_with_env([
            ("DD_SERVICE", "svc"),
            ("DD_AGENT_HOST", "agent.internal"),
            ("DD_TRACE_AGENT_PORT", "9126"),
        ])
        .build()
        .unwrap();
        assert_eq!(config.trace_agent_url(), "http://agent.internal:9126");
    }

    #[test]
    fn test_agent_port_validation() {
        let invalid = builder_with_env([
            ("DD_SERVICE", "svc"),
            ("DD_TRACE_AGENT_PORT", "not-a-port"),
        ])
        .build()
        .unwrap_err();
        assert_eq!(invalid.code, ErrorCode::InvalidInteger);

        let out_of_range = builder_with_env([
            ("DD_SERVICE", "svc"),
            ("DD_TRACE_AGENT_PORT", "99999"),
        ])
        .build()
        .unwrap_err();
        assert_eq!(out_of_range.code, ErrorCode::OutOfRangeInteger);
    }

    #[test]
    fn test_default_agent_url() {
        let config = builder_with_env([("DD_SERVICE", "svc")]).build().unwrap();
        assert_eq!(config.trace_agent_url(), "http://localhost:8126");
    }

    #[test]
    fn test_startup_summary_mentions_service() {
        let config = builder_with_env([("DD_SERVICE", "svc"), ("DD_ENV", "prod")])
            .build()
            .unwrap();
        let summary = config.startup_summary();
        assert!(summary.contains("\"service\":\"svc\""));
        assert!(summary.contains("\"env\":\"prod\""));
    }

    #[test]
    fn test_runtime_id_is_stable() {
        let a = builder_with_env([("DD_SERVICE", "svc")]).build().unwrap();
        let b = builder_with_env([("DD_SERVICE", "svc")]).build().unwrap();
        assert_eq!(a.runtime_id(), b.runtime_id());
        assert!(!Config::process_runtime_id().is_empty());
    }
}
