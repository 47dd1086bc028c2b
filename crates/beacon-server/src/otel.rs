//! OTLP JSON parsing: log records and metric data points into normalized
//! events.
//!
//! Log records map producer event names onto the ingest contract's event
//! types. Metric data points carry token/cost counters; cumulative series
//! are converted to deltas against a per-process last-value map (which
//! resets on restart — continuity across restarts is explicitly not a
//! goal). Protobuf payloads are rejected at the HTTP layer before any of
//! this runs.

use std::collections::HashMap;

use beacon_core::contract::NormalizedEvent;
use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

/// Producer event names that never become ingest events.
const SKIP_EVENTS: &[&str] = &[
    "codex.sse_event",
    "codex.websocket.event",
    "claude_code.response",
    "codex.response",
];

const TOKEN_METRICS: &[&str] = &[
    "claude_code.token.usage",
    "codex_cli_rs.token.usage",
    "gen_ai.client.token.usage",
];

const COST_METRICS: &[&str] = &[
    "claude_code.cost.usage",
    "codex_cli_rs.cost.usage",
    "gen_ai.client.cost.usage",
];

/// Body keys promoted to event columns (and therefore dropped from
/// metadata).
const PROMOTED_BODY_KEYS: &[&str] = &[
    "session_id",
    "tool_name",
    "model",
    "input_tokens",
    "output_tokens",
    "cache_read_tokens",
    "cache_write_tokens",
    "cost_usd",
    "duration_ms",
    "project",
    "branch",
];

/// OTLP sum aggregation temporality for cumulative series.
const TEMPORALITY_CUMULATIVE: i64 = 2;

/// One token/cost delta derived from a metric data point.
#[derive(Clone, Debug, Default)]
pub struct MetricDelta {
    pub session_id: String,
    pub agent_type: String,
    pub model: Option<String>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cache_read: i64,
    pub cache_write: i64,
    pub cost_usd: f64,
}

impl MetricDelta {
    /// Whether the delta carries anything worth persisting.
    pub fn has_signal(&self) -> bool {
        self.tokens_in > 0
            || self.tokens_out > 0
            || self.cache_read > 0
            || self.cache_write > 0
            || self.cost_usd > 0.0
    }

    /// Turn the delta into a synthetic `llm_response` event.
    pub fn into_event(self) -> NormalizedEvent {
        let cost = (self.cost_usd > 0.0).then_some(self.cost_usd);
        NormalizedEvent {
            event_id: None,
            session_id: self.session_id,
            agent_type: self.agent_type,
            event_type: "llm_response".into(),
            tool_name: None,
            status: "success".into(),
            tokens_in: self.tokens_in,
            tokens_out: self.tokens_out,
            cache_read_tokens: self.cache_read,
            cache_write_tokens: self.cache_write,
            branch: None,
            project: None,
            duration_ms: None,
            metadata: json!({ "_synthetic": true, "_source": "otel_metric" }),
            client_timestamp: None,
            model: self.model,
            cost_usd: cost,
            source: Some("otel".into()),
        }
    }
}

/// Parse an OTLP logs envelope into normalized events.
pub fn parse_logs(payload: &Value) -> Vec<NormalizedEvent> {
    let mut events = Vec::new();
    for rl in array(payload.get("resourceLogs")) {
        let resource_attrs = attrs_of(rl.get("resource"));
        for sl in array(rl.get("scopeLogs")) {
            for record in array(sl.get("logRecords")) {
                if let Some(event) = parse_log_record(record, resource_attrs) {
                    events.push(event);
                }
            }
        }
    }
    events
}

/// Parse an OTLP metrics envelope into deltas, updating the cumulative
/// last-value map in place.
pub fn parse_metrics(payload: &Value, counters: &mut HashMap<String, f64>) -> Vec<MetricDelta> {
    let mut deltas = Vec::new();

    for rm in array(payload.get("resourceMetrics")) {
        let resource_attrs = attrs_of(rm.get("resource"));
        let agent_type = resolve_agent_type(resource_attrs);
        let session_id = attr_string(resource_attrs, "gen_ai.session.id")
            .or_else(|| attr_string(resource_attrs, "session.id"))
            .or_else(|| attr_string(resource_attrs, "conversation.id"))
            .unwrap_or_else(|| "unknown".to_string());

        for sm in array(rm.get("scopeMetrics")) {
            for metric in array(sm.get("metrics")) {
                let name = metric.get("name").and_then(Value::as_str).unwrap_or("");
                let token_metric = TOKEN_METRICS.contains(&name);
                let cost_metric = COST_METRICS.contains(&name);
                if !token_metric && !cost_metric {
                    continue;
                }

                let cumulative = metric
                    .get("sum")
                    .and_then(|s| s.get("aggregationTemporality"))
                    .and_then(Value::as_i64)
                    == Some(TEMPORALITY_CUMULATIVE);

                let data_points = metric
                    .get("sum")
                    .and_then(|s| s.get("dataPoints"))
                    .or_else(|| metric.get("gauge").and_then(|g| g.get("dataPoints")));

                for dp in array(data_points) {
                    let value = data_point_value(dp);
                    let dp_attrs = dp.get("attributes").and_then(Value::as_array);
                    let model = attr_string(dp_attrs, "model")
                        .or_else(|| attr_string(dp_attrs, "gen_ai.request.model"))
                        .or_else(|| attr_string(resource_attrs, "model"));
                    let token_type = attr_string(dp_attrs, "type")
                        .or_else(|| attr_string(dp_attrs, "token.type"));

                    let delta = if cumulative {
                        let key = format!(
                            "{session_id}|{agent_type}|{name}|{}|{}",
                            model.as_deref().unwrap_or(""),
                            token_type.as_deref().unwrap_or("")
                        );
                        cumulative_delta(counters, &key, value)
                    } else {
                        value
                    };
                    if delta <= 0.0 {
                        continue;
                    }

                    let mut entry = MetricDelta {
                        session_id: session_id.clone(),
                        agent_type: agent_type.clone(),
                        model,
                        ..MetricDelta::default()
                    };
                    if token_metric {
                        match token_type.as_deref() {
                            Some("output") => entry.tokens_out = delta as i64,
                            Some("cacheRead") | Some("cache_read") => {
                                entry.cache_read = delta as i64;
                            }
                            Some("cacheCreation") | Some("cache_creation")
                            | Some("cache_write") => entry.cache_write = delta as i64,
                            _ => entry.tokens_in = delta as i64,
                        }
                    } else {
                        entry.cost_usd = delta;
                    }
                    deltas.push(entry);
                }
            }
        }
    }

    deltas
}

/// Delta against the last observed value; first sight passes through,
/// regressions clamp to zero.
fn cumulative_delta(counters: &mut HashMap<String, f64>, key: &str, value: f64) -> f64 {
    match counters.insert(key.to_string(), value) {
        None => value,
        Some(previous) => (value - previous).max(0.0),
    }
}

fn parse_log_record(record: &Value, resource_attrs: Option<&Vec<Value>>) -> Option<NormalizedEvent> {
    let log_attrs = record.get("attributes").and_then(Value::as_array);
    let event_name =
        attr_string(log_attrs, "event.name").or_else(|| attr_string(log_attrs, "name"));
    if let Some(name) = event_name.as_deref() {
        if SKIP_EVENTS.contains(&name) {
            return None;
        }
    }

    let body = body_object(record.get("body"));

    let session_id = attr_string(log_attrs, "gen_ai.session.id")
        .or_else(|| attr_string(log_attrs, "conversation.id"))
        .or_else(|| attr_string(resource_attrs, "session.id"))
        .or_else(|| attr_string(resource_attrs, "gen_ai.session.id"))
        .or_else(|| attr_string(resource_attrs, "conversation.id"))
        .or_else(|| body_string(&body, "session_id"))?;

    let agent_type = resolve_agent_type(resource_attrs);
    let severity = record.get("severityText").and_then(Value::as_str);
    let event_type = resolve_event_type(&agent_type, event_name.as_deref(), severity)?;

    let tool_name = attr_string(log_attrs, "gen_ai.tool.name")
        .or_else(|| attr_string(log_attrs, "tool_name"))
        .or_else(|| attr_string(log_attrs, "tool.name"))
        .or_else(|| body_string(&body, "tool_name"));
    let model = attr_string(log_attrs, "gen_ai.request.model")
        .or_else(|| attr_string(log_attrs, "model"))
        .or_else(|| body_string(&body, "model"));

    let tokens_in = attr_number(log_attrs, "gen_ai.usage.input_tokens")
        .or_else(|| body_number(&body, "input_tokens"))
        .unwrap_or(0.0) as i64;
    let tokens_out = attr_number(log_attrs, "gen_ai.usage.output_tokens")
        .or_else(|| body_number(&body, "output_tokens"))
        .unwrap_or(0.0) as i64;
    let cache_read_tokens = attr_number(log_attrs, "gen_ai.usage.cache_read_input_tokens")
        .or_else(|| body_number(&body, "cache_read_tokens"))
        .unwrap_or(0.0) as i64;
    let cache_write_tokens = attr_number(log_attrs, "gen_ai.usage.cache_creation_input_tokens")
        .or_else(|| body_number(&body, "cache_write_tokens"))
        .unwrap_or(0.0) as i64;
    let cost_usd =
        attr_number(log_attrs, "gen_ai.usage.cost").or_else(|| body_number(&body, "cost_usd"));
    let duration_ms = attr_number(log_attrs, "gen_ai.latency")
        .or_else(|| attr_number(log_attrs, "duration_ms"))
        .or_else(|| body_number(&body, "duration_ms"))
        .map(|n| n as i64);

    let project = attr_string(log_attrs, "project")
        .or_else(|| attr_string(resource_attrs, "project"))
        .or_else(|| body_string(&body, "project"));
    let branch = attr_string(log_attrs, "branch")
        .or_else(|| attr_string(resource_attrs, "branch"))
        .or_else(|| body_string(&body, "branch"));

    let client_timestamp =
        nanos_to_iso(record.get("timeUnixNano").and_then(Value::as_str));

    let metadata = match body {
        Some(mut map) => {
            map.retain(|key, _| !PROMOTED_BODY_KEYS.contains(&key.as_str()));
            Value::Object(map)
        }
        None => match record
            .get("body")
            .and_then(|b| b.get("stringValue"))
            .and_then(Value::as_str)
        {
            Some(message) => json!({ "message": message }),
            None => Value::Object(Map::new()),
        },
    };

    let status = if event_type == "error" { "error" } else { "success" };
    Some(NormalizedEvent {
        event_id: None,
        session_id,
        agent_type,
        event_type,
        tool_name,
        status: status.into(),
        tokens_in,
        tokens_out,
        cache_read_tokens,
        cache_write_tokens,
        branch,
        project,
        duration_ms,
        metadata,
        client_timestamp,
        model,
        cost_usd,
        source: Some("otel".into()),
    })
}

/// Agent kind from the resource's service identity.
fn resolve_agent_type(resource_attrs: Option<&Vec<Value>>) -> String {
    let service = attr_string(resource_attrs, "service.name").unwrap_or_default();
    let sdk = attr_string(resource_attrs, "telemetry.sdk.name").unwrap_or_default();
    let combined = format!("{service} {sdk}").to_lowercase();
    if combined.contains("codex") {
        return "codex".to_string();
    }
    if combined.contains("claude") {
        return "claude_code".to_string();
    }
    if !service.is_empty() {
        return service;
    }
    "unknown".to_string()
}

/// Map a producer event name (or ERROR severity) onto the contract enum.
fn resolve_event_type(
    agent_type: &str,
    event_name: Option<&str>,
    severity: Option<&str>,
) -> Option<String> {
    if let Some(name) = event_name {
        let suffix = name.rsplit('.').next().unwrap_or_default();
        let mapped = match suffix {
            "tool_result" | "tool_use" => Some("tool_use"),
            "tool_decision" if agent_type == "codex" => Some("tool_use"),
            "api_request" => Some("llm_request"),
            "api_response" => Some("llm_response"),
            "session_start" => Some("session_start"),
            "session_end" => Some("session_end"),
            "file_change" => Some("file_change"),
            "git_commit" => Some("git_commit"),
            "plan_step" => Some("plan_step"),
            "error" => Some("error"),
            "user_prompt" | "user_prompt_submit" => Some("user_prompt"),
            _ => None,
        };
        if let Some(mapped) = mapped {
            return Some(mapped.to_string());
        }
    }
    if severity == Some("ERROR") {
        return Some("error".to_string());
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// OTLP JSON plumbing
// ─────────────────────────────────────────────────────────────────────────────

fn array(value: Option<&Value>) -> &[Value] {
    value.and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

fn attrs_of(resource: Option<&Value>) -> Option<&Vec<Value>> {
    resource?.get("attributes")?.as_array()
}

fn attr_value<'a>(attrs: Option<&'a Vec<Value>>, key: &str) -> Option<&'a Value> {
    attrs?
        .iter()
        .find(|attr| attr.get("key").and_then(Value::as_str) == Some(key))?
        .get("value")
}

fn attr_string(attrs: Option<&Vec<Value>>, key: &str) -> Option<String> {
    any_value_string(attr_value(attrs, key)?)
}

fn attr_number(attrs: Option<&Vec<Value>>, key: &str) -> Option<f64> {
    any_value_number(attr_value(attrs, key)?)
}

/// An OTLP `AnyValue` as a display string.
fn any_value_string(value: &Value) -> Option<String> {
    if let Some(s) = value.get("stringValue").and_then(Value::as_str) {
        return Some(s.to_string());
    }
    if let Some(raw) = value.get("intValue") {
        if let Some(i) = raw.as_i64() {
            return Some(i.to_string());
        }
        if let Some(s) = raw.as_str() {
            return Some(s.to_string());
        }
    }
    if let Some(f) = value.get("doubleValue").and_then(Value::as_f64) {
        return Some(f.to_string());
    }
    if let Some(b) = value.get("boolValue").and_then(Value::as_bool) {
        return Some(b.to_string());
    }
    None
}

/// An OTLP `AnyValue` as a number (OTLP/JSON encodes int64 as strings).
fn any_value_number(value: &Value) -> Option<f64> {
    if let Some(raw) = value.get("intValue") {
        if let Some(i) = raw.as_i64() {
            return Some(i as f64);
        }
        if let Some(parsed) = raw.as_str().and_then(|s| s.parse::<f64>().ok()) {
            return Some(parsed);
        }
    }
    if let Some(f) = value.get("doubleValue").and_then(Value::as_f64) {
        return Some(f);
    }
    value
        .get("stringValue")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<f64>().ok())
}

/// A `NumberDataPoint`'s value. OTLP/JSON carries doubles as `asDouble`
/// and int64 as `asInt`, the latter usually string-encoded.
fn data_point_value(dp: &Value) -> f64 {
    if let Some(v) = dp.get("asDouble").and_then(Value::as_f64) {
        return v;
    }
    if let Some(raw) = dp.get("asInt") {
        if let Some(i) = raw.as_i64() {
            return i as f64;
        }
        if let Some(parsed) = raw.as_str().and_then(|s| s.parse::<f64>().ok()) {
            return parsed;
        }
    }
    0.0
}

/// A log body as a JSON object: either a kvlist or a string holding JSON.
fn body_object(body: Option<&Value>) -> Option<Map<String, Value>> {
    let body = body?;
    if let Some(values) = body
        .get("kvlistValue")
        .and_then(|kv| kv.get("values"))
        .and_then(Value::as_array)
    {
        let mut map = Map::new();
        for entry in values {
            let key = entry.get("key").and_then(Value::as_str)?;
            let value = entry.get("value")?;
            let plain = any_value_string(value)
                .map(Value::String)
                .or_else(|| value.get("doubleValue").cloned())
                .unwrap_or(Value::Null);
            let _ = map.insert(key.to_string(), plain);
        }
        return Some(map);
    }
    if let Some(text) = body.get("stringValue").and_then(Value::as_str) {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
                return Some(map);
            }
        }
    }
    None
}

fn body_string(body: &Option<Map<String, Value>>, key: &str) -> Option<String> {
    let value = body.as_ref()?.get(key)?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

fn body_number(body: &Option<Map<String, Value>>, key: &str) -> Option<f64> {
    let value = body.as_ref()?.get(key)?;
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn nanos_to_iso(nanos: Option<&str>) -> Option<String> {
    let millis = (nanos?.parse::<u128>().ok()? / 1_000_000) as i64;
    if millis <= 0 {
        return None;
    }
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn logs_envelope(service: &str, records: Value) -> Value {
        json!({
            "resourceLogs": [{
                "resource": {
                    "attributes": [
                        {"key": "service.name", "value": {"stringValue": service}}
                    ]
                },
                "scopeLogs": [{ "logRecords": records }]
            }]
        })
    }

    fn token_metric_envelope(temporality: i64, points: Value) -> Value {
        json!({
            "resourceMetrics": [{
                "resource": {
                    "attributes": [
                        {"key": "service.name", "value": {"stringValue": "claude-code"}},
                        {"key": "session.id", "value": {"stringValue": "sess-m"}}
                    ]
                },
                "scopeMetrics": [{
                    "metrics": [{
                        "name": "claude_code.token.usage",
                        "sum": {
                            "aggregationTemporality": temporality,
                            "dataPoints": points
                        }
                    }]
                }]
            }]
        })
    }

    #[test]
    fn log_record_maps_event_name_and_session() {
        let payload = logs_envelope(
            "claude-code",
            json!([{
                "timeUnixNano": "1760000000000000000",
                "attributes": [
                    {"key": "event.name", "value": {"stringValue": "claude_code.tool_result"}},
                    {"key": "gen_ai.session.id", "value": {"stringValue": "sess-1"}},
                    {"key": "tool_name", "value": {"stringValue": "Bash"}}
                ]
            }]),
        );
        let events = parse_logs(&payload);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.agent_type, "claude_code");
        assert_eq!(event.event_type, "tool_use");
        assert_eq!(event.session_id, "sess-1");
        assert_eq!(event.tool_name.as_deref(), Some("Bash"));
        assert_eq!(event.source.as_deref(), Some("otel"));
        assert!(event.client_timestamp.as_deref().unwrap().starts_with("2025"));
    }

    #[test]
    fn record_without_session_id_dropped() {
        let payload = logs_envelope(
            "claude-code",
            json!([{
                "attributes": [
                    {"key": "event.name", "value": {"stringValue": "claude_code.tool_use"}}
                ]
            }]),
        );
        assert!(parse_logs(&payload).is_empty());
    }

    #[test]
    fn skip_listed_events_dropped() {
        let payload = logs_envelope(
            "codex",
            json!([{
                "attributes": [
                    {"key": "event.name", "value": {"stringValue": "codex.sse_event"}},
                    {"key": "gen_ai.session.id", "value": {"stringValue": "sess-1"}}
                ]
            }]),
        );
        assert!(parse_logs(&payload).is_empty());
    }

    #[test]
    fn unmapped_event_name_dropped_unless_error_severity() {
        let record = |severity: Option<&str>| {
            let mut rec = json!({
                "attributes": [
                    {"key": "event.name", "value": {"stringValue": "claude_code.heartbeat"}},
                    {"key": "gen_ai.session.id", "value": {"stringValue": "sess-1"}}
                ]
            });
            if let Some(s) = severity {
                rec["severityText"] = json!(s);
            }
            logs_envelope("claude-code", json!([rec]))
        };

        assert!(parse_logs(&record(None)).is_empty());
        let errors = parse_logs(&record(Some("ERROR")));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event_type, "error");
        assert_eq!(errors[0].status, "error");
    }

    #[test]
    fn codex_tool_decision_maps_to_tool_use() {
        let payload = logs_envelope(
            "codex",
            json!([{
                "attributes": [
                    {"key": "event.name", "value": {"stringValue": "codex.tool_decision"}},
                    {"key": "conversation.id", "value": {"stringValue": "sess-2"}}
                ]
            }]),
        );
        let events = parse_logs(&payload);
        assert_eq!(events[0].event_type, "tool_use");
        assert_eq!(events[0].agent_type, "codex");
    }

    #[test]
    fn usage_attributes_extracted() {
        let payload = logs_envelope(
            "claude-code",
            json!([{
                "attributes": [
                    {"key": "event.name", "value": {"stringValue": "claude_code.api_response"}},
                    {"key": "gen_ai.session.id", "value": {"stringValue": "sess-1"}},
                    {"key": "gen_ai.request.model", "value": {"stringValue": "claude-sonnet-4-5"}},
                    {"key": "gen_ai.usage.input_tokens", "value": {"intValue": "1200"}},
                    {"key": "gen_ai.usage.output_tokens", "value": {"intValue": 340}},
                    {"key": "gen_ai.usage.cost", "value": {"doubleValue": 0.0123}}
                ]
            }]),
        );
        let event = &parse_logs(&payload)[0];
        assert_eq!(event.event_type, "llm_response");
        assert_eq!(event.tokens_in, 1200);
        assert_eq!(event.tokens_out, 340);
        assert_eq!(event.model.as_deref(), Some("claude-sonnet-4-5"));
        assert!((event.cost_usd.unwrap() - 0.0123).abs() < 1e-12);
    }

    #[test]
    fn body_kvlist_feeds_metadata_without_promoted_keys() {
        let payload = logs_envelope(
            "claude-code",
            json!([{
                "attributes": [
                    {"key": "event.name", "value": {"stringValue": "claude_code.tool_use"}}
                ],
                "body": {"kvlistValue": {"values": [
                    {"key": "session_id", "value": {"stringValue": "sess-b"}},
                    {"key": "command", "value": {"stringValue": "ls -la"}}
                ]}}
            }]),
        );
        let event = &parse_logs(&payload)[0];
        assert_eq!(event.session_id, "sess-b");
        assert_eq!(event.metadata["command"], "ls -la");
        assert!(event.metadata.get("session_id").is_none());
    }

    #[test]
    fn string_body_becomes_message_metadata() {
        let payload = logs_envelope(
            "claude-code",
            json!([{
                "attributes": [
                    {"key": "event.name", "value": {"stringValue": "claude_code.user_prompt"}},
                    {"key": "gen_ai.session.id", "value": {"stringValue": "sess-1"}}
                ],
                "body": {"stringValue": "please fix the build"}
            }]),
        );
        let event = &parse_logs(&payload)[0];
        assert_eq!(event.event_type, "user_prompt");
        assert_eq!(event.metadata["message"], "please fix the build");
    }

    #[test]
    fn cumulative_series_converts_to_deltas() {
        let mut counters = HashMap::new();
        let envelope = |v: i64| {
            token_metric_envelope(
                TEMPORALITY_CUMULATIVE,
                json!([{
                    "asInt": v.to_string(),
                    "attributes": [{"key": "type", "value": {"stringValue": "input"}}]
                }]),
            )
        };

        let first = parse_metrics(&envelope(100), &mut counters);
        assert_eq!(first[0].tokens_in, 100);

        let second = parse_metrics(&envelope(250), &mut counters);
        assert_eq!(second[0].tokens_in, 150);

        let third = parse_metrics(&envelope(260), &mut counters);
        assert_eq!(third[0].tokens_in, 10);
    }

    #[test]
    fn cumulative_regression_clamps_to_zero() {
        let mut counters = HashMap::new();
        let envelope = |v: i64| {
            token_metric_envelope(
                TEMPORALITY_CUMULATIVE,
                json!([{
                    "asInt": v.to_string(),
                    "attributes": [{"key": "type", "value": {"stringValue": "output"}}]
                }]),
            )
        };
        let _ = parse_metrics(&envelope(500), &mut counters);
        // Counter reset upstream: no negative delta, no event.
        assert!(parse_metrics(&envelope(400), &mut counters).is_empty());
    }

    #[test]
    fn delta_temporality_passes_through() {
        let mut counters = HashMap::new();
        let envelope = token_metric_envelope(
            1,
            json!([{
                "asInt": "42",
                "attributes": [{"key": "type", "value": {"stringValue": "cacheRead"}}]
            }]),
        );
        let deltas = parse_metrics(&envelope, &mut counters);
        assert_eq!(deltas[0].cache_read, 42);
        assert!(counters.is_empty(), "delta series should not track state");
    }

    #[test]
    fn cost_metric_produces_cost_delta() {
        let mut counters = HashMap::new();
        let payload = json!({
            "resourceMetrics": [{
                "resource": {"attributes": [
                    {"key": "service.name", "value": {"stringValue": "codex"}},
                    {"key": "conversation.id", "value": {"stringValue": "sess-c"}}
                ]},
                "scopeMetrics": [{
                    "metrics": [{
                        "name": "codex_cli_rs.cost.usage",
                        "sum": {"aggregationTemporality": 2, "dataPoints": [{"asDouble": 1.5}]}
                    }]
                }]
            }]
        });
        let deltas = parse_metrics(&payload, &mut counters);
        assert_eq!(deltas.len(), 1);
        assert!((deltas[0].cost_usd - 1.5).abs() < 1e-12);
        assert_eq!(deltas[0].agent_type, "codex");

        let event = deltas[0].clone().into_event();
        assert_eq!(event.event_type, "llm_response");
        assert_eq!(event.source.as_deref(), Some("otel"));
        assert!((event.cost_usd.unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn unrelated_metrics_ignored() {
        let mut counters = HashMap::new();
        let payload = json!({
            "resourceMetrics": [{
                "resource": {"attributes": []},
                "scopeMetrics": [{
                    "metrics": [{
                        "name": "process.cpu.time",
                        "sum": {"aggregationTemporality": 2, "dataPoints": [{"asDouble": 12.0}]}
                    }]
                }]
            }]
        });
        assert!(parse_metrics(&payload, &mut counters).is_empty());
    }

    #[test]
    fn all_zero_delta_has_no_signal() {
        let delta = MetricDelta::default();
        assert!(!delta.has_signal());
    }

    #[test]
    fn data_point_value_reads_both_encodings() {
        assert!((data_point_value(&json!({"asDouble": 1.5})) - 1.5).abs() < 1e-12);
        assert!((data_point_value(&json!({"asInt": "250"})) - 250.0).abs() < 1e-12);
        assert!((data_point_value(&json!({"asInt": 42})) - 42.0).abs() < 1e-12);
        assert!(data_point_value(&json!({})).abs() < 1e-12);
    }

    #[test]
    fn unknown_service_name_passes_through() {
        let attrs = vec![json!({"key": "service.name", "value": {"stringValue": "my-agent"}})];
        assert_eq!(resolve_agent_type(Some(&attrs)), "my-agent");
        assert_eq!(resolve_agent_type(None), "unknown");
    }
}
