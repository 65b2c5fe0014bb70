// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `GET /v1/metrics`: operational metrics for the supervisor itself, in
//! Prometheus text exposition format.
//!
//! This is distinct from the telemetry pipelines the supervisor manages —
//! it reports on the supervisor process (reload counts, processor panics,
//! cap-driven drops, items processed per pipeline), not on the collector's
//! own output.

use std::fmt::Write as _;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use nrdot_types::descriptor::PipelineKind;

use crate::state::AppState;

/// Routes for the operational metrics endpoint.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/metrics", get(show_metrics))
}

async fn show_metrics(State(state): State<AppState>) -> Response {
    let body = render(&state).await;
    let mut response = body.into_response();
    let _ = response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"));
    response
}

async fn render(state: &AppState) -> String {
    let mut out = String::new();

    push_gauge(&mut out, "nrdot_uptime_seconds", "Seconds since the supervisor process started.", state.uptime_seconds() as f64, &[]);

    {
        let supervisor = state.supervisor().lock().await;
        let sup_state = supervisor.state();
        push_gauge(
            &mut out,
            "nrdot_active_generation",
            "Generation number of the currently active collector instance.",
            sup_state.active.as_ref().map_or(0.0, |i| i.generation.0 as f64),
            &[],
        );
        push_gauge(
            &mut out,
            "nrdot_restart_budget_remaining",
            "Remaining tokens in the crash-loop restart budget.",
            sup_state.restart_budget.remaining() as f64,
            &[],
        );
    }

    for kind in PipelineKind::ALL {
        push_counter(
            &mut out,
            "nrdot_pipeline_items_total",
            "Telemetry items processed by the embedded collector's pipelines.",
            state.throughput().get(kind) as f64,
            &[("pipeline", pipeline_kind_str(kind))],
        );
    }

    if let Some(registry_metrics) = state.registry_metrics() {
        push_counter(
            &mut out,
            "nrdot_processor_panics_total",
            "Panics caught and dropped by custom processor invocations.",
            registry_metrics.panics_total() as f64,
            &[],
        );
        for (name, count) in registry_metrics.panics_by_name() {
            push_counter(
                &mut out,
                "nrdot_processor_panics_by_name_total",
                "Panics caught and dropped by custom processor invocations, by processor name.",
                count as f64,
                &[("processor", &name)],
            );
        }
    }

    if let Some(cap_processor) = state.cap_processor() {
        for (metric_name, dropped) in cap_processor.drop_counters() {
            push_counter(
                &mut out,
                "nrdot_cap_dropped_datapoints_total",
                "Data points dropped by the metrics cardinality cap.",
                dropped as f64,
                &[("metric", &metric_name)],
            );
        }
    }

    out
}

fn pipeline_kind_str(kind: PipelineKind) -> &'static str {
    match kind {
        PipelineKind::Metrics => "metrics",
        PipelineKind::Traces => "traces",
        PipelineKind::Logs => "logs",
    }
}

fn push_gauge(out: &mut String, name: &str, help: &str, value: f64, labels: &[(&str, &str)]) {
    push_metric(out, name, help, "gauge", value, labels);
}

fn push_counter(out: &mut String, name: &str, help: &str, value: f64, labels: &[(&str, &str)]) {
    push_metric(out, name, help, "counter", value, labels);
}

fn push_metric(out: &mut String, name: &str, help: &str, kind: &str, value: f64, labels: &[(&str, &str)]) {
    let name = sanitize_metric_name(name);
    let _ = writeln!(out, "# HELP {name} {}", escape_help(help));
    let _ = writeln!(out, "# TYPE {name} {kind}");
    if labels.is_empty() {
        let _ = writeln!(out, "{name} {value}");
        return;
    }
    let mut rendered_labels = String::new();
    for (i, (key, value)) in labels.iter().enumerate() {
        if i > 0 {
            rendered_labels.push(',');
        }
        let _ = write!(rendered_labels, "{}=\"{}\"", sanitize_label_key(key), escape_label_value(value));
    }
    let _ = writeln!(out, "{name}{{{rendered_labels}}} {value}");
}

fn sanitize_metric_name(s: &str) -> String {
    sanitize(s, "metric")
}

fn sanitize_label_key(s: &str) -> String {
    sanitize(s, "label")
}

fn sanitize(s: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, ch) in s.chars().enumerate() {
        let ok = matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | ':');
        if ok && !(i == 0 && ch.is_ascii_digit()) {
            out.push(ch);
        } else if i == 0 && ch.is_ascii_digit() {
            out.push('_');
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        fallback.to_string()
    } else {
        out
    }
}

fn escape_label_value(s: &str) -> String {
    escape_help(s)
}

fn escape_help(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rewrites_illegal_characters() {
        assert_eq!(sanitize_metric_name("service.name-1"), "service_name_1");
        assert_eq!(sanitize_metric_name("9lives"), "_9lives");
        assert_eq!(sanitize_metric_name(""), "metric");
    }

    #[test]
    fn escape_help_escapes_backslash_quote_and_newline() {
        assert_eq!(escape_help("a\\b\"c\nd"), "a\\\\b\\\"c\\nd");
    }

    #[test]
    fn push_metric_renders_help_type_and_labeled_sample() {
        let mut out = String::new();
        push_counter(&mut out, "nrdot_pipeline_items_total", "items processed", 42.0, &[("pipeline", "traces")]);
        assert!(out.contains("# HELP nrdot_pipeline_items_total items processed\n"));
        assert!(out.contains("# TYPE nrdot_pipeline_items_total counter\n"));
        assert!(out.contains("nrdot_pipeline_items_total{pipeline=\"traces\"} 42\n"));
    }
}
