//! Report rendering and the on-disk execution history.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Report, Step, TaskerError, TodoReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    #[default]
    Html,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = TaskerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "html" => Ok(ReportFormat::Html),
            other => Err(TaskerError::Config(format!("unknown report format '{other}'"))),
        }
    }
}

pub fn render(report: &Report, format: ReportFormat) -> Result<String, TaskerError> {
    match format {
        ReportFormat::Json => render_json(report),
        ReportFormat::Html => Ok(render_html(report)),
    }
}

pub fn render_json(report: &Report) -> Result<String, TaskerError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// `<save_dir>/<exp_name>/<exp_name>_execution_history.<ext>`
pub fn report_path(save_dir: &Path, exp_name: &str, format: ReportFormat) -> PathBuf {
    save_dir
        .join(exp_name)
        .join(format!("{exp_name}_execution_history.{}", format.extension()))
}

/// Render and write the report, creating the run directory if needed.
pub async fn write_report(
    report: &Report,
    save_dir: &Path,
    exp_name: &str,
    format: ReportFormat,
) -> Result<PathBuf, TaskerError> {
    let path = report_path(save_dir, exp_name, format);
    let body = render(report, format)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse;margin-bottom:1em}\
td,th{border:1px solid #ccc;padding:4px 8px;text-align:left;vertical-align:top}\
.completed{color:#1a7f37}.failed{color:#cf222e}.aborted{color:#9a6700}\
img{max-width:320px}";

/// Self-contained HTML page. Screenshots are linked by relative path.
pub fn render_html(report: &Report) -> String {
    let mut out = String::new();
    let title = report
        .header
        .as_ref()
        .map(|h| h.task_name.as_str())
        .unwrap_or("execution history");

    // writing into a String cannot fail
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title><style>{STYLE}</style></head><body>\n",
        escape(title)
    );
    let _ = writeln!(out, "<h1>{}</h1>", escape(title));

    if let Some(header) = &report.header {
        let _ = writeln!(out, "<table>");
        for (key, value) in [
            ("run", header.run_id.to_string()),
            ("instruction", header.instruction.clone()),
            ("model", header.model.clone()),
            ("max steps", header.max_steps.to_string()),
            ("started", header.started_at.to_rfc3339()),
        ] {
            let _ = writeln!(out, "<tr><th>{key}</th><td>{}</td></tr>", escape(&value));
        }
        let _ = writeln!(out, "</table>");
    }

    let s = &report.summary;
    let _ = writeln!(
        out,
        "<p>overall: <strong>{}</strong> | completed {} | failed {} | aborted {} | pending {} | in progress {}</p>",
        if report.overall_success { "success" } else { "not successful" },
        s.completed,
        s.failed,
        s.aborted,
        s.pending,
        s.in_progress
    );

    for todo in &report.todos {
        render_todo(&mut out, todo);
    }

    if !report.decisions.is_empty() {
        let _ = writeln!(out, "<h2>Decisions</h2>\n<table><tr><th>todo</th><th>step</th><th>policy</th><th>decision</th><th>trigger</th></tr>");
        for d in &report.decisions {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td><code>{}</code></td></tr>",
                d.todo_index,
                d.step_index,
                escape(&d.policy),
                escape(&d.decision),
                escape(&d.trigger.to_string())
            );
        }
        let _ = writeln!(out, "</table>");
    }

    out.push_str("</body></html>\n");
    out
}

fn render_todo(out: &mut String, todo: &TodoReport) {
    let label = todo.status.label();
    let _ = writeln!(
        out,
        "<h2>Todo {}: {}</h2>\n<p class=\"{label}\">{label}{}</p>",
        todo.index,
        escape(&todo.description),
        todo.status
            .reason()
            .map(|r| format!(": {}", escape(r)))
            .unwrap_or_default()
    );
    if !todo.steps.is_empty() {
        let _ = writeln!(out, "<table><tr><th>#</th><th>action</th><th>result</th><th>attempts</th><th>screenshot</th></tr>");
        for step in &todo.steps {
            render_step(out, step);
        }
        let _ = writeln!(out, "</table>");
    }
    if let Some(path) = todo.checkpoint.as_ref().and_then(|c| c.path.as_deref()) {
        let _ = writeln!(out, "<p>checkpoint</p><img src=\"{}\" alt=\"checkpoint\">", escape(path));
    }
}

fn render_step(out: &mut String, step: &Step) {
    let action = step
        .action
        .as_ref()
        .and_then(|a| serde_json::to_string(a).ok())
        .unwrap_or_else(|| "-".to_string());
    let result = match &step.result.error {
        Some(err) => format!("failure: {err}"),
        None => "success".to_string(),
    };
    let shot = match step.screenshot.as_ref().and_then(|s| s.path.as_deref()) {
        Some(path) => format!("<img src=\"{}\" alt=\"step {}\">", escape(path), step.index),
        None => "-".to_string(),
    };
    let _ = writeln!(
        out,
        "<tr><td>{}</td><td><code>{}</code></td><td>{}</td><td>{}</td><td>{shot}</td></tr>",
        step.index,
        escape(&action),
        escape(&result),
        step.result.attempts
    );
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
