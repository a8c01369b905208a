//! Output formatting for the Result Aggregator: JSON is the native form,
//! Markdown renders per-result sections, HTML uses a deterministic
//! escaped template.

use serde_json::Value;

use crate::domain::models::WorkerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    Json,
    Markdown,
    Html,
}

/// `& < > " '`: the character set escaped for safe HTML embedding.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[must_use]
pub fn render(results: &[WorkerResult], format: RenderFormat) -> Value {
    match format {
        RenderFormat::Json => serde_json::json!({
            "results": results,
        }),
        RenderFormat::Markdown => Value::String(render_markdown(results)),
        RenderFormat::Html => Value::String(render_html(results)),
    }
}

fn render_markdown(results: &[WorkerResult]) -> String {
    let mut out = String::new();
    for result in results {
        out.push_str(&format!("## {}\n\n", result.instruction));
        out.push_str(&format!("**Worker:** `{}`  \n", result.worker_id));
        out.push_str(&format!("**Duration:** {}ms\n\n", result.duration_ms));

        match &result.result {
            Value::String(text) => {
                out.push_str(text);
                out.push('\n');
            }
            other => {
                out.push_str("```json\n");
                out.push_str(&serde_json::to_string_pretty(other).unwrap_or_default());
                out.push_str("\n```\n");
            }
        }
        out.push('\n');
    }
    out
}

fn render_html(results: &[WorkerResult]) -> String {
    let mut out = String::from("<section class=\"swarm-results\">\n");
    for result in results {
        out.push_str("  <article>\n");
        out.push_str(&format!("    <h2>{}</h2>\n", escape_html(&result.instruction)));
        out.push_str(&format!(
            "    <p><strong>Worker:</strong> {}</p>\n",
            escape_html(&result.worker_id.to_string())
        ));
        out.push_str(&format!("    <p><strong>Duration:</strong> {}ms</p>\n", result.duration_ms));

        match &result.result {
            Value::String(text) => {
                out.push_str(&format!("    <p>{}</p>\n", escape_html(text)));
            }
            other => {
                let json = serde_json::to_string_pretty(other).unwrap_or_default();
                out.push_str(&format!("    <pre>{}</pre>\n", escape_html(&json)));
            }
        }
        out.push_str("  </article>\n");
    }
    out.push_str("</section>\n");
    out
}
