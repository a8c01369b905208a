//! Table/human-readable rendering for swarm results and health reports,
//! using comfy-table the way the wider ecosystem's CLI output does.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::style;

use super::CommandOutput;
use crate::domain::models::swarm::SwarmResult;
use crate::services::tracer::{HealthReport, HealthStatus};

fn base_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
    table
}

impl CommandOutput for SwarmResult {
    fn to_human(&self) -> String {
        let mut table = base_table();
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec!["workers".to_string(), self.metrics.worker_count.to_string()]);
        table.add_row(vec!["succeeded".to_string(), self.metrics.successful_workers.to_string()]);
        table.add_row(vec!["failed".to_string(), self.metrics.failed_workers.to_string()]);
        table.add_row(vec!["actions performed".to_string(), self.metrics.total_actions_performed.to_string()]);
        table.add_row(vec!["duration (ms)".to_string(), self.metrics.total_duration_ms.to_string()]);
        table.add_row(vec!["partial".to_string(), self.partial.to_string()]);

        let mut out = table.to_string();
        if !self.warnings.is_empty() {
            out.push_str(&format!("\n\n{}\n", style("warnings").yellow().bold()));
            for warning in &self.warnings {
                out.push_str(&format!("  - {warning}\n"));
            }
        }
        out.push_str(&format!(
            "\n{}\n{}",
            style("result").bold(),
            serde_json::to_string_pretty(&self.result).unwrap_or_default()
        ));
        out
    }
}

impl CommandOutput for HealthReport {
    fn to_human(&self) -> String {
        let mut table = base_table();
        table.set_header(vec![
            Cell::new("Check").add_attribute(Attribute::Bold),
            Cell::new("Critical").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ]);
        for check in &self.checks {
            let status_cell = if check.ok {
                Cell::new("ok").fg(Color::Green)
            } else {
                Cell::new(check.error.as_deref().unwrap_or("failed")).fg(Color::Red)
            };
            table.add_row(vec![Cell::new(check.name.clone()), Cell::new(check.critical.to_string()), status_cell]);
        }

        let overall = match self.status {
            HealthStatus::Healthy => style("healthy").green().bold(),
            HealthStatus::Degraded => style("degraded").yellow().bold(),
            HealthStatus::Unhealthy => style("unhealthy").red().bold(),
        };
        format!("overall: {overall}\n{table}")
    }
}
