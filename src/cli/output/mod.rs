//! Output dispatch: human-readable (table + styled text) or JSON,
//! selected by the global `--json` flag.

pub mod progress;
pub mod table;

use serde::Serialize;

/// A result the CLI can render either as a formatted table/summary or as
/// raw JSON.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
}

pub fn render<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(result).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}
