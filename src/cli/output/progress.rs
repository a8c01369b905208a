//! Progress bar for the `run` command: one line per worker, advanced as
//! `SwarmEvent`s arrive.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} workers {msg}";
const BAR_CHARS: &str = "█▓▒░ ";

#[must_use]
pub fn create_swarm_progress(total_workers: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_workers);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .expect("valid progress template")
            .progress_chars(BAR_CHARS),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
