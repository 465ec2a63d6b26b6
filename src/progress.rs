use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;

/// Progress over the mappings of one run
pub trait ProgressReporter {
    /// Called once the number of executable mappings is known
    fn initialize(&self, total_mappings: u64);

    /// Called after each mapping, whether it produced traces or was skipped
    fn mapping_done(&self, name: &str);

    fn finish(&self);
}

/// Reporter that does nothing (default)
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn initialize(&self, _total_mappings: u64) {}
    fn mapping_done(&self, _name: &str) {}
    fn finish(&self) {}
}

/// Indicatif-based reporter, drawn on stderr
pub struct IndicatifProgressBar {
    bar: ProgressBar,
}

impl IndicatifProgressBar {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        let bar = ProgressBar::hidden()
            .with_style(default_progress_style())
            .with_message(message);
        Self { bar }
    }
}

impl ProgressReporter for IndicatifProgressBar {
    fn initialize(&self, total_mappings: u64) {
        self.bar.set_length(total_mappings);
        self.bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn mapping_done(&self, name: &str) {
        self.bar.set_message(name.to_string());
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

pub fn default_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}
