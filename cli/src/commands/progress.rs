use crate::logger::Logger;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::{stdout, IsTerminal};

/// Overall bar of a multi-stack operation, per-stack lines are printed above it
pub(crate) struct PipelineProgress {
    multi_progress: &'static MultiProgress,
    pub(crate) total_progress_bar: ProgressBar,
}

impl PipelineProgress {
    pub(crate) fn new(total_stacks: u64, action: &str) -> Self {
        let multi_progress = Logger::multi_progress();
        let total_progress_bar = multi_progress.add(ProgressBar::new(total_stacks));

        let template = format!(
            "{} [{{bar:30}}] {{pos}}/{{len}} {{wide_msg:.dim}}",
            console::style(with_padding(action)).cyan().bold()
        );

        total_progress_bar.set_style(
            ProgressStyle::default_bar()
                .template(&template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        total_progress_bar.set_position(0);

        Self {
            multi_progress,
            total_progress_bar,
        }
    }

    pub(crate) fn increase(&self) {
        self.total_progress_bar.inc(1);
    }

    pub(crate) fn new_progress(&self, stack_name: &str) -> Progress {
        let progress_bar = self
            .multi_progress
            .insert_before(&self.total_progress_bar, ProgressBar::new_spinner());

        progress_bar.set_style(ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));

        Progress {
            progress_bar,
            stack_name: stack_name.to_string(),
        }
    }

    pub(crate) fn finish(&self) {
        self.total_progress_bar.finish_and_clear();
    }
}

pub(crate) enum ProgressStatus {
    Success,
    Warn,
    Error,
}

pub(crate) struct Progress {
    progress_bar: ProgressBar,
    stack_name: String,
}

impl Progress {
    /// Print a finished stage above the bars
    pub(crate) fn log_stage(&self, stage: &str) {
        let msg = format!(
            "{} {}",
            console::style(with_padding(stage)).green().bold(),
            self.stack_name,
        );

        // Terminal or CI/CD?
        if stdout().is_terminal() {
            self.progress_bar.println(msg);
        } else {
            self.progress_bar.suspend(|| {
                println!("{msg}");
            });
        }
    }

    /// Show the latest status reported while polling
    pub(crate) fn status(&self, stage: &str, status: &str) {
        self.progress_bar.set_message(format!(
            "{} {} {}",
            console::style(with_padding(stage)).cyan().bold(),
            self.stack_name,
            console::style(status).dim(),
        ));
    }

    pub(crate) fn finish(&self, stage: &str, status: ProgressStatus, message: Option<&str>) {
        let stage = console::style(with_padding(stage)).bold();

        let stage = match status {
            ProgressStatus::Success => stage.green(),
            ProgressStatus::Warn => stage.yellow(),
            ProgressStatus::Error => stage.red(),
        };

        let message = message.map(|m| format!(": {m}")).unwrap_or_default();

        self.progress_bar
            .finish_with_message(format!("{} {}{}", stage, self.stack_name, message));
    }
}

/// Right-align a stage to 12 columns, the way cargo prints its stages
pub(crate) fn with_padding(message: &str) -> String {
    format!("{message:>12}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stages_are_right_aligned() {
        assert_eq!(with_padding("Deploying"), "   Deploying");
        assert_eq!(with_padding("Synthesized"), " Synthesized");
    }
}
