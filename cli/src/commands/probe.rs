use crate::commands::progress::with_padding;
use crate::error::Error;
use crate::probe::{runner, suites, SuiteReport};
use crate::runner::{Config, Runnable, Runner};

#[derive(clap::Args, Clone)]
pub(crate) struct ProbeCommand {
    /// Suites to run, all by default
    suites: Vec<String>,

    /// API to probe instead of the configured apiBaseUrl
    #[arg(long)]
    base_url: Option<String>,
}

impl Runnable for ProbeCommand {
    fn runner(&self, config: &Config) -> impl Runner {
        ProbeRunner {
            command: self.clone(),
            config: config.clone(),
        }
    }
}

struct ProbeRunner {
    command: ProbeCommand,
    config: Config,
}

fn print_report(report: &SuiteReport) {
    for step in report.steps.iter() {
        let mark = match step.failed() {
            true => console::style("✗").red(),
            false => console::style("✓").green(),
        };

        println!(
            "  {mark} {} {}",
            step.name,
            console::style(format!("{} in {}ms", step.status, step.elapsed_ms)).dim()
        );

        for outcome in step.outcomes.iter().filter(|outcome| !outcome.passed) {
            println!("      {} {}", console::style("failed").red(), outcome.check.name());
        }
    }
}

impl Runner for ProbeRunner {
    fn config(&self) -> &Config {
        &self.config
    }

    /// Run each suite in turn and judge it by its own policy
    async fn run(&mut self) -> Result<(), Error> {
        let base_url = match self.command.base_url.as_deref() {
            Some(url) => url.to_string(),
            None => self.config.context.api_base_url()?.to_string(),
        };

        let suites = suites::select(&self.command.suites)
            .map_err(|e| self.error(Some("Unknown suite"), Some(&format!("{e:#}")), None))?;

        let mut failures = Vec::new();

        for suite in suites.iter() {
            println!(
                "{} {}",
                console::style(with_padding("Probing")).cyan().bold(),
                suite.name
            );

            let verdict = match runner::run(suite, &base_url).await {
                Ok(report) => {
                    print_report(&report);
                    report.verdict(&suite.policy)
                }
                Err(e) => Err(e),
            };

            match verdict {
                Ok(()) => println!("{} {}", console::style(with_padding("Passed")).green().bold(), suite.name),
                Err(e) => {
                    println!("{} {e:#}", console::style(with_padding("Failed")).red().bold());
                    failures.push(format!("{e:#}"));
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::new(
                &format!("{} of {} suites failed", failures.len(), suites.len()),
                Some(&failures.join("\n")),
            ));
        }

        Ok(())
    }
}
