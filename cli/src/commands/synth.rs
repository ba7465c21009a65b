use crate::cloudformation::MAX_TEMPLATE_BYTES;
use crate::error::Error;
use crate::runner::{Config, Runnable, Runner};
use std::path::PathBuf;

#[derive(clap::Args, Clone)]
pub(crate) struct SynthCommand {
    /// Stacks to print, all of them are written anyway
    stacks: Vec<String>,

    /// Directory for the templates and the manifest
    #[arg(short, long, default_value = "chronas.out")]
    output: PathBuf,
}

impl Runnable for SynthCommand {
    fn runner(&self, config: &Config) -> impl Runner {
        SynthRunner {
            command: self.clone(),
            config: config.clone(),
        }
    }
}

struct SynthRunner {
    command: SynthCommand,
    config: Config,
}

impl Runner for SynthRunner {
    fn config(&self) -> &Config {
        &self.config
    }

    async fn run(&mut self) -> Result<(), Error> {
        let assembly = self.synth()?;

        let selected = assembly
            .select(&self.command.stacks, false)
            .map_err(|e| self.error(Some("Unknown stack"), Some(&format!("{e:#}")), None))?;

        assembly.write(&self.command.output).map_err(|e| {
            self.error(
                Some("Failed to write the assembly"),
                Some(&format!("{e:#}")),
                Some(e.into()),
            )
        })?;

        for stack in assembly.stacks.iter() {
            let size = serde_json::to_string(&stack.template.to_value())
                .map(|body| body.len())
                .unwrap_or_default();

            if size > MAX_TEMPLATE_BYTES {
                log::warn!(
                    "Template of {} is {size} bytes, over the {MAX_TEMPLATE_BYTES} bytes CloudFormation accepts inline",
                    stack.name
                );
            }
        }

        // A single requested template goes to stdout, handy for piping
        if let [stack] = selected.as_slice() {
            if !self.command.stacks.is_empty() {
                let json = stack.template.to_json().map_err(|e| {
                    self.error(Some("Failed to render the template"), None, Some(e.into()))
                })?;

                println!("{json}");
                return Ok(());
            }
        }

        eprintln!(
            "{} {} stacks to {}",
            console::style("Synthesized").green().bold(),
            assembly.stacks.len(),
            self.command.output.display(),
        );

        Ok(())
    }
}
