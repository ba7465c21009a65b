use crate::cloudformation::{classify, CloudFormation, Phase};
use crate::commands::progress::{PipelineProgress, Progress, ProgressStatus};
use crate::error::Error;
use crate::runner::{Config, Runnable, Runner};
use chrono::Utc;
use chronas_common::StackArtifact;
use clap::ArgAction;
use eyre::WrapErr;
use std::io::{self, Write};

#[derive(clap::Args, Clone)]
pub(crate) struct DestroyCommand {
    /// Stacks to delete, all by default
    stacks: Vec<String>,

    /// Do not ask for confirmation
    #[arg(short, long, action = ArgAction::SetTrue)]
    force: bool,
}

impl Runnable for DestroyCommand {
    fn runner(&self, config: &Config) -> impl Runner {
        DestroyRunner {
            command: self.clone(),
            config: config.clone(),
        }
    }
}

struct DestroyRunner {
    command: DestroyCommand,
    config: Config,
}

fn is_confirmed(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_ref(), "y" | "yes")
}

fn confirm(stacks: &[&StackArtifact]) -> eyre::Result<bool> {
    println!("{}", console::style("The following stacks will be deleted:").bold());

    for stack in stacks {
        println!("  {}", stack.name);
    }

    print!(
        "{} {}: ",
        console::style("Do you want to proceed?").bold(),
        console::style("[y/N]").dim()
    );
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .wrap_err("Failed to read input")?;

    Ok(is_confirmed(&input))
}

impl Runner for DestroyRunner {
    fn config(&self) -> &Config {
        &self.config
    }

    /// Delete the selected stacks, dependents before what they depend on
    async fn run(&mut self) -> Result<(), Error> {
        let assembly = self.synth()?;

        let mut stacks = assembly
            .select(&self.command.stacks, false)
            .map_err(|e| self.error(Some("Unknown stack"), Some(&format!("{e:#}")), None))?;

        stacks.reverse();

        if !self.command.force && !confirm(&stacks)? {
            println!("{}", console::style("Destroying canceled").dim().bold());
            return Ok(());
        }

        let pipeline = PipelineProgress::new(stacks.len() as u64, "Destroying");

        for stack in stacks {
            let progress = pipeline.new_progress(&stack.name);

            if let Err(e) = self.destroy(stack, &progress).await {
                progress.finish("Failed", ProgressStatus::Error, None);
                pipeline.finish();
                return Err(e.into());
            }

            pipeline.increase();
        }

        pipeline.finish();
        println!("{}", console::style("Destroyed").green().bold());
        Ok(())
    }
}

impl DestroyRunner {
    async fn destroy(&self, stack: &StackArtifact, progress: &Progress) -> eyre::Result<()> {
        let region = match stack.target.region.as_deref() {
            Some(region) => region,
            None => self.config.context.region()?,
        };

        let client = CloudFormation::new(region).await;

        if client.status(&stack.name).await?.is_none() {
            progress.finish("Skipped", ProgressStatus::Warn, Some("not deployed"));
            return Ok(());
        }

        let started_at = Utc::now();
        client.delete(&stack.name).await?;

        let status = client
            .wait(&stack.name, |status| progress.status("Deleting", status))
            .await?;

        match status.as_deref().map(classify) {
            None | Some(Phase::Complete) => {
                progress.finish("Deleted", ProgressStatus::Success, None);
                Ok(())
            }
            _ => {
                Err::<(), _>(client.failure_reason(&stack.name, started_at).await).wrap_err(format!(
                    "Failed to delete stack {}, it is in {}",
                    stack.name,
                    status.as_deref().unwrap_or_default(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::is_confirmed;

    #[test]
    fn confirmation() {
        assert!(is_confirmed("y\n"));
        assert!(is_confirmed(" YES "));
        assert!(!is_confirmed("\n"));
        assert!(!is_confirmed("no"));
    }
}
