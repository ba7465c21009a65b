use crate::cloudformation::{classify, CloudFormation, Phase, Submitted};
use crate::commands::deploy::DeployCommand;
use crate::commands::progress::{PipelineProgress, Progress, ProgressStatus};
use crate::error::Error;
use crate::runner::{Config, Runner};
use chrono::Utc;
use chronas_common::StackArtifact;
use eyre::WrapErr;
use std::time::{Duration, Instant};

pub(crate) struct DeployRunner {
    pub(crate) command: DeployCommand,
    pub(crate) config: Config,
}

impl Runner for DeployRunner {
    fn config(&self) -> &Config {
        &self.config
    }

    /// Create or update the selected stacks one by one, dependencies first
    async fn run(&mut self) -> Result<(), Error> {
        let assembly = self.synth()?;

        let stacks = assembly
            .select(&self.command.stacks, !self.command.exclusively)
            .map_err(|e| self.error(Some("Unknown stack"), Some(&format!("{e:#}")), None))?;

        if stacks.is_empty() {
            println!("{}", console::style("No stacks to deploy").yellow().bold());
            return Ok(());
        }

        let pipeline = PipelineProgress::new(stacks.len() as u64, "Deploying");

        for stack in stacks {
            let progress = pipeline.new_progress(&stack.name);

            if let Err(e) = self.deploy(stack, &progress).await {
                progress.finish("Failed", ProgressStatus::Error, None);
                pipeline.finish();
                return Err(e.into());
            }

            pipeline.increase();
        }

        pipeline.finish();
        println!("{}", console::style("Deployed").green().bold());
        Ok(())
    }
}

impl DeployRunner {
    async fn deploy(&self, stack: &StackArtifact, progress: &Progress) -> eyre::Result<()> {
        let region = match stack.target.region.as_deref() {
            Some(region) => region,
            None => self.config.context.region()?,
        };

        let client = CloudFormation::new(region).await;

        if let Some(expected) = stack.target.account.as_deref() {
            let actual = client.account().await?;

            if actual != expected {
                eyre::bail!(
                    "Stack {} targets account {expected} but the credentials belong to {actual}",
                    stack.name
                );
            }
        }

        let started_at = Utc::now();
        let timer = Instant::now();
        progress.status("Submitting", region);

        match client.deploy(stack).await? {
            Submitted::Unchanged => {
                progress.finish("Unchanged", ProgressStatus::Warn, Some("no changes"));
                return Ok(());
            }
            Submitted::Created => progress.log_stage("Creating"),
            Submitted::Updated => progress.log_stage("Updating"),
        }

        let status = client
            .wait(&stack.name, |status| progress.status("Waiting", status))
            .await?;

        match status.as_deref().map(classify) {
            Some(Phase::Complete) => {
                let elapsed = humantime::format_duration(Duration::from_secs(timer.elapsed().as_secs()));
                progress.finish("Deployed", ProgressStatus::Success, Some(&elapsed.to_string()));
                Ok(())
            }
            _ => {
                Err::<(), _>(client.failure_reason(&stack.name, started_at).await).wrap_err(format!(
                    "Stack {} ended in {}",
                    stack.name,
                    status.as_deref().unwrap_or("DELETE_COMPLETE"),
                ))
            }
        }
    }
}
