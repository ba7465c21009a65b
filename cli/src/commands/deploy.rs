mod runner;
use crate::runner::{Config, Runnable, Runner};
use clap::ArgAction;
use runner::DeployRunner;

#[derive(clap::Args, Clone)]
pub(crate) struct DeployCommand {
    /// Stacks to deploy, their dependencies are deployed first
    stacks: Vec<String>,

    /// Deploy only the named stacks, without their dependencies
    #[arg(short, long, action = ArgAction::SetTrue)]
    exclusively: bool,
}

impl Runnable for DeployCommand {
    fn runner(&self, config: &Config) -> impl Runner {
        DeployRunner {
            command: self.clone(),
            config: config.clone(),
        }
    }
}
