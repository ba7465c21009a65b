use crate::error::Error;
use crate::runner::{Config, Runnable, Runner};
use chronas_common::StackArtifact;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(clap::Args, Clone)]
pub(crate) struct ListCommand {}

impl Runnable for ListCommand {
    fn runner(&self, config: &Config) -> impl Runner {
        ListRunner {
            config: config.clone(),
        }
    }
}

struct ListRunner {
    config: Config,
}

#[derive(Tabled)]
struct StackRow {
    #[tabled(rename = "Stack")]
    name: String,

    #[tabled(rename = "Region")]
    region: String,

    #[tabled(rename = "Account")]
    account: String,

    #[tabled(rename = "Depends on")]
    dependencies: String,
}

impl StackRow {
    fn new(stack: &StackArtifact) -> Self {
        let unknown = || "default".to_string();

        Self {
            name: stack.name.clone(),
            region: stack.target.region.clone().unwrap_or_else(unknown),
            account: stack.target.account.clone().unwrap_or_else(unknown),
            dependencies: stack.dependencies.join(", "),
        }
    }
}

impl Runner for ListRunner {
    fn config(&self) -> &Config {
        &self.config
    }

    async fn run(&mut self) -> Result<(), Error> {
        let assembly = self.synth()?;

        if assembly.stacks.is_empty() {
            println!("{}", console::style("No stacks found").yellow());
            return Ok(());
        }

        let rows = assembly.stacks.iter().map(StackRow::new).collect::<Vec<_>>();
        let mut table = Table::new(rows);
        table.with(Style::modern());
        println!("{table}");
        Ok(())
    }
}
