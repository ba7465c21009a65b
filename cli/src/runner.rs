use crate::apps;
use crate::config::{Context, GlobalArgs};
use crate::error::Error;
use chronas_common::Assembly;
use std::error::Error as StdError;

/// What every command gets from the global options
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) args: GlobalArgs,
    pub(crate) context: Context,
}

impl Config {
    pub(crate) fn load(args: GlobalArgs) -> Result<Self, Error> {
        let context = Context::load(&args).map_err(|e| {
            Error::new(
                "Failed to read the configuration",
                Some(&format!("{e:#}")),
            )
        })?;

        Ok(Self { args, context })
    }
}

pub(crate) trait Runner {
    fn config(&self) -> &Config;

    /// Compose the selected app and synthesize it, no AWS calls are made
    fn synth(&self) -> Result<Assembly, Error> {
        let config = self.config();

        apps::build(config.args.app, &config.context)
            .and_then(|app| app.synth())
            .map_err(|e| {
                self.error(
                    Some("Synthesis failed"),
                    Some(&format!("{e:#}")),
                    Some(e.into()),
                )
            })
    }

    /// Run the command
    ///
    /// Returns an error shown to the user in case of failure
    async fn run(&mut self) -> Result<(), Error>;

    /// Construct an error shown to the user
    fn error(
        &self,
        title: Option<&str>,
        description: Option<&str>,
        origin: Option<Box<dyn StdError>>,
    ) -> Error {
        if let Some(origin) = origin {
            log::error!("{origin:?}");
        }

        Error::new(title.unwrap_or("Failed to run the command"), description)
    }
}

/// Return a runner for a command
pub(crate) trait Runnable {
    fn runner(&self, config: &Config) -> impl Runner;
}
