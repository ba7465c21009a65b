pub(crate) mod deploy;
pub(crate) mod destroy;
pub(crate) mod diff;
pub(crate) mod list;
pub(crate) mod probe;
mod progress;
pub(crate) mod synth;
use clap::Subcommand;

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Synthesize templates and the manifest into a directory
    Synth(synth::SynthCommand),

    /// List stacks in deployment order
    List(list::ListCommand),

    /// Compare synthesized templates with the deployed ones
    Diff(diff::DiffCommand),

    /// Create or update stacks, in dependency order
    Deploy(deploy::DeployCommand),

    /// Delete stacks, dependents first
    Destroy(destroy::DestroyCommand),

    /// Run the synthetic probes against the live API
    Probe(probe::ProbeCommand),
}
