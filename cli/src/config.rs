use crate::apps::AppKind;
use clap::Args;
use eyre::{ContextCompat, WrapErr};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Context keys read from the process environment when not set otherwise
const ENV_VARS: [(&str, &str); 4] = [
    ("environment", "ENVIRONMENT"),
    ("alertEmail", "ALERT_EMAIL"),
    ("account", "CDK_DEFAULT_ACCOUNT"),
    ("region", "CDK_DEFAULT_REGION"),
];

const DEFAULTS: [(&str, &str); 8] = [
    ("environment", "development"),
    ("region", "eu-west-1"),
    ("computeVariant", "function"),
    ("frontendVariant", "cdn"),
    ("apiImageTag", "chronas-api-2018522"),
    ("apiBaseUrl", "https://api.chronas.org"),
    ("metadataLinksBucket", "chronas-artifacts"),
    ("metadataLinksKey", "metadata-links/app.zip"),
];

/// Options shared by all commands
#[derive(Args, Clone, Debug)]
pub(crate) struct GlobalArgs {
    /// Which composition of stacks to work with
    #[arg(long, value_enum, default_value_t = AppKind::Main, global = true)]
    pub(crate) app: AppKind,

    /// Context value overriding chronas.toml and the environment, e.g. -c environment=prod
    #[arg(short = 'c', long = "context", value_parser = parse_context, global = true)]
    pub(crate) context: Vec<(String, String)>,

    /// Path to the configuration file
    #[arg(long, default_value = "chronas.toml", global = true)]
    pub(crate) config: PathBuf,
}

fn parse_context(pair: &str) -> Result<(String, String), String> {
    let key = Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").map_err(|e| e.to_string())?;

    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {pair:?}"))?;

    if !key.is_match(name) {
        return Err(format!("invalid context key {name:?}"));
    }

    Ok((name.to_string(), value.to_string()))
}

/// Structure of chronas.toml
///
/// [context]
/// environment = "staging"
/// alertEmail = "ops@chronas.org"
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    context: BTreeMap<String, toml::Value>,
}

impl ConfigFile {
    /// Absent file means no file-level context
    fn from_path(path: &Path) -> eyre::Result<Self> {
        let Ok(toml_string) = fs::read_to_string(path) else {
            log::debug!("No config file at {path:?}, using defaults");
            return Ok(Self::default());
        };

        toml::from_str(&toml_string).wrap_err(format!("Failed to parse {path:?}"))
    }

    fn values(&self) -> BTreeMap<String, String> {
        self.context
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(string) => string.clone(),
                    other => other.to_string(),
                };

                (key.clone(), value)
            })
            .collect()
    }
}

/// Environment tier, drives sizing and removal policies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tier {
    Dev,
    Staging,
    Prod,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ComputeVariant {
    Function,
    Container,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrontendVariant {
    Cdn,
    Amplify,
}

/// Resolved key/value context the apps are composed from
#[derive(Clone, Debug, Default)]
pub(crate) struct Context {
    values: BTreeMap<String, String>,
}

impl Context {
    /// Merge sources, from the lowest precedence to the highest
    fn resolve(
        overrides: &[(String, String)],
        file: BTreeMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut values = DEFAULTS
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<BTreeMap<_, _>>();

        for (key, var) in ENV_VARS {
            if let Some(value) = env(var).filter(|value| !value.is_empty()) {
                values.insert(key.to_string(), value);
            }
        }

        values.extend(file);
        values.extend(overrides.iter().cloned());
        Self { values }
    }

    pub(crate) fn load(args: &GlobalArgs) -> eyre::Result<Self> {
        let file = ConfigFile::from_path(&args.config)?;

        Ok(Self::resolve(&args.context, file.values(), |var| {
            std::env::var(var).ok()
        }))
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> eyre::Result<&str> {
        self.get(key)
            .wrap_err(format!("Context value {key} is not set"))
    }

    pub(crate) fn environment(&self) -> &str {
        self.get("environment").unwrap_or("development")
    }

    /// `production` is an alias of `prod`
    pub(crate) fn tier(&self) -> Tier {
        match self.environment() {
            "prod" | "production" => Tier::Prod,
            "staging" => Tier::Staging,
            _ => Tier::Dev,
        }
    }

    pub(crate) fn account(&self) -> Option<&str> {
        self.get("account")
    }

    pub(crate) fn region(&self) -> eyre::Result<&str> {
        self.require("region")
    }

    pub(crate) fn alert_email(&self) -> Option<&str> {
        self.get("alertEmail")
    }

    pub(crate) fn hosted_zone_id(&self) -> Option<&str> {
        self.get("hostedZoneId")
    }

    pub(crate) fn api_image_tag(&self) -> eyre::Result<&str> {
        self.require("apiImageTag")
    }

    pub(crate) fn api_base_url(&self) -> eyre::Result<&str> {
        self.require("apiBaseUrl")
    }

    /// S3 location of the metadata links function code
    pub(crate) fn metadata_links_code(&self) -> eyre::Result<(&str, &str)> {
        Ok((
            self.require("metadataLinksBucket")?,
            self.require("metadataLinksKey")?,
        ))
    }

    pub(crate) fn compute_variant(&self) -> eyre::Result<ComputeVariant> {
        match self.require("computeVariant")? {
            "function" => Ok(ComputeVariant::Function),
            "container" => Ok(ComputeVariant::Container),
            other => eyre::bail!("Unknown computeVariant {other:?}, expected function or container"),
        }
    }

    pub(crate) fn frontend_variant(&self) -> eyre::Result<FrontendVariant> {
        match self.require("frontendVariant")? {
            "cdn" => Ok(FrontendVariant::Cdn),
            "amplify" => Ok(FrontendVariant::Amplify),
            other => eyre::bail!("Unknown frontendVariant {other:?}, expected cdn or amplify"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Context built from defaults and the given pairs only
    pub(crate) fn context(pairs: &[(&str, &str)]) -> Context {
        let overrides = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<Vec<_>>();

        Context::resolve(&overrides, BTreeMap::new(), |_| None)
    }

    #[test]
    fn precedence_cli_file_env_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chronas.toml");

        fs::write(
            &path,
            "[context]\nenvironment = \"staging\"\nregion = \"eu-central-1\"\n",
        )
        .unwrap();

        let file = ConfigFile::from_path(&path).unwrap();
        let env = |var: &str| match var {
            "ENVIRONMENT" => Some("from-env".to_string()),
            "CDK_DEFAULT_REGION" => Some("us-west-2".to_string()),
            "ALERT_EMAIL" => Some("ops@chronas.org".to_string()),
            _ => None,
        };

        let overrides = vec![("environment".to_string(), "prod".to_string())];
        let context = Context::resolve(&overrides, file.values(), env);

        assert_eq!(context.environment(), "prod");
        assert_eq!(context.region().unwrap(), "eu-central-1");
        assert_eq!(context.alert_email(), Some("ops@chronas.org"));
        assert_eq!(context.api_image_tag().unwrap(), "chronas-api-2018522");
        assert_eq!(context.tier(), Tier::Prod);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::from_path(&dir.path().join("chronas.toml")).unwrap();
        let context = Context::resolve(&[], file.values(), |_| None);

        assert_eq!(context.environment(), "development");
        assert_eq!(context.tier(), Tier::Dev);
        assert_eq!(context.compute_variant().unwrap(), ComputeVariant::Function);
        assert_eq!(context.frontend_variant().unwrap(), FrontendVariant::Cdn);
    }

    #[test]
    fn non_string_file_values_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chronas.toml");
        fs::write(&path, "[context]\naccount = 123456789012\n").unwrap();

        let context = Context::resolve(&[], ConfigFile::from_path(&path).unwrap().values(), |_| None);
        assert_eq!(context.account(), Some("123456789012"));
    }

    #[test]
    fn tiers() {
        assert_eq!(context(&[("environment", "production")]).tier(), Tier::Prod);
        assert_eq!(context(&[("environment", "staging")]).tier(), Tier::Staging);
        assert_eq!(context(&[("environment", "qa")]).tier(), Tier::Dev);
    }

    #[test]
    fn invalid_variant_is_an_error() {
        assert!(context(&[("computeVariant", "vm")]).compute_variant().is_err());
    }

    #[test]
    fn context_pairs() {
        assert_eq!(
            parse_context("environment=prod").unwrap(),
            ("environment".to_string(), "prod".to_string())
        );
        assert!(parse_context("environment").is_err());
        assert!(parse_context("bad key=1").is_err());
    }
}
