//! Compositions of the stacks, selected with `--app`

use crate::config::{ComputeVariant, Context, FrontendVariant};
use crate::probe::suites;
use crate::stacks::amplify::{AmplifyParams, AmplifyStack};
use crate::stacks::build::{BuildParams, BuildStack};
use crate::stacks::certificate::{CertificateParams, CertificateStack};
use crate::stacks::ci::{CiParams, GitHubActionsUserStack};
use crate::stacks::compute::{ChronasApiLambdaStack, ComputeParams};
use crate::stacks::container::ChronasApiFargateStack;
use crate::stacks::database::{DatabaseParams, DatabaseProfile, DatabaseStack};
use crate::stacks::frontend::{FrontendParams, FrontendS3Stack};
use crate::stacks::gateway::{ApiGatewayParams, ApiGatewayStack};
use crate::stacks::metadata::{FunctionCode, MetaDataLinkParams, MetaDataLinkStack};
use crate::stacks::monitoring::{MonitoringParams, SyntheticMonitoringStack};
use crate::stacks::network::NetworkStack;
use crate::stacks::observability::CloudwatchStack;
use crate::stacks::secret::SecretStack;
use crate::stacks::{API_DOMAIN, CLOUDFRONT_REGION, FRONTEND_DOMAIN};
use chronas_common::{App, StackProps, Target};

const LEGACY_DATABASE_SECRET: &str = "/chronas/docdb/newpassword";
const LIFECYCLE_TAGS: [(&str, &str); 2] = [("auto-delete", "never"), ("auto-stop", "no")];

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum AppKind {
    /// The whole platform
    #[default]
    Main,

    /// Network and the modernized database cluster of one environment
    Migration,

    /// Synthetic monitoring only
    Monitoring,
}

/// Compose the app without synthesizing it
pub(crate) fn build(kind: AppKind, context: &Context) -> eyre::Result<App> {
    log::info!("Composing {kind:?} app for environment {}", context.environment());

    match kind {
        AppKind::Main => main_app(context),
        AppKind::Migration => migration_app(context),
        AppKind::Monitoring => {
            let mut app = App::new();
            monitoring(&mut app, context)?;
            Ok(app)
        }
    }
}

fn main_app(context: &Context) -> eyre::Result<App> {
    let mut app = App::new();
    let account = context.account();
    let region = context.region()?;
    let props = || StackProps::new(Target::new(account, Some(region)));
    let edge = || StackProps::new(Target::new(account, Some(CLOUDFRONT_REGION)));

    let secrets = SecretStack::new(&mut app, "SecretStack", props())?;
    let network = NetworkStack::new(&mut app, "NetworkStack", props())?;
    let cloudwatch = CloudwatchStack::new(&mut app, "CloudwatchStack", props())?;

    let dns = CertificateStack::new(
        &mut app,
        "DnsStack",
        props(),
        CertificateParams {
            domain_name: API_DOMAIN,
            alternative_names: &[],
            hosted_zone_id: None,
        },
    )?;

    let frontend_certificate = CertificateStack::new(
        &mut app,
        "FrontendCertificateStack",
        edge(),
        CertificateParams {
            domain_name: FRONTEND_DOMAIN,
            alternative_names: &["*.chronas.org"],
            hosted_zone_id: context.hosted_zone_id(),
        },
    )?;

    let build = BuildStack::new(
        &mut app,
        "BuildChronasApi",
        props(),
        BuildParams {
            github_token: &secrets.github_token,
            docker_username: &secrets.docker_username,
            docker_password: &secrets.docker_password,
        },
    )?;

    let database = DatabaseStack::new(
        &mut app,
        "DatabaseStack",
        props(),
        DatabaseParams {
            vpc: &network.vpc,
            secret_name: LEGACY_DATABASE_SECRET,
            profile: DatabaseProfile::Legacy {
                dashboard: &cloudwatch.dashboard,
            },
        },
    )?;

    let gateway = ApiGatewayStack::new(
        &mut app,
        "ApiGatewayStack",
        props(),
        ApiGatewayParams {
            certificate: Some(&dns.certificate),
            dashboard: &cloudwatch.dashboard,
        },
    )?;

    let compute = ComputeParams {
        vpc: &network.vpc,
        repository: &build.api_repository,
        image_tag: context.api_image_tag()?,
        database_secret: &database.database.secret,
        config_secret: &secrets.config,
        http_api: &gateway.http_api,
        dashboard: &cloudwatch.dashboard,
        certificate: Some(&dns.certificate),
    };

    let compute = match context.compute_variant()? {
        ComputeVariant::Function => ChronasApiLambdaStack::new(&mut app, "ChronasApiLambdaStack", props(), compute)?.id,
        ComputeVariant::Container => ChronasApiFargateStack::new(&mut app, "ChronasApiFargateStack", props(), compute)?.id,
    };

    // The function reads the database secret by name and pulls an image pushed by the build
    app.add_dependency(compute, database.id);
    app.add_dependency(compute, build.id);

    let (bucket, key) = context.metadata_links_code()?;

    MetaDataLinkStack::new(
        &mut app,
        "MetaDataLinkStack",
        props(),
        MetaDataLinkParams {
            http_api: &gateway.http_api,
            code: FunctionCode { bucket, key },
        },
    )?;

    match context.frontend_variant()? {
        FrontendVariant::Cdn => {
            let frontend = FrontendS3Stack::new(
                &mut app,
                "FrontendS3Stack",
                edge(),
                FrontendParams {
                    certificate: &frontend_certificate.certificate,
                },
            )?;

            GitHubActionsUserStack::new(
                &mut app,
                "GitHubActionsUserStack",
                edge(),
                CiParams {
                    bucket: &frontend.bucket,
                },
            )?;
        }

        FrontendVariant::Amplify => {
            log::info!("Hosting the frontend on Amplify, no CI user is created");

            AmplifyStack::new(
                &mut app,
                "AmplifyStack",
                props(),
                AmplifyParams {
                    github_token: &secrets.github_token,
                },
            )?;
        }
    }

    monitoring(&mut app, context)?;

    for id in app.stack_ids() {
        app.add_tags(id, &LIFECYCLE_TAGS);
    }

    Ok(app)
}

fn migration_app(context: &Context) -> eyre::Result<App> {
    let mut app = App::new();
    let environment = context.environment();
    let props = || StackProps::new(Target::new(context.account(), context.get("region")));

    log::info!(
        "Migration cluster for {environment} in {}",
        context.get("region").unwrap_or("the default region")
    );

    let network = NetworkStack::new(
        &mut app,
        &format!("ChronasNetwork-{environment}"),
        props().with_description(&format!("Network infrastructure for Chronas {environment} environment")),
    )?;

    let database = DatabaseStack::new(
        &mut app,
        &format!("ChronasDBMigration-{environment}"),
        props().with_description(&format!("Modernized DocumentDB cluster for Chronas {environment} migration")),
        DatabaseParams {
            vpc: &network.vpc,
            secret_name: &format!("/chronas/{environment}/docdb/modernized"),
            profile: DatabaseProfile::Modernized {
                environment,
                tier: context.tier(),
            },
        },
    )?;

    app.add_dependency(database.id, network.id);

    for (key, value) in [
        ("Project", "Chronas"),
        ("Environment", environment),
        ("Component", "Database"),
        ("Purpose", "Migration"),
        ("ManagedBy", "chronas"),
    ] {
        app.tag_all(key, value);
    }

    Ok(app)
}

fn monitoring(app: &mut App, context: &Context) -> eyre::Result<()> {
    let environment = context.environment();
    let suites = suites::all();

    log::info!(
        "Synthetic monitoring with {} canaries, alerts to {}",
        suites.len(),
        context.alert_email().unwrap_or("nobody")
    );

    SyntheticMonitoringStack::new(
        app,
        &format!("ChronasSyntheticMonitoring-{environment}-v2"),
        StackProps::new(Target::new(context.account(), Some(context.region()?))).with_description(&format!(
            "Chronas API Synthetic Monitoring for {environment} environment - Monitors api.chronas.org endpoints"
        )),
        MonitoringParams {
            suites: &suites,
            base_url: context.api_base_url()?,
            alert_email: context.alert_email(),
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::context;
    use pretty_assertions::assert_eq;

    fn names(app: AppKind, pairs: &[(&str, &str)]) -> Vec<String> {
        build(app, &context(pairs))
            .unwrap()
            .synth()
            .unwrap()
            .stacks
            .into_iter()
            .map(|stack| stack.name)
            .collect()
    }

    #[test]
    fn main_app_order() {
        let assembly = build(AppKind::Main, &context(&[("account", "123456789012")]))
            .unwrap()
            .synth()
            .unwrap();

        let position = |name: &str| assembly.stacks.iter().position(|stack| stack.name == name).unwrap();

        assert_eq!(assembly.stacks.len(), 13);
        assert_eq!(assembly.stacks[0].name, "SecretStack");
        assert!(position("ChronasApiLambdaStack") > position("DatabaseStack"));
        assert!(position("ChronasApiLambdaStack") > position("BuildChronasApi"));
        assert!(position("GitHubActionsUserStack") > position("FrontendS3Stack"));

        let compute = assembly.stack("ChronasApiLambdaStack").unwrap();
        assert!(compute.dependencies.contains(&"DatabaseStack".to_string()));
        assert!(compute.dependencies.contains(&"BuildChronasApi".to_string()));

        for stack in &assembly.stacks {
            assert_eq!(stack.tags["auto-delete"], "never");
            assert_eq!(stack.tags["auto-stop"], "no");
        }
    }

    #[test]
    fn frontend_stacks_live_in_us_east_1() {
        let assembly = build(AppKind::Main, &context(&[])).unwrap().synth().unwrap();

        for name in ["FrontendCertificateStack", "FrontendS3Stack", "GitHubActionsUserStack"] {
            assert_eq!(
                assembly.stack(name).unwrap().target.region.as_deref(),
                Some(CLOUDFRONT_REGION)
            );
        }
    }

    #[test]
    fn variants() {
        let container = names(AppKind::Main, &[("computeVariant", "container")]);
        assert!(container.contains(&"ChronasApiFargateStack".to_string()));
        assert!(!container.contains(&"ChronasApiLambdaStack".to_string()));

        let amplify = names(AppKind::Main, &[("frontendVariant", "amplify")]);
        assert!(amplify.contains(&"AmplifyStack".to_string()));
        assert!(!amplify.contains(&"GitHubActionsUserStack".to_string()));

        assert!(build(AppKind::Main, &context(&[("computeVariant", "vm")])).is_err());
    }

    #[test]
    fn migration_sizing_follows_environment() {
        let instances = |environment: &str| {
            let assembly = build(AppKind::Migration, &context(&[("environment", environment)]))
                .unwrap()
                .synth()
                .unwrap();

            let stack = assembly.stack(&format!("ChronasDBMigration-{environment}")).unwrap();
            let cluster = stack.template.resource("DatabaseCluster").unwrap().clone();

            assert_eq!(stack.dependencies, vec![format!("ChronasNetwork-{environment}")]);
            assert_eq!(stack.tags["Purpose"], "Migration");
            (stack.template.count_of_type("AWS::DocDB::DBInstance"), cluster)
        };

        let (count, cluster) = instances("dev");
        assert_eq!(count, 1);
        assert_eq!(cluster["Properties"]["BackupRetentionPeriod"], 7);
        assert_eq!(cluster["Properties"]["DeletionProtection"], false);

        let (count, cluster) = instances("prod");
        assert_eq!(count, 3);
        assert_eq!(cluster["Properties"]["BackupRetentionPeriod"], 30);
        assert_eq!(cluster["Properties"]["DeletionProtection"], true);
    }

    #[test]
    fn monitoring_only() {
        assert_eq!(
            names(AppKind::Monitoring, &[("environment", "prod")]),
            vec!["ChronasSyntheticMonitoring-prod-v2".to_string()]
        );
    }
}
