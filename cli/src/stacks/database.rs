use super::network::Vpc;
use super::secret::Secret;
use super::security_group;
use crate::config::Tier;
use chronas_common::dashboard::{Dashboard, GraphWidget, Metric};
use chronas_common::template::{get_att, join, reference, secret_reference, CfnResource, RemovalPolicy};
use chronas_common::{App, Output, Stack, StackId, StackProps};
use serde_json::{json, Value};

const DOCDB_PORT: u16 = 27017;

/// Instance count, class and data protection of a cluster
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Sizing {
    pub(crate) instances: u32,
    pub(crate) instance_class: &'static str,
    pub(crate) backup_retention_days: Option<u32>,
    pub(crate) deletion_protection: bool,
    pub(crate) removal: RemovalPolicy,
}

impl Sizing {
    fn legacy() -> Self {
        Self {
            instances: 1,
            instance_class: "db.t3.medium",
            backup_retention_days: None,
            deletion_protection: false,
            removal: RemovalPolicy::Destroy,
        }
    }

    pub(crate) fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Prod => Self {
                instances: 3,
                instance_class: "db.r6g.large",
                backup_retention_days: Some(30),
                deletion_protection: true,
                removal: RemovalPolicy::Retain,
            },
            Tier::Dev | Tier::Staging => Self {
                instances: 1,
                instance_class: "db.t4g.medium",
                backup_retention_days: Some(7),
                deletion_protection: false,
                removal: RemovalPolicy::Destroy,
            },
        }
    }
}

pub(crate) enum DatabaseProfile<'a> {
    /// DocumentDB 3.6 without TLS, graphs on the shared dashboard
    Legacy { dashboard: &'a Dashboard },

    /// DocumentDB 5.0 with encryption, audit logs, alarms and an own dashboard
    Modernized { environment: &'a str, tier: Tier },
}

pub(crate) struct DatabaseParams<'a> {
    pub(crate) vpc: &'a Vpc,
    pub(crate) secret_name: &'a str,
    pub(crate) profile: DatabaseProfile<'a>,
}

#[derive(Clone, Debug)]
pub(crate) struct Database {
    pub(crate) secret: Secret,
    pub(crate) cluster_identifier: Output,
}

pub(crate) struct DatabaseStack {
    pub(crate) id: StackId,
    pub(crate) database: Database,
}

struct Engine {
    version: &'static str,
    family: &'static str,
    parameter_group: String,
    parameters: Value,
    username: &'static str,
    exclude_characters: &'static str,
    secret_name: String,
}

impl DatabaseStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: DatabaseParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);

        let (engine, sizing) = match &params.profile {
            DatabaseProfile::Legacy { .. } => (
                Engine {
                    version: "3.6",
                    family: "docdb3.6",
                    parameter_group: "disabled-tls-parameter".into(),
                    parameters: json!({ "tls": "disabled" }),
                    username: "myuser",
                    exclude_characters: "\"@/:",
                    secret_name: params.secret_name.to_string(),
                },
                Sizing::legacy(),
            ),
            DatabaseProfile::Modernized { environment, tier } => (
                Engine {
                    version: "5.0.0",
                    family: "docdb5.0",
                    parameter_group: format!("chronas-modernized-{environment}-params"),
                    parameters: json!({
                        "tls": "enabled",
                        "ttl_monitor": "enabled",
                        "profiler": "enabled",
                        "audit_logs": "enabled",
                        "change_stream_log_retention_duration": "10800",
                        "profiler_threshold_ms": "100",
                    }),
                    username: "chronas_admin",
                    exclude_characters: "\"@/\\'`",
                    secret_name: format!("{}-modernized", params.secret_name),
                },
                Sizing::for_tier(*tier),
            ),
        };

        let vpc_id = stack.resolve(&params.vpc.id)?;
        let vpc_cidr = stack.resolve(&params.vpc.cidr)?;
        let subnets = Vpc::subnet_ids(&mut stack, &params.vpc.private_subnets)?;

        let secret = Secret::declare(
            &mut stack,
            "DatabaseSecret",
            &engine.secret_name,
            &format!("Master credentials of the {name} DocumentDB cluster"),
            json!({
                "SecretStringTemplate": serde_json::to_string(&json!({ "username": engine.username }))?,
                "GenerateStringKey": "password",
                "PasswordLength": 41,
                "ExcludeCharacters": engine.exclude_characters,
            }),
        )?;

        let mut cluster = json!({
            "EngineVersion": engine.version,
            "MasterUsername": secret_reference(reference("DatabaseSecret"), Some("username")),
            "MasterUserPassword": secret_reference(reference("DatabaseSecret"), Some("password")),
            "DBSubnetGroupName": reference("DatabaseSubnets"),
            "VpcSecurityGroupIds": [get_att("DatabaseSecurityGroup", "GroupId")],
            "DBClusterParameterGroupName": reference("DatabaseParameterGroup"),
        });

        if let DatabaseProfile::Modernized { .. } = params.profile {
            cluster["StorageEncrypted"] = json!(true);
            cluster["PreferredBackupWindow"] = json!("03:00-04:00");
            cluster["PreferredMaintenanceWindow"] = json!("sun:04:00-sun:05:00");
            cluster["DeletionProtection"] = json!(sizing.deletion_protection);
            cluster["EnableCloudwatchLogsExports"] = json!(["audit", "profiler"]);
        }

        if let Some(days) = sizing.backup_retention_days {
            cluster["BackupRetentionPeriod"] = json!(days);
        }

        stack.add_resources(vec![
            CfnResource::new(
                "DatabaseParameterGroup",
                json!({
                    "Type": "AWS::DocDB::DBClusterParameterGroup",
                    "Properties": {
                        "Name": engine.parameter_group,
                        "Family": engine.family,
                        "Description": format!("Cluster parameter group for {}", engine.family),
                        "Parameters": engine.parameters,
                    }
                }),
            ),
            CfnResource::new(
                "DatabaseSubnets",
                json!({
                    "Type": "AWS::DocDB::DBSubnetGroup",
                    "Properties": {
                        "DBSubnetGroupDescription": format!("Subnets for {name} database"),
                        "SubnetIds": subnets,
                    }
                }),
            ),
            CfnResource::new(
                "DatabaseSecurityGroup",
                security_group(
                    "DocumentDB security group",
                    vpc_id,
                    vec![json!({
                        "IpProtocol": "tcp",
                        "FromPort": DOCDB_PORT,
                        "ToPort": DOCDB_PORT,
                        "CidrIp": vpc_cidr,
                        "Description": "Allow DocumentDB access from VPC",
                    })],
                ),
            ),
            CfnResource::new(
                "DatabaseCluster",
                json!({ "Type": "AWS::DocDB::DBCluster", "Properties": cluster }),
            )
            .with_removal_policy(sizing.removal),
            CfnResource::new(
                "DatabaseSecretAttachment",
                json!({
                    "Type": "AWS::SecretsManager::SecretTargetAttachment",
                    "Properties": {
                        "SecretId": reference("DatabaseSecret"),
                        "TargetId": reference("DatabaseCluster"),
                        "TargetType": "AWS::DocDB::DBCluster",
                    }
                }),
            ),
        ])?;

        for index in 1..=sizing.instances {
            stack.add_resource(
                CfnResource::new(
                    &format!("DatabaseInstance{index}"),
                    json!({
                        "Type": "AWS::DocDB::DBInstance",
                        "Properties": {
                            "DBClusterIdentifier": reference("DatabaseCluster"),
                            "DBInstanceClass": sizing.instance_class,
                        }
                    }),
                )
                .with_removal_policy(sizing.removal),
            )?;
        }

        stack.export(
            "ClusterEndpoint",
            join(
                ":",
                vec![
                    get_att("DatabaseCluster", "Endpoint"),
                    get_att("DatabaseCluster", "Port"),
                ],
            ),
            "DocumentDB cluster endpoint",
        )?;

        let database = Database {
            secret,
            cluster_identifier: stack.export(
                "ClusterIdentifier",
                reference("DatabaseCluster"),
                "DocumentDB cluster identifier",
            )?,
        };

        match params.profile {
            DatabaseProfile::Legacy { dashboard } => {
                let identifier = &database.cluster_identifier;

                dashboard.add_widgets(vec![
                    GraphWidget::new(
                        "DocumentDB CPU Utilization",
                        vec![docdb_metric("CPUUtilization", identifier)],
                    ),
                    GraphWidget::new(
                        "DocumentDB Connections",
                        vec![docdb_metric("DatabaseConnections", identifier).statistic("Sum")],
                    ),
                ]);
            }
            DatabaseProfile::Modernized { environment, tier } => {
                add_monitoring(&mut stack, name, environment, tier, &database)?;
            }
        }

        Ok(Self {
            id: app.add_stack(stack)?,
            database,
        })
    }
}

fn docdb_metric(name: &str, cluster_identifier: &Output) -> Metric {
    Metric::new("AWS/DocDB", name).dimension("DBClusterIdentifier", cluster_identifier)
}

/// Log group, alarms and the cluster dashboard of the modernized profile
fn add_monitoring(stack: &mut Stack, name: &str, environment: &str, tier: Tier, database: &Database) -> eyre::Result<()> {
    let removal = match tier {
        Tier::Prod => RemovalPolicy::Retain,
        Tier::Dev | Tier::Staging => RemovalPolicy::Destroy,
    };

    stack.add_resource(
        CfnResource::new(
            "DocumentDBLogGroup",
            json!({
                "Type": "AWS::Logs::LogGroup",
                "Properties": {
                    "LogGroupName": format!("/aws/docdb/{}", name.to_lowercase()),
                    "RetentionInDays": 30,
                }
            }),
        )
        .with_removal_policy(removal),
    )?;

    let alarms = [
        ("DocumentDBHighCPU", "CPUUtilization", 80.0, 2, "DocumentDB CPU utilization is high"),
        ("DocumentDBHighConnections", "DatabaseConnections", 80.0, 2, "DocumentDB connection count is high"),
        ("DocumentDBHighReadLatency", "ReadLatency", 0.2, 3, "DocumentDB read latency is high"),
        ("DocumentDBHighWriteLatency", "WriteLatency", 0.2, 3, "DocumentDB write latency is high"),
    ];

    for (id, metric, threshold, periods, description) in alarms {
        stack.add_resource(CfnResource::new(
            id,
            json!({
                "Type": "AWS::CloudWatch::Alarm",
                "Properties": {
                    "AlarmDescription": description,
                    "Namespace": "AWS/DocDB",
                    "MetricName": metric,
                    "Dimensions": [{ "Name": "DBClusterIdentifier", "Value": reference("DatabaseCluster") }],
                    "Statistic": "Average",
                    "Period": 300,
                    "Threshold": threshold,
                    "EvaluationPeriods": periods,
                    "ComparisonOperator": "GreaterThanOrEqualToThreshold",
                    "TreatMissingData": "notBreaching",
                }
            }),
        ))?;
    }

    let dashboard = Dashboard::new(stack, "DocumentDBDashboard", &format!("chronas-docdb-{environment}"));
    let identifier = &database.cluster_identifier;
    let metric = |name: &str| docdb_metric(name, identifier);

    dashboard.add_widgets(vec![
        GraphWidget::new("DocumentDB CPU Utilization (Modernized)", vec![metric("CPUUtilization")]).width(12),
        GraphWidget::new(
            "DocumentDB Connections (Modernized)",
            vec![metric("DatabaseConnections").statistic("Sum")],
        )
        .width(12),
    ]);

    dashboard.add_widgets(vec![
        GraphWidget::new(
            "DocumentDB Latency (Modernized)",
            vec![
                metric("ReadLatency").label("Read Latency"),
                metric("WriteLatency").label("Write Latency"),
            ],
        )
        .width(12),
        GraphWidget::new(
            "DocumentDB IOPS (Modernized)",
            vec![
                metric("ReadIOPS").label("Read IOPS"),
                metric("WriteIOPS").label("Write IOPS"),
            ],
        )
        .width(12),
    ]);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::network::NetworkStack;
    use crate::stacks::observability::CloudwatchStack;
    use crate::stacks::tests::props;
    use pretty_assertions::assert_eq;

    fn modernized(environment: &str, tier: Tier) -> (App, DatabaseStack) {
        let mut app = App::new();
        let network = NetworkStack::new(&mut app, "ChronasNetwork", props()).unwrap();
        let database = DatabaseStack::new(
            &mut app,
            "ChronasDBMigration",
            props(),
            DatabaseParams {
                vpc: &network.vpc,
                secret_name: "/chronas/dev/docdb/modernized",
                profile: DatabaseProfile::Modernized { environment, tier },
            },
        )
        .unwrap();

        (app, database)
    }

    #[test]
    fn legacy_cluster_contributes_to_shared_dashboard() {
        let mut app = App::new();
        let network = NetworkStack::new(&mut app, "NetworkStack", props()).unwrap();
        let cloudwatch = CloudwatchStack::new(&mut app, "CloudwatchStack", props()).unwrap();
        let database = DatabaseStack::new(
            &mut app,
            "DatabaseStack",
            props(),
            DatabaseParams {
                vpc: &network.vpc,
                secret_name: "/chronas/docdb/newpassword",
                profile: DatabaseProfile::Legacy {
                    dashboard: &cloudwatch.dashboard,
                },
            },
        )
        .unwrap();

        let stack = app.stack(database.id);
        let template = stack.template();
        let cluster = template.resource("DatabaseCluster").unwrap();

        assert_eq!(cluster["Properties"]["EngineVersion"], "3.6");
        assert_eq!(cluster["DeletionPolicy"], "Delete");
        assert_eq!(template.count_of_type("AWS::DocDB::DBInstance"), 1);
        assert!(stack.dependencies().contains("NetworkStack"));
        assert_eq!(cloudwatch.dashboard.widget_count(), 2);
        assert_eq!(database.database.secret.name, "/chronas/docdb/newpassword");

        let group = template.resource("DatabaseSecurityGroup").unwrap();
        assert_eq!(group["Properties"]["SecurityGroupIngress"][0]["FromPort"], 27017);
        assert_eq!(
            group["Properties"]["SecurityGroupIngress"][0]["CidrIp"]["Fn::ImportValue"],
            "NetworkStack:VpcCidrBlock"
        );
    }

    #[test]
    fn dev_sizing() {
        let (app, database) = modernized("dev", Tier::Dev);
        let template = app.stack(database.id).template();
        let cluster = template.resource("DatabaseCluster").unwrap();

        assert_eq!(template.count_of_type("AWS::DocDB::DBInstance"), 1);
        assert_eq!(cluster["Properties"]["BackupRetentionPeriod"], 7);
        assert_eq!(cluster["Properties"]["DeletionProtection"], false);
        assert_eq!(cluster["DeletionPolicy"], "Delete");
        assert_eq!(
            template.resource("DatabaseInstance1").unwrap()["Properties"]["DBInstanceClass"],
            "db.t4g.medium"
        );
    }

    #[test]
    fn prod_sizing() {
        let (app, database) = modernized("prod", Tier::Prod);
        let template = app.stack(database.id).template();
        let cluster = template.resource("DatabaseCluster").unwrap();

        assert_eq!(template.count_of_type("AWS::DocDB::DBInstance"), 3);
        assert_eq!(cluster["Properties"]["BackupRetentionPeriod"], 30);
        assert_eq!(cluster["Properties"]["DeletionProtection"], true);
        assert_eq!(cluster["DeletionPolicy"], "Retain");
        assert_eq!(
            template.resource("DatabaseInstance3").unwrap()["Properties"]["DBInstanceClass"],
            "db.r6g.large"
        );
        assert_eq!(template.resource("DocumentDBLogGroup").unwrap()["DeletionPolicy"], "Retain");
    }

    #[test]
    fn modernized_profile_monitors_itself() {
        let (app, database) = modernized("staging", Tier::Staging);
        let stack = app.stack(database.id);
        let template = stack.template();

        assert_eq!(template.count_of_type("AWS::CloudWatch::Alarm"), 4);
        assert_eq!(
            template.resource("DatabaseSecret").unwrap()["Properties"]["Name"],
            "/chronas/dev/docdb/modernized-modernized"
        );
        assert_eq!(
            template.resource("DatabaseParameterGroup").unwrap()["Properties"]["Name"],
            "chronas-modernized-staging-params"
        );

        let outputs = template.outputs();
        assert!(outputs.contains_key("ClusterEndpoint"));
        assert!(outputs.contains_key("ClusterIdentifier"));
        assert!(outputs.contains_key("DatabaseSecretArn"));
    }
}
