use super::build::Repository;
use super::certificate::Certificate;
use super::gateway::{HttpApi, RouteOptions};
use super::network::Vpc;
use super::secret::Secret;
use super::{assume_role_policy, inline_policy, managed_policy, security_group};
use chronas_common::dashboard::{Dashboard, GraphWidget, Metric};
use chronas_common::route::HttpMethod;
use chronas_common::template::{get_att, join, reference, CfnResource, REGION};
use chronas_common::{App, Stack, StackId, StackProps};
use serde_json::{json, Value};

/// Paths the API serves, everything under /v1 goes to the application
pub(crate) const API_PATHS: [&str; 2] = ["/", "/v1/{proxy+}"];

/// Handles both compute variants need
pub(crate) struct ComputeParams<'a> {
    pub(crate) vpc: &'a Vpc,
    pub(crate) repository: &'a Repository,
    pub(crate) image_tag: &'a str,
    pub(crate) database_secret: &'a Secret,
    pub(crate) config_secret: &'a Secret,
    pub(crate) http_api: &'a HttpApi,
    pub(crate) dashboard: &'a Dashboard,

    /// Load balancer listens on HTTPS with it, the function variant ignores it
    pub(crate) certificate: Option<&'a Certificate>,
}

/// Environment of the API process, secrets are fetched by name at runtime
pub(crate) fn application_environment(params: &ComputeParams, port: u16) -> Vec<(&'static str, Value)> {
    vec![
        ("SECRET_DB_NAME", json!(params.database_secret.name)),
        ("SECRET_CONFIG_NAME", json!(params.config_secret.name)),
        ("DEBUG", json!("chronas-api:*")),
        ("region", reference(REGION)),
        ("NODE_ENV", json!("development")),
        ("PORT", json!(port.to_string())),
        ("CHRONAS_HOST", json!("https://chronas.org")),
        ("FACEBOOK_CALLBACK_URL", json!("https://api.chronas.org/v1/auth/login/facebook")),
        ("GOOGLE_CALLBACK_URL", json!("https://api.chronas.org/v1/auth/login/google")),
        ("GITHUB_CALLBACK_URL", json!("https://api.chronas.org/v1/auth/login/github")),
        ("TWITTER_CALLBACK_URL", json!("https://api.chronas.org/v1/auth/login/twitter")),
    ]
}

/// The API as a container-image Lambda function inside the VPC
pub(crate) struct ChronasApiLambdaStack {
    pub(crate) id: StackId,
}

impl ChronasApiLambdaStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: ComputeParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);

        let vpc_id = stack.resolve(&params.vpc.id)?;
        let subnets = Vpc::subnet_ids(&mut stack, &params.vpc.private_subnets)?;
        let repository_uri = stack.resolve(&params.repository.uri)?;
        let secrets = vec![
            params.database_secret.grant_read(&mut stack)?,
            params.config_secret.grant_read(&mut stack)?,
        ];

        let mut variables = serde_json::Map::new();
        variables.insert("VPC_ID".into(), vpc_id.clone());
        variables.extend(
            application_environment(&params, 8080)
                .into_iter()
                .map(|(key, value)| (key.to_string(), value)),
        );

        stack.add_resources(vec![
            CfnResource::new(
                "ChronasApiLambdaSecurityGroup",
                security_group("Automatic security group for Lambda Function ChronasApiLambdaFunction", vpc_id, vec![]),
            ),
            CfnResource::new(
                "ChronasApiLambdaRole",
                json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": assume_role_policy("lambda.amazonaws.com"),
                        "ManagedPolicyArns": [
                            managed_policy("service-role/AWSLambdaBasicExecutionRole"),
                            managed_policy("service-role/AWSLambdaVPCAccessExecutionRole"),
                            managed_policy("AWSXRayDaemonWriteAccess"),
                        ],
                        "Policies": [inline_policy("ChronasApiSecrets", secrets)],
                    }
                }),
            ),
            CfnResource::new(
                "ChronasApiLambdaFunction",
                json!({
                    "Type": "AWS::Lambda::Function",
                    "Properties": {
                        "PackageType": "Image",
                        "Code": {
                            "ImageUri": join("", vec![repository_uri, json!(":"), json!(params.image_tag)]),
                        },
                        "Role": get_att("ChronasApiLambdaRole", "Arn"),
                        "MemorySize": 300,
                        "Timeout": 300,
                        "TracingConfig": { "Mode": "Active" },
                        "VpcConfig": {
                            "SubnetIds": subnets,
                            "SecurityGroupIds": [get_att("ChronasApiLambdaSecurityGroup", "GroupId")],
                        },
                        "Environment": { "Variables": variables },
                    }
                }),
            )
            .depends_on(&["ChronasApiLambdaRole"]),
        ])?;

        let api = params.http_api;
        let integration = api.add_lambda_integration(
            &mut stack,
            "ChronasApi",
            get_att("ChronasApiLambdaFunction", "Arn"),
        )?;

        for path in API_PATHS {
            api.add_routes(
                &mut stack,
                RouteOptions {
                    path,
                    methods: &[HttpMethod::Any],
                    integration: &integration,
                },
            )?;
        }

        let function_name = stack.export(
            "LambdaFunctionName",
            reference("ChronasApiLambdaFunction"),
            "Name of the Chronas API function",
        )?;

        let metric = |name: &str| Metric::new("AWS/Lambda", name).dimension("FunctionName", &function_name);

        params.dashboard.add_widgets(vec![GraphWidget::new(
            "Lambda API Invocations",
            vec![metric("Invocations").statistic("Sum")],
        )]);
        params.dashboard.add_widgets(vec![GraphWidget::new(
            "Lambda Function Errors Metrics",
            vec![metric("Errors").statistic("Sum")],
        )]);
        params.dashboard.add_widgets(vec![GraphWidget::new(
            "Lambda API Durations Metrics",
            vec![metric("Duration")],
        )]);
        params.dashboard.add_widgets(vec![GraphWidget::new(
            "Lambda API Throttles",
            vec![metric("Throttles").statistic("Sum")],
        )]);
        params.dashboard.add_widgets(vec![GraphWidget::new(
            "Lambda API Durations",
            vec![metric("Duration").label("Duration")],
        )]);
        params.dashboard.add_widgets(vec![GraphWidget::new(
            "Lambda Concurrent Executions",
            vec![metric("ConcurrentExecutions").statistic("Maximum")],
        )]);

        Ok(Self {
            id: app.add_stack(stack)?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stacks::build::{BuildParams, BuildStack};
    use crate::stacks::database::{DatabaseParams, DatabaseProfile, DatabaseStack};
    use crate::stacks::gateway::{ApiGatewayParams, ApiGatewayStack};
    use crate::stacks::network::NetworkStack;
    use crate::stacks::observability::CloudwatchStack;
    use crate::stacks::secret::SecretStack;
    use crate::stacks::tests::props;

    /// Everything a compute stack depends on, declared in one app
    pub(crate) struct Fixture {
        pub(crate) network: NetworkStack,
        pub(crate) secrets: SecretStack,
        pub(crate) build: BuildStack,
        pub(crate) database: DatabaseStack,
        pub(crate) gateway: ApiGatewayStack,
        pub(crate) cloudwatch: CloudwatchStack,
    }

    impl Fixture {
        pub(crate) fn new(app: &mut App) -> Self {
            let secrets = SecretStack::new(app, "SecretStack", props()).unwrap();
            let network = NetworkStack::new(app, "NetworkStack", props()).unwrap();
            let cloudwatch = CloudwatchStack::new(app, "CloudwatchStack", props()).unwrap();
            let build = BuildStack::new(
                app,
                "BuildChronasApi",
                props(),
                BuildParams {
                    github_token: &secrets.github_token,
                    docker_username: &secrets.docker_username,
                    docker_password: &secrets.docker_password,
                },
            )
            .unwrap();
            let database = DatabaseStack::new(
                app,
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
            let gateway = ApiGatewayStack::new(
                app,
                "ApiGatewayStack",
                props(),
                ApiGatewayParams {
                    certificate: None,
                    dashboard: &cloudwatch.dashboard,
                },
            )
            .unwrap();

            Self {
                network,
                secrets,
                build,
                database,
                gateway,
                cloudwatch,
            }
        }

        pub(crate) fn params(&self) -> ComputeParams<'_> {
            ComputeParams {
                vpc: &self.network.vpc,
                repository: &self.build.api_repository,
                image_tag: "chronas-api-2018522",
                database_secret: &self.database.database.secret,
                config_secret: &self.secrets.config,
                http_api: &self.gateway.http_api,
                dashboard: &self.cloudwatch.dashboard,
                certificate: None,
            }
        }
    }

    #[test]
    fn function_reads_secrets_by_grant_only() {
        let mut app = App::new();
        let fixture = Fixture::new(&mut app);
        let compute = ChronasApiLambdaStack::new(&mut app, "ChronasApiLambdaStack", props(), fixture.params()).unwrap();

        let stack = app.stack(compute.id);
        let template = stack.template();
        let function = template.resource("ChronasApiLambdaFunction").unwrap();
        let variables = &function["Properties"]["Environment"]["Variables"];

        assert_eq!(variables["SECRET_CONFIG_NAME"], "/chronas/secrets");
        assert_eq!(variables["SECRET_DB_NAME"], "/chronas/docdb/newpassword");
        assert!(variables.get("chronasConfig").is_none());
        assert!(!template.to_json().unwrap().contains("myMAILGUN_KEY"));

        let role = template.resource("ChronasApiLambdaRole").unwrap();
        let grants = &role["Properties"]["Policies"][0]["PolicyDocument"]["Statement"];
        assert_eq!(grants.as_array().unwrap().len(), 2);

        for dependency in ["NetworkStack", "SecretStack", "DatabaseStack", "BuildChronasApi", "ApiGatewayStack"] {
            assert!(stack.dependencies().contains(dependency), "missing {dependency}");
        }
    }

    #[test]
    fn function_serves_root_and_v1() {
        let mut app = App::new();
        let fixture = Fixture::new(&mut app);
        let compute = ChronasApiLambdaStack::new(&mut app, "ChronasApiLambdaStack", props(), fixture.params()).unwrap();

        let template = app.stack(compute.id).template();
        let keys = template
            .resources_of_type("AWS::ApiGatewayV2::Route")
            .map(|(_, route)| route["Properties"]["RouteKey"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();

        assert!(keys.contains(&"ANY /".to_string()));
        assert!(keys.contains(&"ANY /v1/{proxy+}".to_string()));
        assert_eq!(fixture.gateway.http_api.routes().len(), 2);
        assert!(app.synth().is_ok());
    }
}
