use super::certificate::Certificate;
use chronas_common::dashboard::{Dashboard, GraphWidget, Metric};
use chronas_common::route::{HttpMethod, Route, RouteTable};
use chronas_common::template::{get_att, join, logical_id, reference, sub_with, CfnResource};
use chronas_common::{App, Output, Stack, StackId, StackProps};
use serde_json::{json, Map, Value};

const API_NAME: &str = "ChronasApiGateway";

/// Integration declared in the stack that registers routes on the API
#[derive(Clone, Debug)]
pub(crate) struct HttpIntegration {
    logical_id: String,
}

pub(crate) struct RouteOptions<'a> {
    pub(crate) path: &'a str,
    pub(crate) methods: &'a [HttpMethod],
    pub(crate) integration: &'a HttpIntegration,
}

/// HTTP API handle shared with the stacks serving its routes
#[derive(Clone, Debug)]
pub(crate) struct HttpApi {
    pub(crate) api_id: Output,
    routes: RouteTable,
}

impl HttpApi {
    /// Proxy requests to a Lambda function, with the permission for API Gateway to invoke it
    pub(crate) fn add_lambda_integration(
        &self,
        stack: &mut Stack,
        id: &str,
        function_arn: Value,
    ) -> eyre::Result<HttpIntegration> {
        let api_id = stack.resolve(&self.api_id)?;
        let integration = format!("{id}Integration");
        let mut variables = Map::new();
        variables.insert("ApiId".into(), api_id.clone());

        stack.add_resources(vec![
            CfnResource::new(
                &integration,
                json!({
                    "Type": "AWS::ApiGatewayV2::Integration",
                    "Properties": {
                        "ApiId": api_id,
                        "IntegrationType": "AWS_PROXY",
                        "IntegrationUri": function_arn,
                        "PayloadFormatVersion": "2.0",
                    }
                }),
            ),
            CfnResource::new(
                &format!("{id}InvokePermission"),
                json!({
                    "Type": "AWS::Lambda::Permission",
                    "Properties": {
                        "Action": "lambda:InvokeFunction",
                        "FunctionName": function_arn,
                        "Principal": "apigateway.amazonaws.com",
                        "SourceArn": sub_with(
                            "arn:${AWS::Partition}:execute-api:${AWS::Region}:${AWS::AccountId}:${ApiId}/*/*",
                            variables,
                        ),
                    }
                }),
            ),
        ])?;

        Ok(HttpIntegration {
            logical_id: integration,
        })
    }

    /// Forward requests to an HTTP endpoint, `{proxy}` in the URI takes the greedy path part
    pub(crate) fn add_http_integration(&self, stack: &mut Stack, id: &str, uri: Value) -> eyre::Result<HttpIntegration> {
        let api_id = stack.resolve(&self.api_id)?;
        let integration = format!("{id}Integration");

        stack.add_resource(CfnResource::new(
            &integration,
            json!({
                "Type": "AWS::ApiGatewayV2::Integration",
                "Properties": {
                    "ApiId": api_id,
                    "IntegrationType": "HTTP_PROXY",
                    "IntegrationMethod": "ANY",
                    "IntegrationUri": uri,
                    "PayloadFormatVersion": "1.0",
                }
            }),
        ))?;

        Ok(HttpIntegration {
            logical_id: integration,
        })
    }

    /// Declare one route per method in `stack` and record them in the API's route table
    pub(crate) fn add_routes(&self, stack: &mut Stack, options: RouteOptions) -> eyre::Result<()> {
        let api_id = stack.resolve(&self.api_id)?;

        for method in options.methods {
            let route = Route {
                stack: stack.name().to_string(),
                method: *method,
                path: options.path.to_string(),
            };

            self.routes.record(route.clone())?;

            stack.add_resource(CfnResource::new(
                &format!("Route{}{}", method.as_str(), logical_id(options.path)),
                json!({
                    "Type": "AWS::ApiGatewayV2::Route",
                    "Properties": {
                        "ApiId": api_id,
                        "RouteKey": route.key(),
                        "AuthorizationType": "NONE",
                        "Target": join("", vec![json!("integrations/"), reference(&options.integration.logical_id)]),
                    }
                }),
            ))?;
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn routes(&self) -> Vec<Route> {
        self.routes.routes()
    }
}

pub(crate) struct ApiGatewayParams<'a> {
    /// Custom domain is only set up with a certificate
    pub(crate) certificate: Option<&'a Certificate>,
    pub(crate) dashboard: &'a Dashboard,
}

/// HTTP API with an auto-deployed default stage
pub(crate) struct ApiGatewayStack {
    pub(crate) id: StackId,
    pub(crate) http_api: HttpApi,
}

impl ApiGatewayStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: ApiGatewayParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let routes = RouteTable::new(&mut stack, API_NAME);

        stack.add_resources(vec![
            CfnResource::new(
                API_NAME,
                json!({
                    "Type": "AWS::ApiGatewayV2::Api",
                    "Properties": {
                        "Name": API_NAME,
                        "ProtocolType": "HTTP",
                    }
                }),
            ),
            CfnResource::new(
                "DefaultStage",
                json!({
                    "Type": "AWS::ApiGatewayV2::Stage",
                    "Properties": {
                        "ApiId": reference(API_NAME),
                        "StageName": "$default",
                        "AutoDeploy": true,
                    }
                }),
            ),
        ])?;

        if let Some(certificate) = params.certificate {
            let certificate_arn = stack.resolve(&certificate.arn)?;

            stack.add_resources(vec![
                CfnResource::new(
                    "DN",
                    json!({
                        "Type": "AWS::ApiGatewayV2::DomainName",
                        "Properties": {
                            "DomainName": certificate.domain_name,
                            "DomainNameConfigurations": [{
                                "CertificateArn": certificate_arn,
                                "EndpointType": "REGIONAL",
                                "SecurityPolicy": "TLS_1_2",
                            }],
                        }
                    }),
                ),
                CfnResource::new(
                    "DefaultDomainMapping",
                    json!({
                        "Type": "AWS::ApiGatewayV2::ApiMapping",
                        "Properties": {
                            "ApiId": reference(API_NAME),
                            "DomainName": reference("DN"),
                            "Stage": reference("DefaultStage"),
                        }
                    }),
                )
                .depends_on(&["DN", "DefaultStage"]),
            ])?;

            stack.add_output(
                "CustomDomainTarget",
                get_att("DN", "RegionalDomainName"),
                &format!("DNS target for {}", certificate.domain_name),
            )?;
        }

        stack.export(
            "ChronasApiUrl",
            get_att(API_NAME, "ApiEndpoint"),
            "The URL of the Chronas API",
        )?;

        let http_api = HttpApi {
            api_id: stack.export("ApiId", reference(API_NAME), "ID of the Chronas HTTP API")?,
            routes,
        };

        let api_metric = |name: &str| {
            Metric::new("AWS/ApiGateway", name)
                .dimension("ApiId", &http_api.api_id)
                .statistic("Sum")
        };

        params.dashboard.add_widgets(vec![GraphWidget::new(
            "API Gateway Metrics",
            vec![api_metric("4xx"), api_metric("5xx")],
        )]);

        params.dashboard.add_widgets(vec![GraphWidget::new(
            "API Metrics count",
            vec![api_metric("Count")],
        )]);

        Ok(Self {
            id: app.add_stack(stack)?,
            http_api,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stacks::certificate::{CertificateParams, CertificateStack};
    use crate::stacks::observability::CloudwatchStack;
    use crate::stacks::tests::props;
    use crate::stacks::API_DOMAIN;

    /// App with observability and a gateway, optionally on a custom domain
    pub(crate) fn gateway(with_certificate: bool) -> (App, ApiGatewayStack) {
        let mut app = App::new();
        let cloudwatch = CloudwatchStack::new(&mut app, "CloudwatchStack", props()).unwrap();

        let dns = with_certificate.then(|| {
            CertificateStack::new(
                &mut app,
                "DnsStack",
                props(),
                CertificateParams {
                    domain_name: API_DOMAIN,
                    alternative_names: &[],
                    hosted_zone_id: None,
                },
            )
            .unwrap()
        });

        let gateway = ApiGatewayStack::new(
            &mut app,
            "ApiGatewayStack",
            props(),
            ApiGatewayParams {
                certificate: dns.as_ref().map(|dns| &dns.certificate),
                dashboard: &cloudwatch.dashboard,
            },
        )
        .unwrap();

        (app, gateway)
    }

    #[test]
    fn custom_domain_with_certificate() {
        let (app, gateway) = gateway(true);
        let stack = app.stack(gateway.id);
        let template = stack.template();

        assert_eq!(template.count_of_type("AWS::ApiGatewayV2::DomainName"), 1);
        assert_eq!(template.count_of_type("AWS::ApiGatewayV2::ApiMapping"), 1);
        assert!(stack.dependencies().contains("DnsStack"));
        assert!(app.synth().is_ok());
    }

    #[test]
    fn no_custom_domain_without_certificate() {
        let (app, gateway) = gateway(false);
        let template = app.stack(gateway.id).template();

        assert_eq!(template.count_of_type("AWS::ApiGatewayV2::DomainName"), 0);
        assert_eq!(template.count_of_type("AWS::ApiGatewayV2::ApiMapping"), 0);
        assert!(template.outputs().contains_key("ChronasApiUrl"));
        assert!(app.synth().is_ok());
    }

    #[test]
    fn routes_from_two_stacks() {
        let (mut app, gateway) = gateway(false);
        let api = gateway.http_api.clone();

        let mut compute = Stack::new("Compute", props());
        let integration = api
            .add_lambda_integration(&mut compute, "ChronasApi", json!("arn:aws:lambda:fn"))
            .unwrap();
        api.add_routes(
            &mut compute,
            RouteOptions {
                path: "/",
                methods: &[HttpMethod::Any],
                integration: &integration,
            },
        )
        .unwrap();

        let mut metadata = Stack::new("Metadata", props());
        let integration = api
            .add_lambda_integration(&mut metadata, "MetadataLinks", json!("arn:aws:lambda:links"))
            .unwrap();
        api.add_routes(
            &mut metadata,
            RouteOptions {
                path: "/v1/metadata/links",
                methods: &[HttpMethod::Any],
                integration: &integration,
            },
        )
        .unwrap();

        assert!(compute.template().resource("RouteANYRoot").is_some());
        assert!(metadata.template().resource("RouteANYV1MetadataLinks").is_some());
        assert!(compute.dependencies().contains("ApiGatewayStack"));

        app.add_stack(compute).unwrap();
        app.add_stack(metadata).unwrap();

        let assembly = app.synth().unwrap();
        let routes = assembly
            .stacks
            .iter()
            .map(|stack| stack.template.count_of_type("AWS::ApiGatewayV2::Route"))
            .sum::<usize>();
        assert_eq!(routes, 2);
    }

    #[test]
    fn duplicate_route_fails_synthesis() {
        let (mut app, gateway) = gateway(false);
        let api = gateway.http_api.clone();

        for name in ["First", "Second"] {
            let mut stack = Stack::new(name, props());
            let integration = api
                .add_http_integration(&mut stack, "Proxy", json!("http://example.com/"))
                .unwrap();
            api.add_routes(
                &mut stack,
                RouteOptions {
                    path: "/",
                    methods: &[HttpMethod::Any],
                    integration: &integration,
                },
            )
            .unwrap();
            app.add_stack(stack).unwrap();
        }

        assert_eq!(api.routes().len(), 2);
        assert!(app.synth().is_err());
    }
}
