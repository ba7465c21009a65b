use super::gateway::{HttpApi, RouteOptions};
use super::{assume_role_policy, inline_policy, managed_policy, statement};
use chronas_common::route::HttpMethod;
use chronas_common::template::{get_att, reference, CfnResource, RemovalPolicy};
use chronas_common::{App, Stack, StackId, StackProps};
use serde_json::json;

pub(crate) const METADATA_LINKS_PATH: &str = "/v1/metadata/links";

const TABLE_ACTIONS: [&str; 10] = [
    "dynamodb:BatchGetItem",
    "dynamodb:BatchWriteItem",
    "dynamodb:ConditionCheckItem",
    "dynamodb:PutItem",
    "dynamodb:DescribeTable",
    "dynamodb:DeleteItem",
    "dynamodb:GetItem",
    "dynamodb:Scan",
    "dynamodb:Query",
    "dynamodb:UpdateItem",
];

/// Location of the packaged handler of the metadata links function
pub(crate) struct FunctionCode<'a> {
    pub(crate) bucket: &'a str,
    pub(crate) key: &'a str,
}

pub(crate) struct MetaDataLinkParams<'a> {
    pub(crate) http_api: &'a HttpApi,
    pub(crate) code: FunctionCode<'a>,
}

/// Key-value table for metadata links behind its own small function
pub(crate) struct MetaDataLinkStack {
    pub(crate) id: StackId,
}

impl MetaDataLinkStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: MetaDataLinkParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);

        stack.add_resources(vec![
            CfnResource::new(
                "MasterData",
                json!({
                    "Type": "AWS::DynamoDB::Table",
                    "Properties": {
                        "TableName": "MyTable",
                        "AttributeDefinitions": [{ "AttributeName": "_id", "AttributeType": "S" }],
                        "KeySchema": [{ "AttributeName": "_id", "KeyType": "HASH" }],
                        "ProvisionedThroughput": { "ReadCapacityUnits": 5, "WriteCapacityUnits": 5 },
                    }
                }),
            )
            .with_removal_policy(RemovalPolicy::Retain),
            CfnResource::new(
                "MetaDataLinksRole",
                json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": assume_role_policy("lambda.amazonaws.com"),
                        "ManagedPolicyArns": [managed_policy("service-role/AWSLambdaBasicExecutionRole")],
                        "Policies": [inline_policy(
                            "DynamoPolicyMasterData",
                            vec![statement(&TABLE_ACTIONS, vec![get_att("MasterData", "Arn")])],
                        )],
                    }
                }),
            ),
            CfnResource::new(
                "MetaDataLinksFunction",
                json!({
                    "Type": "AWS::Lambda::Function",
                    "Properties": {
                        "Runtime": "nodejs18.x",
                        "Handler": "index.handler",
                        "Timeout": 3,
                        "Code": { "S3Bucket": params.code.bucket, "S3Key": params.code.key },
                        "Role": get_att("MetaDataLinksRole", "Arn"),
                        "Environment": { "Variables": { "HELLO_TABLE_NAME": reference("MasterData") } },
                    }
                }),
            )
            .depends_on(&["MetaDataLinksRole"]),
        ])?;

        let api = params.http_api;
        let integration =
            api.add_lambda_integration(&mut stack, "MetaDataLinks", get_att("MetaDataLinksFunction", "Arn"))?;

        api.add_routes(
            &mut stack,
            RouteOptions {
                path: METADATA_LINKS_PATH,
                methods: &[HttpMethod::Any],
                integration: &integration,
            },
        )?;

        Ok(Self {
            id: app.add_stack(stack)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::compute::tests::Fixture;
    use crate::stacks::compute::ChronasApiLambdaStack;
    use crate::stacks::tests::props;
    use pretty_assertions::assert_eq;

    const CODE: FunctionCode = FunctionCode {
        bucket: "chronas-artifacts",
        key: "metadata-links/app.zip",
    };

    #[test]
    fn table_is_retained_and_granted() {
        let mut app = App::new();
        let fixture = Fixture::new(&mut app);
        let metadata = MetaDataLinkStack::new(
            &mut app,
            "MetaDataLinkStack",
            props(),
            MetaDataLinkParams {
                http_api: &fixture.gateway.http_api,
                code: CODE,
            },
        )
        .unwrap();

        let template = app.stack(metadata.id).template();
        let table = template.resource("MasterData").unwrap();
        assert_eq!(table["DeletionPolicy"], "Retain");
        assert_eq!(table["Properties"]["TableName"], "MyTable");

        let function = template.resource("MetaDataLinksFunction").unwrap();
        assert_eq!(function["Properties"]["Runtime"], "nodejs18.x");
        assert_eq!(function["Properties"]["Code"]["S3Key"], "metadata-links/app.zip");

        let role = template.resource("MetaDataLinksRole").unwrap();
        let statement = &role["Properties"]["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Resource"][0], get_att("MasterData", "Arn"));
    }

    #[test]
    fn link_route_overlaps_the_api_proxy() {
        let mut app = App::new();
        let fixture = Fixture::new(&mut app);
        ChronasApiLambdaStack::new(&mut app, "ChronasApiLambdaStack", props(), fixture.params()).unwrap();
        let metadata = MetaDataLinkStack::new(
            &mut app,
            "MetaDataLinkStack",
            props(),
            MetaDataLinkParams {
                http_api: &fixture.gateway.http_api,
                code: CODE,
            },
        )
        .unwrap();

        let route = app
            .stack(metadata.id)
            .template()
            .resource("RouteANYV1MetadataLinks")
            .unwrap()
            .clone();

        assert_eq!(route["Properties"]["RouteKey"], "ANY /v1/metadata/links");
        assert_eq!(fixture.gateway.http_api.routes().len(), 3);

        let assembly = app.synth().unwrap();
        let dependencies = &assembly.stack("MetaDataLinkStack").unwrap().dependencies;
        assert!(dependencies.contains(&"ApiGatewayStack".to_string()));
    }
}
