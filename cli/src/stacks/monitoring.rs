use super::{assume_role_policy, inline_policy, managed_policy, statement};
use crate::probe::{canary, Suite};
use chronas_common::template::{get_att, join, logical_id, reference, sub, CfnResource, RemovalPolicy};
use chronas_common::{App, Stack, StackId, StackProps};
use serde_json::json;

const ALERT_TOPIC: &str = "SyntheticMonitoringAlerts";
const ARTIFACTS: &str = "CanaryArtifacts";
const ROLE: &str = "CanaryRole";

/// Monthly price of one canary at two runs an hour
const COST_PER_CANARY: f64 = 0.0012 * 30.0 * 24.0 * 2.0;

pub(crate) struct MonitoringParams<'a> {
    pub(crate) suites: &'a [Suite],
    pub(crate) base_url: &'a str,
    pub(crate) alert_email: Option<&'a str>,
}

/// Canaries probing the public API with an alarm per canary
pub(crate) struct SyntheticMonitoringStack {
    pub(crate) id: StackId,
}

impl SyntheticMonitoringStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: MonitoringParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let artifacts_arn = get_att(ARTIFACTS, "Arn");

        stack.add_resources(vec![
            CfnResource::new(
                ALERT_TOPIC,
                json!({
                    "Type": "AWS::SNS::Topic",
                    "Properties": {
                        "DisplayName": "Chronas API Synthetic Monitoring Alerts",
                        "TopicName": "chronas-synthetic-alerts-v2",
                    }
                }),
            ),
            CfnResource::new(
                ARTIFACTS,
                json!({
                    "Type": "AWS::S3::Bucket",
                    "Properties": {
                        "BucketName": sub("chronas-synthetic-artifacts-v2-${AWS::AccountId}"),
                        "LifecycleConfiguration": {
                            "Rules": [{ "Id": "DeleteOldArtifacts", "Status": "Enabled", "ExpirationInDays": 7 }]
                        },
                    }
                }),
            )
            .with_removal_policy(RemovalPolicy::Destroy),
            CfnResource::new(
                ROLE,
                json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": assume_role_policy("lambda.amazonaws.com"),
                        "ManagedPolicyArns": [managed_policy("service-role/AWSLambdaBasicExecutionRole")],
                        "Policies": [inline_policy(
                            "CanaryPolicy",
                            vec![statement(
                                &[
                                    "s3:PutObject",
                                    "s3:GetBucketLocation",
                                    "s3:ListAllMyBuckets",
                                    "cloudwatch:PutMetricData",
                                    "logs:CreateLogGroup",
                                    "logs:CreateLogStream",
                                    "logs:PutLogEvents",
                                ],
                                vec![
                                    artifacts_arn.clone(),
                                    join("", vec![artifacts_arn, json!("/*")]),
                                    json!("*"),
                                ],
                            )],
                        )],
                    }
                }),
            ),
        ])?;

        if let Some(email) = params.alert_email {
            stack.add_resource(CfnResource::new(
                "SyntheticMonitoringAlertsEmail",
                json!({
                    "Type": "AWS::SNS::Subscription",
                    "Properties": {
                        "Protocol": "email",
                        "Endpoint": email,
                        "TopicArn": reference(ALERT_TOPIC),
                    }
                }),
            ))?;
        }

        for suite in params.suites {
            let id = format!("{}Canary", logical_id(&suite.name));

            stack.add_resources(vec![
                CfnResource::new(
                    &id,
                    json!({
                        "Type": "AWS::Synthetics::Canary",
                        "Properties": {
                            "Name": suite.name,
                            "RuntimeVersion": canary::RUNTIME_VERSION,
                            "ExecutionRoleArn": get_att(ROLE, "Arn"),
                            "ArtifactS3Location": join("", vec![json!("s3://"), reference(ARTIFACTS)]),
                            "Schedule": { "Expression": suite.schedule_expression() },
                            "Code": {
                                "Handler": canary::HANDLER,
                                "Script": canary::script(suite, params.base_url)?,
                            },
                            "StartCanaryAfterCreation": true,
                            "FailureRetentionPeriod": 7,
                            "SuccessRetentionPeriod": 7,
                        }
                    }),
                ),
                CfnResource::new(
                    &format!("{id}Alarm"),
                    json!({
                        "Type": "AWS::CloudWatch::Alarm",
                        "Properties": {
                            "AlarmName": format!("{}-failures", suite.name),
                            "AlarmDescription": format!("Synthetic monitoring failures for {}", suite.name),
                            "Namespace": "CloudWatchSynthetics",
                            "MetricName": "Failed",
                            "Dimensions": [{ "Name": "CanaryName", "Value": reference(&id) }],
                            "Statistic": "Sum",
                            "Period": 300,
                            "Threshold": 1,
                            "EvaluationPeriods": 1,
                            "ComparisonOperator": "GreaterThanOrEqualToThreshold",
                            "AlarmActions": [reference(ALERT_TOPIC)],
                        }
                    }),
                ),
            ])?;
        }

        let count = params.suites.len();
        let names = params
            .suites
            .iter()
            .map(|suite| suite.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        stack.add_output(
            "AlertTopicArn",
            reference(ALERT_TOPIC),
            "SNS Topic ARN for synthetic monitoring alerts",
        )?;
        stack.add_output(
            "CanariesCount",
            json!(count.to_string()),
            "Number of synthetic monitoring canaries deployed",
        )?;
        stack.add_output("CanariesList", json!(names), "List of deployed canary names")?;
        stack.add_output(
            "SyntheticsConsoleUrl",
            sub("https://${AWS::Region}.console.aws.amazon.com/cloudwatch/home?region=${AWS::Region}#synthetics:canary/list"),
            "CloudWatch Synthetics Console URL",
        )?;
        stack.add_output(
            "EstimatedMonthlyCost",
            json!(estimated_monthly_cost(count)),
            "Estimated monthly cost for synthetic monitoring",
        )?;

        Ok(Self {
            id: app.add_stack(stack)?,
        })
    }
}

fn estimated_monthly_cost(canaries: usize) -> String {
    format!(
        "${:.2} (based on canary run frequency)",
        canaries as f64 * COST_PER_CANARY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::suites;
    use crate::stacks::tests::props;
    use pretty_assertions::assert_eq;

    fn monitoring(alert_email: Option<&str>) -> (App, SyntheticMonitoringStack) {
        let mut app = App::new();
        let suites = suites::all();

        let monitoring = SyntheticMonitoringStack::new(
            &mut app,
            "ChronasSyntheticMonitoring-development-v2",
            props(),
            MonitoringParams {
                suites: &suites,
                base_url: "https://api.chronas.org",
                alert_email,
            },
        )
        .unwrap();

        (app, monitoring)
    }

    #[test]
    fn a_canary_and_an_alarm_per_suite() {
        let (app, monitoring) = monitoring(None);
        let template = app.stack(monitoring.id).template();

        assert_eq!(template.count_of_type("AWS::Synthetics::Canary"), 6);
        assert_eq!(template.count_of_type("AWS::CloudWatch::Alarm"), 6);
        assert_eq!(template.count_of_type("AWS::SNS::Subscription"), 0);

        let canary = template.resource("ChronasPerformanceTestCanary").unwrap();
        assert_eq!(canary["Properties"]["Schedule"]["Expression"], "rate(1 hour)");

        let alarm = template.resource("ChronasHealthVersionCheckCanaryAlarm").unwrap();
        assert_eq!(alarm["Properties"]["AlarmName"], "chronas-health-version-check-failures");
        assert_eq!(alarm["Properties"]["Threshold"], 1);

        let body = serde_json::to_string(&template.to_value()).unwrap();
        assert!(body.len() < 51_200);
    }

    #[test]
    fn email_subscription_and_cost() {
        let (app, monitoring) = monitoring(Some("ops@chronas.org"));
        let template = app.stack(monitoring.id).template();

        assert_eq!(template.count_of_type("AWS::SNS::Subscription"), 1);
        assert_eq!(
            template.outputs()["EstimatedMonthlyCost"]["Value"],
            "$10.37 (based on canary run frequency)"
        );
        assert_eq!(template.outputs()["CanariesCount"]["Value"], "6");
    }
}
