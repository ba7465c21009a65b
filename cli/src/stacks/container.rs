use super::compute::{application_environment, ComputeParams, API_PATHS};
use super::gateway::RouteOptions;
use super::network::Vpc;
use super::{assume_role_policy, inline_policy, managed_policy, security_group};
use chronas_common::dashboard::{GraphWidget, Metric};
use chronas_common::route::HttpMethod;
use chronas_common::template::{get_att, join, reference, CfnResource, REGION};
use chronas_common::{App, Stack, StackId, StackProps};
use serde_json::json;

const CONTAINER_NAME: &str = "ChronasService";
const CONTAINER_PORT: u16 = 80;

/// The API as a Fargate Spot service behind an internet-facing load balancer
pub(crate) struct ChronasApiFargateStack {
    pub(crate) id: StackId,
}

impl ChronasApiFargateStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: ComputeParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);

        let vpc_id = stack.resolve(&params.vpc.id)?;
        let public_subnets = Vpc::subnet_ids(&mut stack, &params.vpc.public_subnets)?;
        let private_subnets = Vpc::subnet_ids(&mut stack, &params.vpc.private_subnets)?;
        let repository_uri = stack.resolve(&params.repository.uri)?;
        let secrets = vec![
            params.database_secret.grant_read(&mut stack)?,
            params.config_secret.grant_read(&mut stack)?,
        ];

        let environment = application_environment(&params, CONTAINER_PORT)
            .into_iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value }))
            .collect::<Vec<_>>();

        stack.add_resources(vec![
            CfnResource::new("ChronasCluster", json!({ "Type": "AWS::ECS::Cluster" })),
            CfnResource::new(
                "ChronasClusterCapacityProviders",
                json!({
                    "Type": "AWS::ECS::ClusterCapacityProviderAssociations",
                    "Properties": {
                        "Cluster": reference("ChronasCluster"),
                        "CapacityProviders": ["FARGATE", "FARGATE_SPOT"],
                        "DefaultCapacityProviderStrategy": [],
                    }
                }),
            ),
            CfnResource::new(
                "TaskRole",
                json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": assume_role_policy("ecs-tasks.amazonaws.com"),
                        "ManagedPolicyArns": [
                            managed_policy("service-role/AmazonECSTaskExecutionRolePolicy"),
                            managed_policy("AWSXRayDaemonWriteAccess"),
                        ],
                        "Policies": [inline_policy("ChronasApiSecrets", secrets)],
                    }
                }),
            ),
            CfnResource::new(
                "ExecutionRole",
                json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": assume_role_policy("ecs-tasks.amazonaws.com"),
                        "ManagedPolicyArns": [managed_policy("service-role/AmazonECSTaskExecutionRolePolicy")],
                    }
                }),
            ),
            CfnResource::new(
                "TaskLogGroup",
                json!({
                    "Type": "AWS::Logs::LogGroup",
                    "Properties": { "RetentionInDays": 30 }
                }),
            ),
            CfnResource::new(
                "TaskDefinition",
                json!({
                    "Type": "AWS::ECS::TaskDefinition",
                    "Properties": {
                        "Family": format!("{name}TaskDefinition"),
                        "Cpu": "1024",
                        "Memory": "2048",
                        "NetworkMode": "awsvpc",
                        "RequiresCompatibilities": ["FARGATE"],
                        "TaskRoleArn": get_att("TaskRole", "Arn"),
                        "ExecutionRoleArn": get_att("ExecutionRole", "Arn"),
                        "ContainerDefinitions": [
                            {
                                "Name": CONTAINER_NAME,
                                "Image": join("", vec![repository_uri, json!(":"), json!(params.image_tag)]),
                                "Essential": true,
                                "PortMappings": [{ "ContainerPort": CONTAINER_PORT, "Protocol": "tcp" }],
                                "Environment": environment,
                                "LogConfiguration": {
                                    "LogDriver": "awslogs",
                                    "Options": {
                                        "awslogs-group": reference("TaskLogGroup"),
                                        "awslogs-region": reference(REGION),
                                        "awslogs-stream-prefix": "ChronasApp",
                                    }
                                },
                            },
                            {
                                "Name": "xray",
                                "Image": "amazon/aws-xray-daemon",
                                "Cpu": 32,
                                "MemoryReservation": 256,
                                "Essential": false,
                                "PortMappings": [{ "ContainerPort": 2000, "Protocol": "udp" }],
                            },
                        ],
                    }
                }),
            ),
            CfnResource::new(
                "LoadBalancerSecurityGroup",
                security_group(
                    "Chronas API load balancer",
                    vpc_id.clone(),
                    [80, 443]
                        .map(|port| {
                            json!({
                                "IpProtocol": "tcp",
                                "FromPort": port,
                                "ToPort": port,
                                "CidrIp": "0.0.0.0/0",
                                "Description": format!("Allow from anyone on port {port}"),
                            })
                        })
                        .to_vec(),
                ),
            ),
            CfnResource::new(
                "ServiceSecurityGroup",
                security_group(
                    "Chronas API tasks",
                    vpc_id.clone(),
                    vec![json!({
                        "IpProtocol": "tcp",
                        "FromPort": CONTAINER_PORT,
                        "ToPort": CONTAINER_PORT,
                        "SourceSecurityGroupId": get_att("LoadBalancerSecurityGroup", "GroupId"),
                        "Description": "Load balancer to target",
                    })],
                ),
            ),
            CfnResource::new(
                "LoadBalancer",
                json!({
                    "Type": "AWS::ElasticLoadBalancingV2::LoadBalancer",
                    "Properties": {
                        "Type": "application",
                        "Scheme": "internet-facing",
                        "Subnets": public_subnets,
                        "SecurityGroups": [get_att("LoadBalancerSecurityGroup", "GroupId")],
                    }
                }),
            ),
            CfnResource::new(
                "TargetGroup",
                json!({
                    "Type": "AWS::ElasticLoadBalancingV2::TargetGroup",
                    "Properties": {
                        "Port": CONTAINER_PORT,
                        "Protocol": "HTTP",
                        "TargetType": "ip",
                        "VpcId": vpc_id,
                        "HealthCheckPath": "/v1/welcome",
                        "HealthCheckIntervalSeconds": 10,
                        "HealthCheckTimeoutSeconds": 5,
                    }
                }),
            ),
            // The gateway reaches the service over plain HTTP
            CfnResource::new(
                "HttpListener",
                json!({
                    "Type": "AWS::ElasticLoadBalancingV2::Listener",
                    "Properties": {
                        "LoadBalancerArn": reference("LoadBalancer"),
                        "Port": 80,
                        "Protocol": "HTTP",
                        "DefaultActions": [{ "Type": "forward", "TargetGroupArn": reference("TargetGroup") }],
                    }
                }),
            ),
        ])?;

        let mut listeners = vec!["HttpListener"];

        if let Some(certificate) = params.certificate {
            let certificate_arn = stack.resolve(&certificate.arn)?;

            stack.add_resource(CfnResource::new(
                "HttpsListener",
                json!({
                    "Type": "AWS::ElasticLoadBalancingV2::Listener",
                    "Properties": {
                        "LoadBalancerArn": reference("LoadBalancer"),
                        "Port": 443,
                        "Protocol": "HTTPS",
                        "Certificates": [{ "CertificateArn": certificate_arn }],
                        "DefaultActions": [{ "Type": "forward", "TargetGroupArn": reference("TargetGroup") }],
                    }
                }),
            ))?;

            listeners.push("HttpsListener");
        }

        let mut service_dependencies = listeners.clone();
        service_dependencies.push("ChronasClusterCapacityProviders");

        stack.add_resources(vec![
            CfnResource::new(
                "Service",
                json!({
                    "Type": "AWS::ECS::Service",
                    "Properties": {
                        "Cluster": reference("ChronasCluster"),
                        "TaskDefinition": reference("TaskDefinition"),
                        "DesiredCount": 1,
                        "CapacityProviderStrategy": [{ "CapacityProvider": "FARGATE_SPOT", "Weight": 1 }],
                        "HealthCheckGracePeriodSeconds": 60,
                        "NetworkConfiguration": {
                            "AwsvpcConfiguration": {
                                "AssignPublicIp": "DISABLED",
                                "Subnets": private_subnets,
                                "SecurityGroups": [get_att("ServiceSecurityGroup", "GroupId")],
                            }
                        },
                        "LoadBalancers": [{
                            "ContainerName": CONTAINER_NAME,
                            "ContainerPort": CONTAINER_PORT,
                            "TargetGroupArn": reference("TargetGroup"),
                        }],
                    }
                }),
            )
            .depends_on(&service_dependencies),
            CfnResource::new(
                "ServiceScalableTarget",
                json!({
                    "Type": "AWS::ApplicationAutoScaling::ScalableTarget",
                    "Properties": {
                        "MinCapacity": 1,
                        "MaxCapacity": 10,
                        "ResourceId": join("/", vec![
                            json!("service"),
                            reference("ChronasCluster"),
                            get_att("Service", "Name"),
                        ]),
                        "ScalableDimension": "ecs:service:DesiredCount",
                        "ServiceNamespace": "ecs",
                    }
                }),
            ),
            CfnResource::new(
                "ServiceCpuScaling",
                json!({
                    "Type": "AWS::ApplicationAutoScaling::ScalingPolicy",
                    "Properties": {
                        "PolicyName": format!("{name}CpuScaling"),
                        "PolicyType": "TargetTrackingScaling",
                        "ScalingTargetId": reference("ServiceScalableTarget"),
                        "TargetTrackingScalingPolicyConfiguration": {
                            "PredefinedMetricSpecification": {
                                "PredefinedMetricType": "ECSServiceAverageCPUUtilization",
                            },
                            "TargetValue": 50,
                        }
                    }
                }),
            ),
        ])?;

        let api = params.http_api;
        let load_balancer = get_att("LoadBalancer", "DNSName");

        for (index, path) in API_PATHS.iter().enumerate() {
            let upstream = path.replace("{proxy+}", "{proxy}");
            let integration = api.add_http_integration(
                &mut stack,
                &format!("LoadBalancer{}", index + 1),
                join("", vec![json!("http://"), load_balancer.clone(), json!(upstream)]),
            )?;

            api.add_routes(
                &mut stack,
                RouteOptions {
                    path,
                    methods: &[HttpMethod::Any],
                    integration: &integration,
                },
            )?;
        }

        stack.add_output(
            "LoadBalancerDNS",
            load_balancer,
            "DNS name of the Chronas API load balancer",
        )?;

        let service_name = stack.export("ServiceName", get_att("Service", "Name"), "Chronas API service")?;
        let cluster_name = stack.export("ClusterName", reference("ChronasCluster"), "Chronas API cluster")?;

        params.dashboard.add_widgets(vec![GraphWidget::new(
            "Fargate Service CPU and Memory",
            ["CPUUtilization", "MemoryUtilization"]
                .map(|metric| {
                    Metric::new("AWS/ECS", metric)
                        .dimension("ClusterName", &cluster_name)
                        .dimension("ServiceName", &service_name)
                })
                .to_vec(),
        )]);

        Ok(Self {
            id: app.add_stack(stack)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::certificate::{CertificateParams, CertificateStack};
    use crate::stacks::compute::tests::Fixture;
    use crate::stacks::tests::props;
    use crate::stacks::API_DOMAIN;
    use pretty_assertions::assert_eq;

    #[test]
    fn service_behind_load_balancer() {
        let mut app = App::new();
        let fixture = Fixture::new(&mut app);
        let dns = CertificateStack::new(
            &mut app,
            "DnsStack",
            props(),
            CertificateParams {
                domain_name: API_DOMAIN,
                alternative_names: &[],
                hosted_zone_id: None,
            },
        )
        .unwrap();

        let params = ComputeParams {
            certificate: Some(&dns.certificate),
            ..fixture.params()
        };
        let compute = ChronasApiFargateStack::new(&mut app, "ChronasApiFargate", props(), params).unwrap();
        let template = app.stack(compute.id).template();

        let task = template.resource("TaskDefinition").unwrap();
        assert_eq!(task["Properties"]["Cpu"], "1024");
        assert_eq!(task["Properties"]["Memory"], "2048");
        assert_eq!(task["Properties"]["ContainerDefinitions"][1]["PortMappings"][0]["Protocol"], "udp");

        let target_group = template.resource("TargetGroup").unwrap();
        assert_eq!(target_group["Properties"]["HealthCheckPath"], "/v1/welcome");
        assert_eq!(template.count_of_type("AWS::ElasticLoadBalancingV2::Listener"), 2);
        assert_eq!(template.count_of_type("AWS::ApiGatewayV2::Route"), 2);

        let service = template.resource("Service").unwrap();
        assert_eq!(service["Properties"]["CapacityProviderStrategy"][0]["CapacityProvider"], "FARGATE_SPOT");
        assert!(app.synth().is_ok());
    }
}
