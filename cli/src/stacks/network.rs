use super::{name_tag, security_group};
use chronas_common::template::{availability_zone, get_att, reference, sub, CfnResource};
use chronas_common::{App, Output, Stack, StackId, StackProps};
use serde_json::json;

const VPC_CIDR: &str = "10.0.0.0/16";
const AVAILABILITY_ZONES: usize = 2;

/// Tag telling the subnet tiers apart
pub(crate) const SUBNET_TIER_TAG: &str = "chronas:subnet-type";

#[derive(Clone, Debug)]
pub(crate) struct Vpc {
    pub(crate) id: Output,
    pub(crate) cidr: Output,
    pub(crate) public_subnets: Vec<Output>,
    pub(crate) private_subnets: Vec<Output>,
}

impl Vpc {
    /// Resolve every subnet of a tier into `stack`
    pub(crate) fn subnet_ids(stack: &mut Stack, subnets: &[Output]) -> eyre::Result<Vec<serde_json::Value>> {
        subnets.iter().map(|subnet| stack.resolve(subnet)).collect()
    }
}

#[derive(Clone, Copy, Debug)]
enum Tier {
    Public,
    Private,
}

impl Tier {
    fn name(&self) -> &'static str {
        match self {
            Tier::Public => "Public",
            Tier::Private => "Private",
        }
    }

    /// Third octet of the /24 blocks, public subnets come first
    fn cidr(&self, zone: usize) -> String {
        let offset = match self {
            Tier::Public => 0,
            Tier::Private => AVAILABILITY_ZONES,
        };

        format!("10.0.{}.0/24", offset + zone)
    }
}

/// Two-tier VPC without NAT gateways, private subnets reach Secrets Manager through an endpoint
pub(crate) struct NetworkStack {
    pub(crate) id: StackId,
    pub(crate) vpc: Vpc,
}

impl NetworkStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);

        stack.add_resources(vec![
            CfnResource::new(
                "ChronasVpc",
                json!({
                    "Type": "AWS::EC2::VPC",
                    "Properties": {
                        "CidrBlock": VPC_CIDR,
                        "EnableDnsHostnames": true,
                        "EnableDnsSupport": true,
                        "InstanceTenancy": "default",
                        "Tags": name_tag(&format!("{name}/ChronasVpc")),
                    }
                }),
            ),
            CfnResource::new(
                "ChronasVpcIgw",
                json!({
                    "Type": "AWS::EC2::InternetGateway",
                    "Properties": { "Tags": name_tag(&format!("{name}/ChronasVpc")) }
                }),
            ),
            CfnResource::new(
                "ChronasVpcGatewayAttachment",
                json!({
                    "Type": "AWS::EC2::VPCGatewayAttachment",
                    "Properties": {
                        "VpcId": reference("ChronasVpc"),
                        "InternetGatewayId": reference("ChronasVpcIgw"),
                    }
                }),
            ),
        ])?;

        let mut subnets = |tier: Tier| -> eyre::Result<Vec<String>> {
            (0..AVAILABILITY_ZONES)
                .map(|zone| add_subnet(&mut stack, tier, zone))
                .collect()
        };

        let public = subnets(Tier::Public)?;
        let private = subnets(Tier::Private)?;

        stack.add_resources(vec![
            CfnResource::new(
                "SecretsManagerEndpointSecurityGroup",
                security_group(
                    &format!("{name}/ChronasVpc/SecretsManagerEndpoint/SecurityGroup"),
                    reference("ChronasVpc"),
                    vec![json!({
                        "IpProtocol": "tcp",
                        "FromPort": 443,
                        "ToPort": 443,
                        "CidrIp": "0.0.0.0/0",
                        "Description": "Allow Secrets Manager"
                    })],
                ),
            ),
            CfnResource::new(
                "SecretsManagerEndpoint",
                json!({
                    "Type": "AWS::EC2::VPCEndpoint",
                    "Properties": {
                        "ServiceName": sub("com.amazonaws.${AWS::Region}.secretsmanager"),
                        "VpcEndpointType": "Interface",
                        "PrivateDnsEnabled": true,
                        "VpcId": reference("ChronasVpc"),
                        "SubnetIds": private.iter().map(|s| reference(s)).collect::<Vec<_>>(),
                        "SecurityGroupIds": [get_att("SecretsManagerEndpointSecurityGroup", "GroupId")],
                    }
                }),
            ),
        ])?;

        let vpc = Vpc {
            id: stack.export("VpcId", reference("ChronasVpc"), "ID of the Chronas VPC")?,
            cidr: stack.export("VpcCidrBlock", get_att("ChronasVpc", "CidrBlock"), "CIDR of the Chronas VPC")?,
            public_subnets: public
                .iter()
                .map(|subnet| stack.export(&format!("{subnet}Id"), reference(subnet), "Public subnet"))
                .collect::<eyre::Result<_>>()?,
            private_subnets: private
                .iter()
                .map(|subnet| stack.export(&format!("{subnet}Id"), reference(subnet), "Private subnet"))
                .collect::<eyre::Result<_>>()?,
        };

        Ok(Self {
            id: app.add_stack(stack)?,
            vpc,
        })
    }
}

/// Subnet with its own route table, only public ones route to the internet gateway
fn add_subnet(stack: &mut Stack, tier: Tier, zone: usize) -> eyre::Result<String> {
    let subnet = format!("ChronasVpc{}Subnet{}", tier.name(), zone + 1);
    let route_table = format!("{subnet}RouteTable");

    stack.add_resources(vec![
        CfnResource::new(
            &subnet,
            json!({
                "Type": "AWS::EC2::Subnet",
                "Properties": {
                    "VpcId": reference("ChronasVpc"),
                    "CidrBlock": tier.cidr(zone),
                    "AvailabilityZone": availability_zone(zone),
                    "MapPublicIpOnLaunch": matches!(tier, Tier::Public),
                    "Tags": [
                        { "Key": "Name", "Value": subnet },
                        { "Key": SUBNET_TIER_TAG, "Value": tier.name() },
                    ],
                }
            }),
        ),
        CfnResource::new(
            &route_table,
            json!({
                "Type": "AWS::EC2::RouteTable",
                "Properties": {
                    "VpcId": reference("ChronasVpc"),
                    "Tags": name_tag(&route_table),
                }
            }),
        ),
        CfnResource::new(
            &format!("{subnet}RouteTableAssociation"),
            json!({
                "Type": "AWS::EC2::SubnetRouteTableAssociation",
                "Properties": {
                    "RouteTableId": reference(&route_table),
                    "SubnetId": reference(&subnet),
                }
            }),
        ),
    ])?;

    if matches!(tier, Tier::Public) {
        stack.add_resource(
            CfnResource::new(
                &format!("{subnet}DefaultRoute"),
                json!({
                    "Type": "AWS::EC2::Route",
                    "Properties": {
                        "RouteTableId": reference(&route_table),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": reference("ChronasVpcIgw"),
                    }
                }),
            )
            .depends_on(&["ChronasVpcGatewayAttachment"]),
        )?;
    }

    Ok(subnet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::tests::props;
    use pretty_assertions::assert_eq;

    fn subnets_of_tier(stack: &Stack, tier: &str) -> usize {
        stack
            .template()
            .resources_of_type("AWS::EC2::Subnet")
            .filter(|(_, subnet)| {
                subnet["Properties"]["Tags"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .any(|tag| tag["Key"] == SUBNET_TIER_TAG && tag["Value"] == tier)
            })
            .count()
    }

    #[test]
    fn two_tiers_without_nat() {
        let mut app = App::new();
        let network = NetworkStack::new(&mut app, "NetworkStack", props()).unwrap();
        let stack = app.stack(network.id);
        let template = stack.template();

        assert_eq!(template.count_of_type("AWS::EC2::VPC"), 1);
        assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 0);
        assert_eq!(subnets_of_tier(stack, "Public"), 2);
        assert_eq!(subnets_of_tier(stack, "Private"), 2);
        assert_eq!(network.vpc.private_subnets.len(), 2);
    }

    #[test]
    fn only_public_subnets_route_to_the_internet() {
        let mut app = App::new();
        let network = NetworkStack::new(&mut app, "NetworkStack", props()).unwrap();
        let template = app.stack(network.id).template();

        let routes = template
            .resources_of_type("AWS::EC2::Route")
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();

        assert_eq!(
            routes,
            vec!["ChronasVpcPublicSubnet1DefaultRoute", "ChronasVpcPublicSubnet2DefaultRoute"]
        );
    }

    #[test]
    fn secrets_manager_endpoint_allows_https() {
        let mut app = App::new();
        let network = NetworkStack::new(&mut app, "NetworkStack", props()).unwrap();
        let template = app.stack(network.id).template();

        let group = template.resource("SecretsManagerEndpointSecurityGroup").unwrap();
        assert_eq!(group["Properties"]["SecurityGroupIngress"][0]["FromPort"], 443);
        assert_eq!(
            template.resource("SecretsManagerEndpoint").unwrap()["Properties"]["PrivateDnsEnabled"],
            true
        );
    }
}
