//! Typed constructors for the Chronas stacks
//!
//! Every constructor takes the app, a stack name, the stack props and the handles
//! of earlier stacks it needs, adds one stack to the app and returns its handles.

pub(crate) mod amplify;
pub(crate) mod build;
pub(crate) mod certificate;
pub(crate) mod ci;
pub(crate) mod compute;
pub(crate) mod container;
pub(crate) mod database;
pub(crate) mod frontend;
pub(crate) mod gateway;
pub(crate) mod metadata;
pub(crate) mod monitoring;
pub(crate) mod network;
pub(crate) mod observability;
pub(crate) mod secret;

use serde_json::{json, Value};

/// CloudFront only accepts certificates from this region
pub(crate) const CLOUDFRONT_REGION: &str = "us-east-1";

pub(crate) const API_DOMAIN: &str = "chronas-api-lambda.chronas.org";
pub(crate) const FRONTEND_DOMAIN: &str = "chronas.org";

/// Trust policy for a role assumed by an AWS service, e.g. "lambda.amazonaws.com"
pub(crate) fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole"
        }]
    })
}

/// ARN of an AWS managed policy, e.g. "service-role/AWSLambdaBasicExecutionRole"
pub(crate) fn managed_policy(name: &str) -> Value {
    json!({ "Fn::Sub": format!("arn:${{AWS::Partition}}:iam::aws:policy/{name}") })
}

pub(crate) fn statement(actions: &[&str], resources: Vec<Value>) -> Value {
    json!({
        "Effect": "Allow",
        "Action": actions,
        "Resource": resources,
    })
}

pub(crate) fn inline_policy(name: &str, statements: Vec<Value>) -> Value {
    json!({
        "PolicyName": name,
        "PolicyDocument": {
            "Version": "2012-10-17",
            "Statement": statements,
        }
    })
}

pub(crate) fn name_tag(name: &str) -> Value {
    json!([{ "Key": "Name", "Value": name }])
}

/// Security group allowing all outbound traffic and the given ingress rules
pub(crate) fn security_group(description: &str, vpc_id: Value, ingress: Vec<Value>) -> Value {
    json!({
        "Type": "AWS::EC2::SecurityGroup",
        "Properties": {
            "GroupDescription": description,
            "VpcId": vpc_id,
            "SecurityGroupIngress": ingress,
            "SecurityGroupEgress": [{
                "IpProtocol": "-1",
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow all outbound traffic by default"
            }]
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use chronas_common::{StackProps, Target};

    pub(crate) fn props() -> StackProps {
        StackProps::new(Target::new(Some("123456789012"), Some("eu-west-1")))
    }

    pub(crate) fn edge_props() -> StackProps {
        StackProps::new(Target::new(Some("123456789012"), Some(super::CLOUDFRONT_REGION)))
    }
}
