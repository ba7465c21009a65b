use chronas_common::template::{logical_id, reference, CfnResource};
use chronas_common::{App, Output, Stack, StackId, StackProps};
use serde_json::json;

#[derive(Clone, Debug)]
pub(crate) struct Certificate {
    pub(crate) domain_name: String,
    pub(crate) arn: Output,
}

pub(crate) struct CertificateParams<'a> {
    pub(crate) domain_name: &'a str,
    pub(crate) alternative_names: &'a [&'a str],

    /// Validation records are created automatically when the zone is known
    pub(crate) hosted_zone_id: Option<&'a str>,
}

/// DNS-validated ACM certificate
pub(crate) struct CertificateStack {
    pub(crate) id: StackId,
    pub(crate) certificate: Certificate,
}

impl CertificateStack {
    pub(crate) fn new(
        app: &mut App,
        name: &str,
        props: StackProps,
        params: CertificateParams,
    ) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let resource_name = format!("{}Certificate", logical_id(params.domain_name));

        let mut properties = json!({
            "DomainName": params.domain_name,
            "ValidationMethod": "DNS",
            "Tags": [{ "Key": "Name", "Value": format!("{name}/{resource_name}") }],
        });

        if !params.alternative_names.is_empty() {
            properties["SubjectAlternativeNames"] = json!(params.alternative_names);
        }

        if let Some(zone) = params.hosted_zone_id {
            let domains = std::iter::once(params.domain_name).chain(params.alternative_names.iter().copied());

            properties["DomainValidationOptions"] = domains
                .map(|domain| json!({ "DomainName": domain, "HostedZoneId": zone }))
                .collect();
        }

        stack.add_resource(CfnResource::new(
            &resource_name,
            json!({
                "Type": "AWS::CertificateManager::Certificate",
                "Properties": properties,
            }),
        ))?;

        let arn = stack.export(
            "CertificateArn",
            reference(&resource_name),
            &format!("SSL certificate ARN for {}", params.domain_name),
        )?;

        Ok(Self {
            id: app.add_stack(stack)?,
            certificate: Certificate {
                domain_name: params.domain_name.to_string(),
                arn,
            },
        })
    }
}
