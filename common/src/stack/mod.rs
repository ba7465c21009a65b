mod output;

pub use output::Output;
pub(crate) use output::Producer;

use crate::dashboard::Dashboard;
use crate::route::RouteTable;
use crate::template::{export_name, import_value, CfnResource, Template};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Account and region a stack deploys to, unset parts are taken from the caller's AWS profile
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Target {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Target {
    pub fn new(account: Option<&str>, region: Option<&str>) -> Self {
        Self {
            account: account.map(String::from),
            region: region.map(String::from),
        }
    }

    /// Exports are visible only within one account and region
    pub fn can_import_from(&self, other: &Target) -> bool {
        self.account == other.account && self.region == other.region
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}/{}",
            self.account.as_deref().unwrap_or("default-account"),
            self.region.as_deref().unwrap_or("default-region")
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct StackProps {
    pub target: Target,
    pub description: Option<String>,
}

impl StackProps {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// A named unit of deployment, one CloudFormation stack
#[derive(Debug)]
pub struct Stack {
    name: String,
    target: Target,
    template: Template,
    tags: BTreeMap<String, String>,
    dependencies: BTreeSet<String>,
    dashboards: Vec<Dashboard>,
    route_tables: Vec<RouteTable>,
}

impl Stack {
    pub fn new(name: &str, props: StackProps) -> Self {
        Self {
            name: name.to_string(),
            target: props.target,
            template: Template::new(props.description.as_deref()),
            tags: BTreeMap::new(),
            dependencies: BTreeSet::new(),
            dashboards: vec![],
            route_tables: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn add_resource(&mut self, resource: CfnResource) -> eyre::Result<()> {
        self.template.add_resource(resource)
    }

    pub fn add_resources(&mut self, resources: Vec<CfnResource>) -> eyre::Result<()> {
        resources
            .into_iter()
            .try_for_each(|resource| self.add_resource(resource))
    }

    /// Informational output, not importable by other stacks
    pub fn add_output(&mut self, id: &str, value: Value, description: &str) -> eyre::Result<()> {
        self.template.add_output(id, value, Some(description), None)
    }

    /// Publish a value for other stacks
    pub fn export(&mut self, id: &str, value: Value, description: &str) -> eyre::Result<Output> {
        let export = export_name(&self.name, id);

        self.template
            .add_output(id, value.clone(), Some(description), Some(&export))?;

        Ok(Output {
            value,
            producer: Some(Producer {
                stack: self.name.clone(),
                target: self.target.clone(),
                export,
            }),
        })
    }

    /// Turn an output into a value usable in this stack's template
    pub fn resolve(&mut self, output: &Output) -> eyre::Result<Value> {
        let Some(producer) = &output.producer else {
            return Ok(output.value.clone());
        };

        if producer.stack == self.name {
            return Ok(output.value.clone());
        }

        if !self.target.can_import_from(&producer.target) {
            eyre::bail!(
                "Stack {} ({}) cannot import {} from {} ({}), exports are not shared across accounts or regions",
                self.name,
                self.target,
                producer.export,
                producer.stack,
                producer.target,
            );
        }

        if self.dependencies.insert(producer.stack.clone()) {
            log::debug!("{} depends on {} via {}", self.name, producer.stack, producer.export);
        }

        Ok(import_value(&producer.export))
    }

    pub fn add_dependency(&mut self, stack: &str) {
        self.dependencies.insert(stack.to_string());
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn add_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub(crate) fn attach_dashboard(&mut self, dashboard: Dashboard) {
        self.dashboards.push(dashboard);
    }

    pub(crate) fn attach_route_table(&mut self, routes: RouteTable) {
        self.route_tables.push(routes);
    }

    pub(crate) fn route_tables(&self) -> &[RouteTable] {
        &self.route_tables
    }

    /// Render everything that other stacks could still contribute to
    pub(crate) fn finalize(&mut self) -> eyre::Result<()> {
        for dashboard in std::mem::take(&mut self.dashboards) {
            let resource = dashboard.render(self)?;
            self.add_resource(resource)?;
        }

        Ok(())
    }

    pub(crate) fn into_parts(self) -> (String, Target, Template, BTreeMap<String, String>, BTreeSet<String>) {
        (self.name, self.target, self.template, self.tags, self.dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn stack(name: &str, region: &str) -> Stack {
        Stack::new(name, StackProps::new(Target::new(Some("123456789012"), Some(region))))
    }

    #[test]
    fn cross_stack_resolve_imports_and_records_dependency() {
        let mut network = stack("NetworkStack", "eu-west-1");
        let vpc = network
            .export("VpcId", json!({"Ref": "Vpc"}), "VPC")
            .unwrap();

        let mut database = stack("DatabaseStack", "eu-west-1");
        let value = database.resolve(&vpc).unwrap();

        assert_eq!(value, json!({"Fn::ImportValue": "NetworkStack:VpcId"}));
        assert!(database.dependencies().contains("NetworkStack"));
    }

    #[test]
    fn same_stack_resolve_uses_expression() {
        let mut network = stack("NetworkStack", "eu-west-1");
        let vpc = network
            .export("VpcId", json!({"Ref": "Vpc"}), "VPC")
            .unwrap();

        assert_eq!(network.resolve(&vpc).unwrap(), json!({"Ref": "Vpc"}));
        assert!(network.dependencies().is_empty());
    }

    #[test]
    fn literal_resolve_has_no_dependency() {
        let mut compute = stack("Compute", "eu-west-1");
        let name = Output::literal("/chronas/secrets");

        assert_eq!(compute.resolve(&name).unwrap(), json!("/chronas/secrets"));
        assert!(compute.dependencies().is_empty());
    }

    #[test]
    fn cross_region_resolve_fails() {
        let mut certificate = stack("FrontendCertificateStack", "us-east-1");
        let arn = certificate
            .export("CertificateArn", json!({"Ref": "Certificate"}), "ARN")
            .unwrap();

        let mut gateway = stack("ApiGatewayStack", "eu-west-1");
        assert!(gateway.resolve(&arn).is_err());
        assert!(gateway.dependencies().is_empty());
    }
}
