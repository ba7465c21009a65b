mod intrinsic;
mod sanitize;

pub use intrinsic::*;
pub use sanitize::{export_name, logical_id};

use eyre::{ContextCompat, WrapErr};
use serde_json::{json, Map, Value};

/// What happens to a stateful resource when it leaves the template
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

impl RemovalPolicy {
    fn as_cfn(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CfnResource {
    pub name: String,
    pub resource: Value,
}

impl CfnResource {
    pub fn new(name: &str, resource: Value) -> Self {
        Self {
            name: name.to_string(),
            resource,
        }
    }

    /// Set both DeletionPolicy and UpdateReplacePolicy
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        if let Some(resource) = self.resource.as_object_mut() {
            resource.insert("DeletionPolicy".into(), json!(policy.as_cfn()));
            resource.insert("UpdateReplacePolicy".into(), json!(policy.as_cfn()));
        }

        self
    }

    /// Order creation after other resources of the same template
    pub fn depends_on(mut self, names: &[&str]) -> Self {
        if let Some(resource) = self.resource.as_object_mut() {
            resource.insert("DependsOn".into(), json!(names));
        }

        self
    }

    pub fn kind(&self) -> Option<&str> {
        self.resource.get("Type").and_then(|kind| kind.as_str())
    }
}

/// A single CloudFormation template
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Template {
    description: Option<String>,
    resources: Map<String, Value>,
    outputs: Map<String, Value>,
}

impl Template {
    pub fn new(description: Option<&str>) -> Self {
        Self {
            description: description.map(String::from),
            ..Default::default()
        }
    }

    /// Add a resource to the template, logical IDs must be unique
    pub fn add_resource(&mut self, CfnResource { name, resource }: CfnResource) -> eyre::Result<()> {
        if self.resources.contains_key(&name) {
            eyre::bail!("Resource {name} is already declared");
        }

        resource
            .get("Type")
            .and_then(|kind| kind.as_str())
            .wrap_err(format!("Resource {name} has no type"))?;

        self.resources.insert(name, resource);
        Ok(())
    }

    /// Add an output, optionally exported for other stacks of the same account and region
    pub fn add_output(
        &mut self,
        name: &str,
        value: Value,
        description: Option<&str>,
        export: Option<&str>,
    ) -> eyre::Result<()> {
        if self.outputs.contains_key(name) {
            eyre::bail!("Output {name} is already declared");
        }

        let mut output = json!({ "Value": value });

        if let Some(description) = description {
            output["Description"] = json!(description);
        }

        if let Some(export) = export {
            output["Export"] = json!({ "Name": export });
        }

        self.outputs.insert(name.to_string(), output);
        Ok(())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn resource(&self, name: &str) -> Option<&Value> {
        self.resources.get(name)
    }

    pub fn resources(&self) -> &Map<String, Value> {
        &self.resources
    }

    pub fn outputs(&self) -> &Map<String, Value> {
        &self.outputs
    }

    /// All resources of a CloudFormation type, e.g. "AWS::EC2::Subnet"
    pub fn resources_of_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = (&'a String, &'a Value)> {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource["Type"] == kind)
    }

    pub fn count_of_type(&self, kind: &str) -> usize {
        self.resources_of_type(kind).count()
    }

    pub fn to_value(&self) -> Value {
        let mut template = json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Resources": self.resources,
        });

        if let Some(description) = &self.description {
            template["Description"] = json!(description);
        }

        if !self.outputs.is_empty() {
            template["Outputs"] = json!(self.outputs);
        }

        template
    }

    pub fn to_json(&self) -> eyre::Result<String> {
        serde_json::to_string_pretty(&self.to_value()).wrap_err("Failed to serialize template")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_logical_id_is_rejected() {
        let mut template = Template::new(None);
        let queue = || CfnResource::new("Queue", json!({"Type": "AWS::SQS::Queue"}));

        template.add_resource(queue()).unwrap();
        assert!(template.add_resource(queue()).is_err());
        assert_eq!(template.count_of_type("AWS::SQS::Queue"), 1);
    }

    #[test]
    fn removal_policy_sets_both_policies() {
        let resource = CfnResource::new("Table", json!({"Type": "AWS::DynamoDB::Table"}))
            .with_removal_policy(RemovalPolicy::Retain);

        assert_eq!(resource.resource["DeletionPolicy"], "Retain");
        assert_eq!(resource.resource["UpdateReplacePolicy"], "Retain");
    }

    #[test]
    fn rendered_template_omits_empty_outputs() {
        let mut template = Template::new(Some("Network"));
        template
            .add_resource(CfnResource::new("Vpc", json!({"Type": "AWS::EC2::VPC"})))
            .unwrap();

        let value = template.to_value();
        assert_eq!(value["Description"], "Network");
        assert!(value.get("Outputs").is_none());
    }
}
