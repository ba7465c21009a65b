use crate::cloudformation::CloudFormation;
use crate::error::Error;
use crate::runner::{Config, Runnable, Runner};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(clap::Args, Clone)]
pub(crate) struct DiffCommand {
    /// Stacks to compare, all by default
    stacks: Vec<String>,
}

impl Runnable for DiffCommand {
    fn runner(&self, config: &Config) -> impl Runner {
        DiffRunner {
            command: self.clone(),
            config: config.clone(),
        }
    }
}

struct DiffRunner {
    command: DiffCommand,
    config: Config,
}

/// Logical ids that differ between two templates
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Changes {
    pub(crate) added: Vec<String>,
    pub(crate) removed: Vec<String>,
    pub(crate) modified: Vec<String>,
}

impl Changes {
    fn between(deployed: &Map<String, Value>, synthesized: &Map<String, Value>) -> Self {
        let names = deployed
            .keys()
            .chain(synthesized.keys())
            .collect::<BTreeSet<_>>();

        let mut changes = Self::default();

        for name in names {
            match (deployed.get(name), synthesized.get(name)) {
                (None, Some(_)) => changes.added.push(name.clone()),
                (Some(_), None) => changes.removed.push(name.clone()),
                (Some(old), Some(new)) if old != new => changes.modified.push(name.clone()),
                _ => {}
            }
        }

        changes
    }

    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct StackDiff {
    pub(crate) resources: Changes,
    pub(crate) outputs: Changes,
}

impl StackDiff {
    pub(crate) fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }
}

/// Compare the deployed template, if there is one, with the synthesized one
pub(crate) fn compare(deployed: Option<&Value>, synthesized: &Value) -> StackDiff {
    let section = |template: Option<&Value>, key: &str| -> Map<String, Value> {
        template
            .and_then(|template| template.get(key))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    };

    StackDiff {
        resources: Changes::between(
            &section(deployed, "Resources"),
            &section(Some(synthesized), "Resources"),
        ),
        outputs: Changes::between(
            &section(deployed, "Outputs"),
            &section(Some(synthesized), "Outputs"),
        ),
    }
}

fn print(kind: &str, changes: &Changes) {
    for name in changes.added.iter() {
        println!("  {} {kind} {name}", console::style("[+]").green());
    }

    for name in changes.modified.iter() {
        println!("  {} {kind} {name}", console::style("[~]").yellow());
    }

    for name in changes.removed.iter() {
        println!("  {} {kind} {name}", console::style("[-]").red());
    }
}

impl Runner for DiffRunner {
    fn config(&self) -> &Config {
        &self.config
    }

    async fn run(&mut self) -> Result<(), Error> {
        let assembly = self.synth()?;

        let stacks = assembly
            .select(&self.command.stacks, false)
            .map_err(|e| self.error(Some("Unknown stack"), Some(&format!("{e:#}")), None))?;

        let default_region = self.config.context.region()?.to_string();

        for stack in stacks {
            let region = stack.target.region.as_deref().unwrap_or(&default_region);
            let client = CloudFormation::new(region).await;
            let deployed = client.template(&stack.name).await?;
            let diff = compare(deployed.as_ref(), &stack.template.to_value());

            println!("{}", console::style(&stack.name).bold());

            if deployed.is_none() {
                println!("  {}", console::style("not deployed yet").dim());
            }

            if diff.is_empty() {
                println!("  {}", console::style("no differences").dim());
                continue;
            }

            print("Resource", &diff.resources);
            print("Output", &diff.outputs);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn template() -> Value {
        json!({
            "Resources": {
                "Vpc": {"Type": "AWS::EC2::VPC", "Properties": {"CidrBlock": "10.0.0.0/16"}},
                "Topic": {"Type": "AWS::SNS::Topic"},
            },
            "Outputs": {
                "VpcId": {"Value": {"Ref": "Vpc"}},
            },
        })
    }

    #[test]
    fn identical_templates() {
        assert!(compare(Some(&template()), &template()).is_empty());
    }

    #[test]
    fn missing_stack_is_all_added() {
        let diff = compare(None, &template());

        assert_eq!(diff.resources.added, vec!["Topic", "Vpc"]);
        assert_eq!(diff.outputs.added, vec!["VpcId"]);
        assert!(diff.resources.removed.is_empty());
    }

    #[test]
    fn added_removed_and_modified() {
        let mut synthesized = template();
        synthesized["Resources"]["Vpc"]["Properties"]["CidrBlock"] = json!("10.1.0.0/16");
        synthesized["Resources"].as_object_mut().unwrap().remove("Topic");
        synthesized["Resources"]["Queue"] = json!({"Type": "AWS::SQS::Queue"});
        synthesized.as_object_mut().unwrap().remove("Outputs");

        let diff = compare(Some(&template()), &synthesized);

        assert_eq!(
            diff.resources,
            Changes {
                added: vec!["Queue".to_string()],
                removed: vec!["Topic".to_string()],
                modified: vec!["Vpc".to_string()],
            }
        );

        assert_eq!(diff.outputs.removed, vec!["VpcId"]);
    }
}
