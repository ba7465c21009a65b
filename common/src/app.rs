use crate::stack::{Stack, Target};
use crate::template::Template;
use eyre::WrapErr;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Handle of a stack added to an app
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StackId(usize);

/// A set of stacks synthesized and deployed together
#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
    tags: BTreeMap<String, String>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&mut self, stack: Stack) -> eyre::Result<StackId> {
        if self.stacks.iter().any(|s| s.name() == stack.name()) {
            eyre::bail!("Stack {} is already declared", stack.name());
        }

        self.stacks.push(stack);
        Ok(StackId(self.stacks.len() - 1))
    }

    pub fn stack(&self, id: StackId) -> &Stack {
        &self.stacks[id.0]
    }

    pub fn stack_mut(&mut self, id: StackId) -> &mut Stack {
        &mut self.stacks[id.0]
    }

    pub fn stack_ids(&self) -> Vec<StackId> {
        (0..self.stacks.len()).map(StackId).collect()
    }

    /// Deploy `dependent` only after `dependency`
    pub fn add_dependency(&mut self, dependent: StackId, dependency: StackId) {
        let name = self.stacks[dependency.0].name().to_string();
        self.stacks[dependent.0].add_dependency(&name);
    }

    pub fn add_tags(&mut self, id: StackId, tags: &[(&str, &str)]) {
        let stack = self.stack_mut(id);

        for (key, value) in tags {
            stack.add_tag(key, value);
        }
    }

    /// Tag every stack, stack level tags take precedence
    pub fn tag_all(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    /// Finalize all stacks, validate the graph and order stacks for deployment
    pub fn synth(mut self) -> eyre::Result<Assembly> {
        for stack in self.stacks.iter_mut() {
            stack
                .finalize()
                .wrap_err(format!("Failed to finalize {}", stack.name()))?;
        }

        for stack in self.stacks.iter() {
            for routes in stack.route_tables() {
                routes.validate()?;
            }
        }

        self.check_secret_names()?;
        self.check_dependencies()?;

        let order = self.deployment_order()?;
        let mut stacks = self.stacks.into_iter().map(Some).collect::<Vec<_>>();
        let mut artifacts = vec![];

        for index in order {
            let Some(stack) = stacks[index].take() else {
                continue;
            };

            let (name, target, template, stack_tags, dependencies) = stack.into_parts();
            let mut tags = self.tags.clone();
            tags.extend(stack_tags);

            artifacts.push(StackArtifact {
                name,
                target,
                dependencies: dependencies.into_iter().collect(),
                tags,
                template,
            });
        }

        Ok(Assembly { stacks: artifacts })
    }

    /// Secret names are unique per account and region
    fn check_secret_names(&self) -> eyre::Result<()> {
        let mut seen = HashSet::new();

        for stack in self.stacks.iter() {
            let names = stack
                .template()
                .resources_of_type("AWS::SecretsManager::Secret")
                .filter_map(|(_, secret)| secret["Properties"]["Name"].as_str());

            for name in names {
                let target = stack.target();
                let key = (target.account.clone(), target.region.clone(), name);

                if !seen.insert(key) {
                    eyre::bail!("Secret {name} is declared more than once (last in {})", stack.name());
                }
            }
        }

        Ok(())
    }

    fn check_dependencies(&self) -> eyre::Result<()> {
        let names = self.stacks.iter().map(Stack::name).collect::<BTreeSet<_>>();

        for stack in self.stacks.iter() {
            for dependency in stack.dependencies() {
                if dependency == stack.name() {
                    eyre::bail!("Stack {} depends on itself", stack.name());
                }

                if !names.contains(dependency.as_str()) {
                    eyre::bail!("Stack {} depends on unknown stack {dependency}", stack.name());
                }
            }
        }

        Ok(())
    }

    /// Topological order, ties broken by declaration order
    fn deployment_order(&self) -> eyre::Result<Vec<usize>> {
        let index_of = |name: &str| self.stacks.iter().position(|s| s.name() == name);
        let mut remaining = (0..self.stacks.len()).collect::<BTreeSet<_>>();
        let mut order = vec![];

        while !remaining.is_empty() {
            let next = remaining.iter().copied().find(|&index| {
                self.stacks[index]
                    .dependencies()
                    .iter()
                    .filter_map(|dependency| index_of(dependency))
                    .all(|dependency| !remaining.contains(&dependency))
            });

            let Some(next) = next else {
                let cycle = remaining
                    .iter()
                    .map(|&index| self.stacks[index].name())
                    .collect::<Vec<_>>()
                    .join(", ");

                eyre::bail!("Stacks have a dependency cycle: {cycle}");
            };

            remaining.remove(&next);
            order.push(next);
        }

        Ok(order)
    }
}

/// One synthesized stack
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackArtifact {
    pub name: String,
    pub target: Target,
    pub dependencies: Vec<String>,
    pub tags: BTreeMap<String, String>,
    #[serde(skip)]
    pub template: Template,
}

impl StackArtifact {
    pub fn template_file(&self) -> String {
        format!("{}.template.json", self.name)
    }
}

/// Result of synthesis, stacks in deployment order
#[derive(Clone, Debug)]
pub struct Assembly {
    pub stacks: Vec<StackArtifact>,
}

impl Assembly {
    pub fn stack(&self, name: &str) -> Option<&StackArtifact> {
        self.stacks.iter().find(|stack| stack.name == name)
    }

    /// Stacks matching the names, optionally with everything they depend on, in deployment order
    pub fn select(&self, names: &[String], with_dependencies: bool) -> eyre::Result<Vec<&StackArtifact>> {
        if names.is_empty() {
            return Ok(self.stacks.iter().collect());
        }

        let mut selected = BTreeSet::new();
        let mut queue = vec![];

        for name in names {
            if self.stack(name).is_none() {
                eyre::bail!("Stack {name} is not part of the app");
            }

            queue.push(name.as_str());
        }

        while let Some(name) = queue.pop() {
            if !selected.insert(name) {
                continue;
            }

            if with_dependencies {
                if let Some(stack) = self.stack(name) {
                    queue.extend(stack.dependencies.iter().map(String::as_str));
                }
            }
        }

        Ok(self
            .stacks
            .iter()
            .filter(|stack| selected.contains(stack.name.as_str()))
            .collect())
    }

    /// Write every template and a manifest describing the assembly
    pub fn write(&self, dir: &Path) -> eyre::Result<()> {
        std::fs::create_dir_all(dir).wrap_err(format!("Failed to create {dir:?}"))?;

        for stack in self.stacks.iter() {
            let path = dir.join(stack.template_file());

            std::fs::write(&path, stack.template.to_json()?)
                .wrap_err(format!("Failed to write {path:?}"))?;
        }

        let manifest = json!({
            "version": 1,
            "stacks": self.stacks.iter().map(|stack| {
                let mut entry = json!(stack);
                entry["templateFile"] = json!(stack.template_file());
                entry
            }).collect::<Vec<_>>(),
        });

        std::fs::write(dir.join("manifest.json"), serde_json::to_string_pretty(&manifest)?)
            .wrap_err("Failed to write the manifest")?;

        Ok(())
    }
}
