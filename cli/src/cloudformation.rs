//! Provisioning of synthesized stacks through the CloudFormation API

use aws_config::BehaviorVersion;
use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use aws_sdk_cloudformation::types::{Capability, Tag};
use chrono::{DateTime, Utc};
use chronas_common::StackArtifact;
use eyre::{ContextCompat, WrapErr};
use std::time::Duration;

/// Largest template body accepted inline by CreateStack and UpdateStack
pub(crate) const MAX_TEMPLATE_BYTES: usize = 51_200;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    InProgress,
    Complete,
    Failed,
}

/// Map a stack status such as UPDATE_ROLLBACK_COMPLETE to its phase
pub(crate) fn classify(status: &str) -> Phase {
    if status.ends_with("_IN_PROGRESS") {
        Phase::InProgress
    } else if status.contains("FAILED") || status.contains("ROLLBACK") {
        Phase::Failed
    } else {
        Phase::Complete
    }
}

fn is_missing(code: Option<&str>, message: Option<&str>) -> bool {
    code == Some("ValidationError") && message.is_some_and(|message| message.contains("does not exist"))
}

fn is_unchanged(code: Option<&str>, message: Option<&str>) -> bool {
    code == Some("ValidationError") && message.is_some_and(|message| message.contains("No updates are to be performed"))
}

/// What a deploy request resulted in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Submitted {
    Created,
    Updated,
    Unchanged,
}

pub(crate) struct CloudFormation {
    client: aws_sdk_cloudformation::Client,
    sts: aws_sdk_sts::Client,
}

impl CloudFormation {
    pub(crate) async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: aws_sdk_cloudformation::Client::new(&config),
            sts: aws_sdk_sts::Client::new(&config),
        }
    }

    /// Account of the credentials in use
    pub(crate) async fn account(&self) -> eyre::Result<String> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .wrap_err("Failed to get the caller identity")?;

        identity
            .account()
            .map(String::from)
            .wrap_err("Caller identity has no account")
    }

    /// Current status, none when the stack does not exist
    pub(crate) async fn status(&self, name: &str) -> eyre::Result<Option<String>> {
        let result = self.client.describe_stacks().stack_name(name).send().await;

        let output = match result {
            Ok(output) => output,
            Err(error) if is_missing(error.code(), error.message()) => return Ok(None),
            Err(error) => return Err(error).wrap_err(format!("Failed to describe stack {name}")),
        };

        Ok(output
            .stacks()
            .first()
            .and_then(|stack| stack.stack_status())
            .map(|status| status.as_str().to_string()))
    }

    /// Template of the deployed stack, none when the stack does not exist
    pub(crate) async fn template(&self, name: &str) -> eyre::Result<Option<serde_json::Value>> {
        let result = self.client.get_template().stack_name(name).send().await;

        let output = match result {
            Ok(output) => output,
            Err(error) if is_missing(error.code(), error.message()) => return Ok(None),
            Err(error) => return Err(error).wrap_err(format!("Failed to get the template of {name}")),
        };

        let body = output
            .template_body()
            .wrap_err(format!("Stack {name} has no template body"))?;

        serde_json::from_str(body)
            .map(Some)
            .wrap_err(format!("Deployed template of {name} is not JSON"))
    }

    /// Create the stack or update it when it exists
    pub(crate) async fn deploy(&self, artifact: &StackArtifact) -> eyre::Result<Submitted> {
        let name = artifact.name.as_str();
        let body = serde_json::to_string(&artifact.template.to_value())?;

        if body.len() > MAX_TEMPLATE_BYTES {
            eyre::bail!(
                "Template of {name} is {} bytes, more than {MAX_TEMPLATE_BYTES} allowed",
                body.len()
            );
        }

        let tags = artifact
            .tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect::<Vec<_>>();

        let capabilities = [Capability::CapabilityIam, Capability::CapabilityNamedIam];

        match self.status(name).await?.as_deref() {
            // A stack whose creation rolled back can only be deleted
            Some("ROLLBACK_COMPLETE") => {
                log::warn!("Stack {name} failed to create before, deleting it first");
                self.delete(name).await?;
                self.wait(name, |_| ()).await?;
            }

            Some(_) => {
                let result = self
                    .client
                    .update_stack()
                    .stack_name(name)
                    .template_body(body)
                    .set_capabilities(Some(capabilities.to_vec()))
                    .set_tags(Some(tags))
                    .send()
                    .await;

                return match result {
                    Ok(_) => Ok(Submitted::Updated),
                    Err(error) if is_unchanged(error.code(), error.message()) => Ok(Submitted::Unchanged),
                    Err(error) => Err(error).wrap_err(format!("Failed to update stack {name}")),
                };
            }

            None => {}
        }

        self.client
            .create_stack()
            .stack_name(name)
            .template_body(body)
            .set_capabilities(Some(capabilities.to_vec()))
            .set_tags(Some(tags))
            .send()
            .await
            .wrap_err(format!("Failed to create stack {name}"))?;

        Ok(Submitted::Created)
    }

    pub(crate) async fn delete(&self, name: &str) -> eyre::Result<()> {
        self.client
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .wrap_err(format!("Failed to delete stack {name}"))?;

        Ok(())
    }

    /// Poll until the stack leaves the in-progress phase
    ///
    /// Returns the final status, none when the stack is gone
    pub(crate) async fn wait(&self, name: &str, mut on_status: impl FnMut(&str)) -> eyre::Result<Option<String>> {
        loop {
            let Some(status) = self.status(name).await? else {
                return Ok(None);
            };

            on_status(&status);

            if classify(&status) != Phase::InProgress {
                return Ok(Some(status));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Failed resource events joined into one message
    pub(crate) async fn failure_reason(&self, name: &str, since: DateTime<Utc>) -> eyre::Report {
        match self.failures(name, since).await {
            Ok(failures) if failures.is_empty() => eyre::eyre!("No failed resource events were reported"),
            Ok(failures) => eyre::eyre!(failures.join("\n")),
            Err(e) => e,
        }
    }

    /// Failed resource events since the operation started, newest first
    pub(crate) async fn failures(&self, name: &str, since: DateTime<Utc>) -> eyre::Result<Vec<String>> {
        let mut failures = Vec::new();
        let mut next_token = None;

        'pages: loop {
            let output = self
                .client
                .describe_stack_events()
                .stack_name(name)
                .set_next_token(next_token)
                .send()
                .await
                .wrap_err(format!("Failed to get events of {name}"))?;

            for event in output.stack_events() {
                if event.timestamp().is_some_and(|timestamp| timestamp.secs() < since.timestamp()) {
                    break 'pages;
                }

                let status = event.resource_status().map(|status| status.as_str()).unwrap_or_default();

                if status.ends_with("_FAILED") {
                    failures.push(format!(
                        "{} {status}: {}",
                        event.logical_resource_id().unwrap_or("?"),
                        event.resource_status_reason().unwrap_or("no reason given"),
                    ));
                }
            }

            next_token = output.next_token().map(String::from);

            if next_token.is_none() {
                break;
            }
        }

        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn statuses() {
        assert_eq!(classify("CREATE_IN_PROGRESS"), Phase::InProgress);
        assert_eq!(classify("UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"), Phase::InProgress);
        assert_eq!(classify("UPDATE_COMPLETE"), Phase::Complete);
        assert_eq!(classify("DELETE_COMPLETE"), Phase::Complete);
        assert_eq!(classify("ROLLBACK_COMPLETE"), Phase::Failed);
        assert_eq!(classify("UPDATE_ROLLBACK_COMPLETE"), Phase::Failed);
        assert_eq!(classify("DELETE_FAILED"), Phase::Failed);
    }

    #[test]
    fn validation_errors() {
        let validation = Some("ValidationError");

        assert!(is_missing(validation, Some("Stack with id NetworkStack does not exist")));
        assert!(!is_missing(Some("Throttling"), Some("does not exist")));
        assert!(is_unchanged(validation, Some("No updates are to be performed.")));
        assert!(!is_unchanged(validation, Some("Template format error")));
    }
}
