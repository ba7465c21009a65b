use super::statement;
use chronas_common::template::{reference, secret_reference, CfnResource};
use chronas_common::{App, Output, Stack, StackId, StackProps};
use serde_json::{json, Value};

/// A Secrets Manager secret owned by another stack
#[derive(Clone, Debug)]
pub(crate) struct Secret {
    pub(crate) name: String,
    pub(crate) arn: Output,
}

impl Secret {
    /// Declare a secret in `stack` and export its ARN
    pub(crate) fn declare(
        stack: &mut Stack,
        logical_id: &str,
        name: &str,
        description: &str,
        generate: Value,
    ) -> eyre::Result<Self> {
        stack.add_resource(CfnResource::new(
            logical_id,
            json!({
                "Type": "AWS::SecretsManager::Secret",
                "Properties": {
                    "Name": name,
                    "Description": description,
                    "GenerateSecretString": generate,
                }
            }),
        ))?;

        let arn = stack.export(
            &format!("{logical_id}Arn"),
            reference(logical_id),
            &format!("ARN of the {name} secret"),
        )?;

        Ok(Self {
            name: name.to_string(),
            arn,
        })
    }

    /// Policy statement allowing a role of `stack` to read the secret value
    pub(crate) fn grant_read(&self, stack: &mut Stack) -> eyre::Result<Value> {
        Ok(statement(
            &["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
            vec![stack.resolve(&self.arn)?],
        ))
    }

    /// Dynamic reference resolved by CloudFormation at deploy time
    pub(crate) fn dynamic_reference(&self, stack: &mut Stack) -> eyre::Result<Value> {
        Ok(secret_reference(stack.resolve(&self.arn)?, None))
    }
}

/// Shared application secrets, values are filled in outside of the templates
pub(crate) struct SecretStack {
    pub(crate) id: StackId,
    pub(crate) github_token: Secret,
    pub(crate) docker_username: Secret,
    pub(crate) docker_password: Secret,
    pub(crate) config: Secret,
}

impl SecretStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let placeholder = json!({});

        let github_token = Secret::declare(
            &mut stack,
            "ChronasGithubToken",
            "chronasgithubtoken",
            "Chronas GitHub token",
            placeholder.clone(),
        )?;

        let docker_username = Secret::declare(
            &mut stack,
            "DockerUsername",
            "docker_username",
            "Docker username",
            placeholder.clone(),
        )?;

        let docker_password = Secret::declare(
            &mut stack,
            "DockerPassword",
            "docker_password",
            "Docker password",
            placeholder,
        )?;

        // JWT_SECRET is generated, the rest are placeholders replaced by operators
        let template = json!({
            "MAILGUN_KEY": "myMAILGUN_KEY",
            "MAILGUN_DOMAIN": "myMAILGUN_DOMAIN",
            "MAILGUN_RECEIVER": "myMAILGUN_RECEIVER",
            "TWITTER_CONSUMER_KEY": "myTWITTER_CONSUMER_KEY",
            "TWITTER_CONSUMER_SECRET": "myTWITTER_CONSUMER_SECRET",
            "APPINSIGHTS_INSTRUMENTATIONKEY": "myAPPINSIGHTS_INSTRUMENTATIONKEY",
            "CLOUDINARY_URL": "myCLOUDINARY_URL",
            "FACEBOOK_CLIENT_ID": "myFACEBOOK_CLIENT_ID",
            "FACEBOOK_CLIENT_SECRET": "myFACEBOOK_CLIENT_SECRET",
            "GITHUB_CLIENT_ID": "myGITHUB_CLIENT_ID",
            "GITHUB_CLIENT_SECRET": "myGITHUB_CLIENT_SECRET",
            "GOOGLE_CLIENT_ID": "myGOOGLE_CLIENT_ID",
            "GOOGLE_CLIENT_SECRET": "myGOOGLE_CLIENT_SECRET",
            "PAYPAL_CLIENT_ID": "myPAYPAL_CLIENT_ID",
        });

        let config = Secret::declare(
            &mut stack,
            "ChronasSecrets",
            "/chronas/secrets",
            "Chronas secrets",
            json!({
                "SecretStringTemplate": serde_json::to_string(&template)?,
                "GenerateStringKey": "JWT_SECRET",
            }),
        )?;

        Ok(Self {
            id: app.add_stack(stack)?,
            github_token,
            docker_username,
            docker_password,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::tests::props;

    #[test]
    fn declares_four_secrets() {
        let mut app = App::new();
        let secrets = SecretStack::new(&mut app, "SecretStack", props()).unwrap();
        let template = app.stack(secrets.id).template();

        assert_eq!(template.count_of_type("AWS::SecretsManager::Secret"), 4);
        assert_eq!(secrets.config.name, "/chronas/secrets");
        assert_eq!(
            template.resource("ChronasSecrets").unwrap()["Properties"]["GenerateSecretString"]["GenerateStringKey"],
            "JWT_SECRET"
        );
    }

    #[test]
    fn grant_from_another_stack_imports_the_arn() {
        let mut app = App::new();
        let secrets = SecretStack::new(&mut app, "SecretStack", props()).unwrap();
        let mut consumer = Stack::new("Consumer", props());

        let grant = secrets.config.grant_read(&mut consumer).unwrap();
        assert_eq!(grant["Resource"][0]["Fn::ImportValue"], "SecretStack:ChronasSecretsArn");
        assert!(consumer.dependencies().contains("SecretStack"));
    }
}
