use super::frontend::Bucket;
use super::{inline_policy, statement};
use chronas_common::template::{get_att, join, reference, CfnResource, PARTITION};
use chronas_common::{App, Stack, StackId, StackProps};
use serde_json::json;

pub(crate) const SECRET_ACCESS_KEY_NAME: &str = "/chronas/ci/github-actions-secret-access-key";

pub(crate) struct CiParams<'a> {
    pub(crate) bucket: &'a Bucket,
}

/// Deploy user for the frontend workflow
pub(crate) struct GitHubActionsUserStack {
    pub(crate) id: StackId,
}

impl GitHubActionsUserStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: CiParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let bucket_name = stack.resolve(&params.bucket.name)?;
        let bucket_arn = join("", vec![json!("arn:"), reference(PARTITION), json!(":s3:::"), bucket_name]);

        let objects = statement(
            &[
                "s3:GetObject",
                "s3:PutObject",
                "s3:DeleteObject",
                "s3:ListBucket",
                "s3:PutObjectAcl",
                "s3:GetObjectVersion",
                "s3:DeleteObjectVersion",
            ],
            vec![bucket_arn.clone(), join("", vec![bucket_arn, json!("/*")])],
        );

        // Invalidations can't be scoped to a distribution
        let invalidations = statement(
            &[
                "cloudfront:CreateInvalidation",
                "cloudfront:GetInvalidation",
                "cloudfront:ListInvalidations",
                "cloudfront:GetDistribution",
                "cloudfront:GetDistributionConfig",
            ],
            vec![json!("*")],
        );

        stack.add_resources(vec![
            CfnResource::new(
                "GitHubActionsUser",
                json!({
                    "Type": "AWS::IAM::User",
                    "Properties": {
                        "UserName": "chronas-github-actions-user",
                        "Path": "/service-accounts/",
                        "Policies": [inline_policy("GitHubActionsDeploy", vec![objects, invalidations])],
                    }
                }),
            ),
            CfnResource::new(
                "GitHubActionsAccessKey",
                json!({
                    "Type": "AWS::IAM::AccessKey",
                    "Properties": { "UserName": reference("GitHubActionsUser") }
                }),
            ),
            CfnResource::new(
                "GitHubActionsSecretAccessKey",
                json!({
                    "Type": "AWS::SecretsManager::Secret",
                    "Properties": {
                        "Name": SECRET_ACCESS_KEY_NAME,
                        "Description": "Secret access key of the GitHub Actions deploy user",
                        "SecretString": get_att("GitHubActionsAccessKey", "SecretAccessKey"),
                    }
                }),
            ),
        ])?;

        stack.add_output(
            "GitHubActionsUserName",
            reference("GitHubActionsUser"),
            "IAM User name for GitHub Actions",
        )?;
        stack.add_output(
            "GitHubActionsAccessKeyId",
            reference("GitHubActionsAccessKey"),
            "Access Key ID for GitHub Actions (add to GitHub secrets)",
        )?;
        stack.add_output(
            "GitHubActionsSecretAccessKeyName",
            json!(SECRET_ACCESS_KEY_NAME),
            "Secrets Manager secret holding the Secret Access Key",
        )?;

        Ok(Self {
            id: app.add_stack(stack)?,
        })
    }
}
