use super::secret::Secret;
use super::{assume_role_policy, inline_policy, managed_policy, statement};
use chronas_common::template::{get_att, reference, CfnResource, RemovalPolicy};
use chronas_common::{App, Output, Stack, StackId, StackProps};
use eyre::ContextCompat;
use serde_json::{json, Value};

const BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:3.0";

/// ECR repository published by the build pipeline
#[derive(Clone, Debug)]
pub(crate) struct Repository {
    pub(crate) uri: Output,
}

pub(crate) struct BuildParams<'a> {
    pub(crate) github_token: &'a Secret,
    pub(crate) docker_username: &'a Secret,
    pub(crate) docker_password: &'a Secret,
}

/// Image repositories and the CodeBuild projects that fill them on every push
pub(crate) struct BuildStack {
    pub(crate) id: StackId,
    pub(crate) api_repository: Repository,
}

struct Project<'a> {
    logical_id: &'a str,
    github_repo: &'a str,
    repository: &'a str,
    image_prefix: &'a str,
}

impl BuildStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: BuildParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let docker_username = stack.resolve(&params.docker_username.arn)?;
        let docker_password = stack.resolve(&params.docker_password.arn)?;
        let github_token = params.github_token.dynamic_reference(&mut stack)?;

        let docker_credentials = [
            params.docker_username.grant_read(&mut stack)?,
            params.docker_password.grant_read(&mut stack)?,
        ];

        stack.add_resources(vec![
            CfnResource::new(
                "CodeBuildRole",
                json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": assume_role_policy("codebuild.amazonaws.com"),
                        "ManagedPolicyArns": [managed_policy("AmazonEC2ContainerRegistryPowerUser")],
                        "Policies": [inline_policy("CodeBuildDefaultPolicy", vec![
                            statement(
                                &["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                                vec![json!("*")],
                            ),
                            docker_credentials[0].clone(),
                            docker_credentials[1].clone(),
                        ])],
                    }
                }),
            ),
            CfnResource::new(
                "GitHubCreds",
                json!({
                    "Type": "AWS::CodeBuild::SourceCredential",
                    "Properties": {
                        "AuthType": "PERSONAL_ACCESS_TOKEN",
                        "ServerType": "GITHUB",
                        "Token": github_token,
                    }
                }),
            ),
        ])?;

        let projects = [
            Project {
                logical_id: "ChronasApiBuild",
                github_repo: "chronas-api",
                repository: "ChronasApiRepo",
                image_prefix: "chronas-api",
            },
            Project {
                logical_id: "ChronasFrontendBuild",
                github_repo: "chronas",
                repository: "ChronasFrontendRepo",
                image_prefix: "chronas-frontend",
            },
        ];

        let mut repositories = vec![];

        for project in projects.iter() {
            stack.add_resource(
                CfnResource::new(
                    project.repository,
                    json!({
                        "Type": "AWS::ECR::Repository",
                        "Properties": { "EmptyOnDelete": true }
                    }),
                )
                .with_removal_policy(RemovalPolicy::Destroy),
            )?;

            stack.add_resource(
                CfnResource::new(
                    project.logical_id,
                    json!({
                        "Type": "AWS::CodeBuild::Project",
                        "Properties": {
                            "Source": {
                                "Type": "GITHUB",
                                "Location": format!("https://github.com/Chronasorg/{}.git", project.github_repo),
                                "ReportBuildStatus": true,
                                "BuildSpec": buildspec(project.image_prefix)?,
                            },
                            "Triggers": {
                                "Webhook": true,
                                "FilterGroups": [[{ "Type": "EVENT", "Pattern": "PUSH" }]],
                            },
                            "Environment": {
                                "Type": "LINUX_CONTAINER",
                                "Image": BUILD_IMAGE,
                                "ComputeType": "BUILD_GENERAL1_SMALL",
                                "PrivilegedMode": true,
                                "EnvironmentVariables": [
                                    {
                                        "Name": "ECR_REPOSITORY_URI",
                                        "Type": "PLAINTEXT",
                                        "Value": get_att(project.repository, "RepositoryUri"),
                                    },
                                    {
                                        "Name": "DOCKER_HUB_USER",
                                        "Type": "SECRETS_MANAGER",
                                        "Value": docker_username,
                                    },
                                    {
                                        "Name": "DOCKER_HUB_PASSWORD",
                                        "Type": "SECRETS_MANAGER",
                                        "Value": docker_password,
                                    },
                                ],
                            },
                            "ServiceRole": get_att("CodeBuildRole", "Arn"),
                            "Artifacts": { "Type": "NO_ARTIFACTS" },
                        }
                    }),
                )
                .depends_on(&["GitHubCreds"]),
            )?;

            stack.export(
                &format!("{}Name", project.repository),
                reference(project.repository),
                &format!("Name of the {} image repository", project.image_prefix),
            )?;

            stack.export(
                &format!("{}Arn", project.repository),
                get_att(project.repository, "Arn"),
                &format!("ARN of the {} image repository", project.image_prefix),
            )?;

            repositories.push(Repository {
                uri: stack.export(
                    &format!("{}Uri", project.repository),
                    get_att(project.repository, "RepositoryUri"),
                    &format!("URI of the {} image repository", project.image_prefix),
                )?,
            });
        }

        // Compute only pulls the API image
        let api_repository = repositories
            .into_iter()
            .next()
            .wrap_err(format!("Build stack {name} must declare the API repository"))?;

        Ok(Self {
            id: app.add_stack(stack)?,
            api_repository,
        })
    }
}

/// Log in to Docker Hub and ECR, build the image tagged with the short commit and push it
fn buildspec(image_prefix: &str) -> eyre::Result<String> {
    let spec: Value = json!({
        "version": "0.2",
        "phases": {
            "pre_build": {
                "commands": [
                    "echo information GitHub",
                    "echo $CODEBUILD_WEBHOOK_TRIGGER",
                    "echo Login to docker hub",
                    "docker login -u $DOCKER_HUB_USER -p $DOCKER_HUB_PASSWORD",
                    "echo Logging in to Amazon ECR...",
                    "$(aws ecr get-login --no-include-email --region $AWS_DEFAULT_REGION)",
                    "IMAGE_TAG_DYN=$(echo $CODEBUILD_RESOLVED_SOURCE_VERSION | cut -c 1-7)",
                ]
            },
            "build": {
                "commands": [
                    "echo Build started on `date`",
                    "echo Building the Docker image...",
                    format!("docker build -t $ECR_REPOSITORY_URI:{image_prefix}-$IMAGE_TAG_DYN ."),
                    "echo Pushing the Docker image to ECR...",
                    format!("docker push $ECR_REPOSITORY_URI:{image_prefix}-$IMAGE_TAG_DYN"),
                ]
            }
        }
    });

    Ok(serde_json::to_string_pretty(&spec)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::secret::SecretStack;
    use crate::stacks::tests::props;

    #[test]
    fn projects_pull_docker_credentials_from_secrets_manager() {
        let mut app = App::new();
        let secrets = SecretStack::new(&mut app, "SecretStack", props()).unwrap();
        let build = BuildStack::new(
            &mut app,
            "BuildChronasApi",
            props(),
            BuildParams {
                github_token: &secrets.github_token,
                docker_username: &secrets.docker_username,
                docker_password: &secrets.docker_password,
            },
        )
        .unwrap();

        let stack = app.stack(build.id);
        let template = stack.template();
        assert_eq!(template.count_of_type("AWS::CodeBuild::Project"), 2);
        assert_eq!(template.count_of_type("AWS::ECR::Repository"), 2);
        assert!(stack.dependencies().contains("SecretStack"));

        for export in ["ChronasApiRepoName", "ChronasApiRepoArn", "ChronasFrontendRepoUri", "ChronasFrontendRepoArn"] {
            assert!(template.outputs().contains_key(export), "{export} is not exported");
        }

        let variables = &template.resource("ChronasApiBuild").unwrap()["Properties"]["Environment"]
            ["EnvironmentVariables"];
        assert_eq!(variables[1]["Type"], "SECRETS_MANAGER");
        assert_eq!(variables[1]["Value"]["Fn::ImportValue"], "SecretStack:DockerUsernameArn");

        let token = &template.resource("GitHubCreds").unwrap()["Properties"]["Token"];
        assert_eq!(token["Fn::Join"][1][0], "{{resolve:secretsmanager:");
    }

    #[test]
    fn buildspec_tags_images_with_prefix() {
        let spec = buildspec("chronas-frontend").unwrap();
        assert!(spec.contains("docker push $ECR_REPOSITORY_URI:chronas-frontend-$IMAGE_TAG_DYN"));
    }
}
