use super::secret::Secret;
use super::FRONTEND_DOMAIN;
use chronas_common::template::{get_att, CfnResource};
use chronas_common::{App, Stack, StackId, StackProps};
use serde_json::json;

const REPOSITORY: &str = "https://github.com/Chronasorg/chronas";
const BRANCH: &str = "amplify";

pub(crate) struct AmplifyParams<'a> {
    pub(crate) github_token: &'a Secret,
}

/// Amplify hosting of the frontend, superseded by the bucket and distribution
pub(crate) struct AmplifyStack {
    pub(crate) id: StackId,
}

impl AmplifyStack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: AmplifyParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let token = params.github_token.dynamic_reference(&mut stack)?;

        stack.add_resources(vec![
            CfnResource::new(
                "ChronasFrontend",
                json!({
                    "Type": "AWS::Amplify::App",
                    "Properties": {
                        "Name": "ChronasFrontend",
                        "Repository": REPOSITORY,
                        "OauthToken": token,
                    }
                }),
            ),
            CfnResource::new(
                "AmplifyBranch",
                json!({
                    "Type": "AWS::Amplify::Branch",
                    "Properties": {
                        "AppId": get_att("ChronasFrontend", "AppId"),
                        "BranchName": BRANCH,
                    }
                }),
            ),
            CfnResource::new(
                "ChronasFrontendDomain",
                json!({
                    "Type": "AWS::Amplify::Domain",
                    "Properties": {
                        "AppId": get_att("ChronasFrontend", "AppId"),
                        "DomainName": FRONTEND_DOMAIN,
                        "SubDomainSettings": [{ "BranchName": BRANCH, "Prefix": "chronas-frontend-amplify" }],
                        "EnableAutoSubDomain": false,
                    }
                }),
            )
            .depends_on(&["AmplifyBranch"]),
        ])?;

        Ok(Self {
            id: app.add_stack(stack)?,
        })
    }
}
