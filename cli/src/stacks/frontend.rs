use super::certificate::Certificate;
use super::FRONTEND_DOMAIN;
use chronas_common::template::{get_att, join, reference, sub, CfnResource, RemovalPolicy};
use chronas_common::{App, Output, Stack, StackId, StackProps};
use serde_json::{json, Value};

const ORIGIN_ID: &str = "ChronasFrontendOrigin";
const ONE_YEAR: u32 = 365 * 24 * 60 * 60;

// Managed cache policies
const CACHING_OPTIMIZED: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
const CACHING_DISABLED: &str = "4135ea2d-6df8-44a3-9df3-4b5a84be39ad";

/// Path patterns cached for a year: (pattern, logical id, policy name, compress)
const LONG_LIVED: [(&str, &str, &str, bool); 5] = [
    ("*.js", "JavaScriptCachePolicy", "ChronasJavaScript", true),
    ("*.css", "CSSCachePolicy", "ChronasCSS", true),
    ("/images/*", "ImageCachePolicy", "ChronasImages", false),
    ("*.woff*", "FontCachePolicy", "ChronasFonts", true),
    ("/static/*", "StaticAssetsCachePolicy", "ChronasStaticAssets", true),
];

/// Bucket the built frontend is uploaded to
pub(crate) struct Bucket {
    pub(crate) name: Output,
}

pub(crate) struct FrontendParams<'a> {
    pub(crate) certificate: &'a Certificate,
}

/// Static frontend in a bucket served by a CloudFront distribution
pub(crate) struct FrontendS3Stack {
    pub(crate) id: StackId,
    pub(crate) bucket: Bucket,
}

impl FrontendS3Stack {
    pub(crate) fn new(app: &mut App, name: &str, props: StackProps, params: FrontendParams) -> eyre::Result<Self> {
        let mut stack = Stack::new(name, props);
        let certificate_arn = stack.resolve(&params.certificate.arn)?;
        let objects = join("", vec![get_att("ChronasFrontendBucket", "Arn"), json!("/*")]);

        stack.add_resources(vec![
            CfnResource::new(
                "ChronasFrontendBucket",
                json!({
                    "Type": "AWS::S3::Bucket",
                    "Properties": {
                        "BucketName": sub("chronas-frontend-${AWS::AccountId}"),
                        "WebsiteConfiguration": {
                            "IndexDocument": "index.html",
                            "ErrorDocument": "index.html",
                        },
                        "PublicAccessBlockConfiguration": {
                            "BlockPublicAcls": true,
                            "IgnorePublicAcls": true,
                            "BlockPublicPolicy": false,
                            "RestrictPublicBuckets": false,
                        },
                        "Tags": [{ "Key": "aws-cdk:auto-delete-objects", "Value": "true" }],
                    }
                }),
            )
            .with_removal_policy(RemovalPolicy::Destroy),
            CfnResource::new(
                "OAI",
                json!({
                    "Type": "AWS::CloudFront::CloudFrontOriginAccessIdentity",
                    "Properties": {
                        "CloudFrontOriginAccessIdentityConfig": { "Comment": "Chronas Frontend OAI" }
                    }
                }),
            ),
            CfnResource::new(
                "ChronasFrontendBucketPolicy",
                json!({
                    "Type": "AWS::S3::BucketPolicy",
                    "Properties": {
                        "Bucket": reference("ChronasFrontendBucket"),
                        "PolicyDocument": {
                            "Version": "2012-10-17",
                            "Statement": [
                                {
                                    "Effect": "Allow",
                                    "Principal": { "AWS": "*" },
                                    "Action": "s3:GetObject",
                                    "Resource": objects,
                                },
                                {
                                    "Effect": "Allow",
                                    "Principal": { "CanonicalUser": get_att("OAI", "S3CanonicalUserId") },
                                    "Action": "s3:GetObject",
                                    "Resource": objects,
                                },
                            ],
                        },
                    }
                }),
            ),
        ])?;

        let mut behaviors = Vec::new();

        for (pattern, id, policy_name, compress) in LONG_LIVED {
            stack.add_resource(cache_policy(id, policy_name, compress))?;
            behaviors.push(behavior(Some(pattern), reference(id), compress));
        }

        behaviors.push(behavior(Some("*.html"), json!(CACHING_DISABLED), true));

        let error_responses = [404, 403]
            .map(|code| {
                json!({
                    "ErrorCode": code,
                    "ResponseCode": 200,
                    "ResponsePagePath": "/index.html",
                    "ErrorCachingMinTTL": 300,
                })
            })
            .to_vec();

        stack.add_resource(CfnResource::new(
            "ChronasDistribution",
            json!({
                "Type": "AWS::CloudFront::Distribution",
                "Properties": {
                    "DistributionConfig": {
                        "Enabled": true,
                        "Aliases": [FRONTEND_DOMAIN, format!("*.{FRONTEND_DOMAIN}")],
                        "ViewerCertificate": {
                            "AcmCertificateArn": certificate_arn,
                            "SslSupportMethod": "sni-only",
                            "MinimumProtocolVersion": "TLSv1.2_2021",
                        },
                        "Origins": [{
                            "Id": ORIGIN_ID,
                            "DomainName": get_att("ChronasFrontendBucket", "RegionalDomainName"),
                            "S3OriginConfig": {
                                "OriginAccessIdentity": sub("origin-access-identity/cloudfront/${OAI}"),
                            },
                        }],
                        "DefaultCacheBehavior": behavior(None, json!(CACHING_OPTIMIZED), true),
                        "CacheBehaviors": behaviors,
                        "CustomErrorResponses": error_responses,
                        "PriceClass": "PriceClass_100",
                        "IPV6Enabled": true,
                        "HttpVersion": "http2",
                    }
                }
            }),
        ))?;

        let bucket = Bucket {
            name: stack.export(
                "BucketName",
                reference("ChronasFrontendBucket"),
                "S3 Bucket name for frontend deployment",
            )?,
        };

        stack.add_output(
            "DistributionId",
            reference("ChronasDistribution"),
            "CloudFront Distribution ID",
        )?;
        stack.add_output(
            "DistributionDomainName",
            get_att("ChronasDistribution", "DomainName"),
            "CloudFront Distribution Domain Name",
        )?;
        stack.add_output(
            "WebsiteURL",
            sub("https://${ChronasDistribution.DomainName}"),
            "Website URL",
        )?;

        Ok(Self {
            id: app.add_stack(stack)?,
            bucket,
        })
    }
}

fn cache_policy(id: &str, name: &str, compress: bool) -> CfnResource {
    CfnResource::new(
        id,
        json!({
            "Type": "AWS::CloudFront::CachePolicy",
            "Properties": {
                "CachePolicyConfig": {
                    "Name": name,
                    "DefaultTTL": ONE_YEAR,
                    "MaxTTL": ONE_YEAR,
                    "MinTTL": ONE_YEAR,
                    "ParametersInCacheKeyAndForwardedToOrigin": {
                        "CookiesConfig": { "CookieBehavior": "none" },
                        "HeadersConfig": { "HeaderBehavior": "none" },
                        "QueryStringsConfig": { "QueryStringBehavior": "none" },
                        "EnableAcceptEncodingGzip": compress,
                        "EnableAcceptEncodingBrotli": compress,
                    }
                }
            }
        }),
    )
}

/// Cache behavior on the bucket origin, the default one has no path pattern
fn behavior(pattern: Option<&str>, cache_policy_id: Value, compress: bool) -> Value {
    let mut behavior = json!({
        "TargetOriginId": ORIGIN_ID,
        "ViewerProtocolPolicy": "redirect-to-https",
        "CachePolicyId": cache_policy_id,
        "Compress": compress,
    });

    if let Some(pattern) = pattern {
        behavior["PathPattern"] = json!(pattern);
    }

    behavior
}
