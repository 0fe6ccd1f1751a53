use super::{AssumeRoleRequest, AssumedRole, CallerIdentity, Credentials, SessionTag, StsOperations};
use aws_config::{AppName, BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_sts::error::{BuildError, DisplayErrorContext};
use aws_sdk_sts::operation::assume_role::AssumeRoleError;
use aws_sdk_sts::operation::assume_role_with_web_identity::AssumeRoleWithWebIdentityError;
use aws_sdk_sts::operation::get_caller_identity::GetCallerIdentityError;
use aws_sdk_sts::types::{PolicyDescriptorType, Tag};
use aws_sdk_sts::Client as StsClient;
use aws_smithy_http_client::proxy::{ProxyConfig, ProxyError};
use aws_smithy_http_client::{tls, Connector};
use aws_smithy_runtime_api::client::http::{http_client_fn, SharedHttpClient, SharedHttpConnector};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use std::time::SystemTime;
use tokio::sync::OnceCell;
use tracing::debug;

pub const USER_AGENT: &str = "configure-aws-credentials-for-github-actions";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid proxy server {0:?}: {1}")]
    InvalidProxy(String, ProxyError),
    #[error("No credentials provider is configured")]
    NoCredentialsProvider,
    #[error(transparent)]
    LoadCredentials(#[from] CredentialsError),
    #[error("{}", DisplayErrorContext(.0))]
    AssumeRole(SdkError<AssumeRoleError, Response>),
    #[error("{}", DisplayErrorContext(.0))]
    AssumeRoleWithWebIdentity(SdkError<AssumeRoleWithWebIdentityError, Response>),
    #[error("{}", DisplayErrorContext(.0))]
    GetCallerIdentity(SdkError<GetCallerIdentityError, Response>),
    #[error("Invalid session tag {key:?}: {source}")]
    InvalidTag { key: String, source: BuildError },
    #[error("STS response did not contain credentials")]
    MissingCredentials,
}

/// STS access for the action.
///
/// The STS client is built on first use so that it signs with whatever
/// credentials the environment holds at that point.
pub struct CredentialsClient {
    region: String,
    proxy_config: Option<ProxyConfig>,
    sts_client: OnceCell<StsClient>,
}

impl CredentialsClient {
    pub fn new(region: &str, proxy_server: Option<&str>) -> Result<Self, Error> {
        let proxy_config = proxy_server
            .map(|proxy| {
                ProxyConfig::all(proxy).map_err(|err| Error::InvalidProxy(proxy.to_string(), err))
            })
            .transpose()?;
        if proxy_config.is_some() {
            debug!("Configuring STS client with proxy");
        }
        Ok(Self {
            region: region.to_string(),
            proxy_config,
            sts_client: OnceCell::new(),
        })
    }

    async fn sdk_config(&self, region: Option<&str>) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .app_name(AppName::new(USER_AGENT).expect("Const app name should be valid"));
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(proxy_config) = &self.proxy_config {
            loader = loader.http_client(proxied_http_client(proxy_config.clone()));
        }
        loader.load().await
    }

    async fn sts_client(&self) -> &StsClient {
        self.sts_client
            .get_or_init(|| async {
                StsClient::new(&self.sdk_config(Some(&self.region)).await)
            })
            .await
    }
}

fn proxied_http_client(proxy_config: ProxyConfig) -> SharedHttpClient {
    http_client_fn(move |settings, _components| {
        let connector = Connector::builder()
            .proxy_config(proxy_config.clone())
            .connector_settings(settings.clone())
            .tls_provider(tls::Provider::Rustls(
                tls::rustls_provider::CryptoMode::AwsLc,
            ))
            .build();
        SharedHttpConnector::new(connector)
    })
}

fn session_tags(tags: &[SessionTag]) -> Result<Vec<Tag>, Error> {
    tags.iter()
        .map(|tag| {
            Tag::builder()
                .key(&tag.key)
                .value(&tag.value)
                .build()
                .map_err(|source| Error::InvalidTag {
                    key: tag.key.clone(),
                    source,
                })
        })
        .collect()
}

fn policy_descriptors(arns: &[String]) -> Vec<PolicyDescriptorType> {
    arns.iter()
        .map(|arn| PolicyDescriptorType::builder().arn(arn).build())
        .collect()
}

fn from_sts_credentials(
    credentials: Option<&aws_sdk_sts::types::Credentials>,
    provider_name: &'static str,
) -> Result<Credentials, Error> {
    let credentials = credentials.ok_or(Error::MissingCredentials)?;
    let session_token = Some(credentials.session_token().to_string()).filter(|t| !t.is_empty());
    Ok(Credentials::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
        session_token,
        SystemTime::try_from(*credentials.expiration()).ok(),
        provider_name,
    ))
}

impl StsOperations for CredentialsClient {
    type Error = Error;

    async fn load_credentials(&self) -> Result<Credentials, Self::Error> {
        let sdk_config = self.sdk_config(None).await;
        let provider = sdk_config
            .credentials_provider()
            .ok_or(Error::NoCredentialsProvider)?;
        Ok(provider.provide_credentials().await?)
    }

    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<AssumedRole, Self::Error> {
        let tags = request
            .tags
            .as_deref()
            .map(session_tags)
            .transpose()?;
        let output = self
            .sts_client()
            .await
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.role_session_name)
            .set_duration_seconds(request.duration_seconds)
            .set_external_id(request.external_id.clone())
            .set_tags(tags)
            .set_policy(request.policy.clone())
            .set_policy_arns(request.policy_arns.as_deref().map(policy_descriptors))
            .send()
            .await
            .map_err(Error::AssumeRole)?;

        Ok(AssumedRole {
            credentials: from_sts_credentials(output.credentials(), "AssumeRole")?,
            assumed_role_id: output
                .assumed_role_user()
                .map(|user| user.assumed_role_id().to_string()),
            arn: output.assumed_role_user().map(|user| user.arn().to_string()),
        })
    }

    async fn assume_role_with_web_identity(
        &self,
        request: &AssumeRoleRequest,
        web_identity_token: &str,
    ) -> Result<AssumedRole, Self::Error> {
        let output = self
            .sts_client()
            .await
            .assume_role_with_web_identity()
            .role_arn(&request.role_arn)
            .role_session_name(&request.role_session_name)
            .web_identity_token(web_identity_token)
            .set_duration_seconds(request.duration_seconds)
            .set_policy(request.policy.clone())
            .set_policy_arns(request.policy_arns.as_deref().map(policy_descriptors))
            .send()
            .await
            .map_err(Error::AssumeRoleWithWebIdentity)?;

        Ok(AssumedRole {
            credentials: from_sts_credentials(output.credentials(), "AssumeRoleWithWebIdentity")?,
            assumed_role_id: output
                .assumed_role_user()
                .map(|user| user.assumed_role_id().to_string()),
            arn: output.assumed_role_user().map(|user| user.arn().to_string()),
        })
    }

    async fn get_caller_identity(&self) -> Result<CallerIdentity, Self::Error> {
        // Fresh client so the call is signed with the credentials just exported.
        let client = StsClient::new(&self.sdk_config(Some(&self.region)).await);
        let output = client
            .get_caller_identity()
            .send()
            .await
            .map_err(Error::GetCallerIdentity)?;
        Ok(CallerIdentity {
            account: output.account().map(str::to_string),
            arn: output.arn().map(str::to_string),
            user_id: output.user_id().map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sts::primitives::DateTime;

    #[test]
    fn test_rejects_invalid_proxy() {
        assert!(matches!(
            CredentialsClient::new("us-east-1", Some("not a proxy url")),
            Err(Error::InvalidProxy(..))
        ));
        assert!(CredentialsClient::new("us-east-1", Some("http://proxy.example.com:8080")).is_ok());
        assert!(CredentialsClient::new("us-east-1", None).is_ok());
    }

    #[test]
    fn test_session_tags() {
        let tags = session_tags(&[
            SessionTag::new("GitHub", "Actions"),
            SessionTag::new("Repository", "octo/repo"),
        ])
        .unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].key(), "GitHub");
        assert_eq!(tags[1].value(), "octo/repo");
    }

    #[test]
    fn test_policy_descriptors() {
        let descriptors = policy_descriptors(&[
            "arn:aws:iam::aws:policy/ReadOnlyAccess".to_string(),
            "arn:aws:iam::123456789012:policy/Custom".to_string(),
        ]);
        assert_eq!(
            descriptors[1].arn(),
            Some("arn:aws:iam::123456789012:policy/Custom")
        );
    }

    #[test]
    fn test_from_sts_credentials() {
        let sts_credentials = aws_sdk_sts::types::Credentials::builder()
            .access_key_id("ASIAEXAMPLE")
            .secret_access_key("secret")
            .session_token("token")
            .expiration(DateTime::from_secs(1_700_000_000))
            .build()
            .unwrap();

        let credentials = from_sts_credentials(Some(&sts_credentials), "AssumeRole").unwrap();
        assert_eq!(credentials.access_key_id(), "ASIAEXAMPLE");
        assert_eq!(credentials.secret_access_key(), "secret");
        assert_eq!(credentials.session_token(), Some("token"));
        assert!(credentials.expiry().is_some());

        assert!(matches!(
            from_sts_credentials(None, "AssumeRole"),
            Err(Error::MissingCredentials)
        ));
    }
}
