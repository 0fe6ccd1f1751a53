use super::{AssumeRoleRequest, AssumedRole, SessionTag, StsOperations};
use crate::actions::{self, ActionsRuntime, GithubContext};
use crate::utils::sanitize::sanitize_tag_value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ARN_PREFIX: &str = "arn:aws";

#[derive(Debug, thiserror::Error)]
pub enum Error<E: std::error::Error + 'static> {
    #[error("Source Account ID is needed if the Role Name is provided and not the Role Arn.")]
    MissingSourceAccount,
    #[error(transparent)]
    Context(#[from] actions::Error),
    #[error("Web identity token file does not exist: {}", .0.display())]
    TokenFileMissing(PathBuf),
    #[error("Could not assume role with web identity token file: {1}")]
    TokenFileRead(PathBuf, std::io::Error),
    #[error("Could not assume role with OIDC: {0}")]
    Oidc(E),
    #[error("Could not assume role with web identity token file: {0}")]
    WebIdentityFile(E),
    #[error("Could not assume role with user credentials: {0}")]
    UserCredentials(E),
}

/// Everything needed to request one role session.
#[derive(Debug, Clone, Default)]
pub struct RoleAssumption {
    pub role_to_assume: String,
    pub role_session_name: String,
    pub role_duration_seconds: i32,
    pub role_external_id: Option<String>,
    pub role_skip_session_tagging: bool,
    pub source_account_id: Option<String>,
    pub web_identity_token: Option<String>,
    pub web_identity_token_file: Option<PathBuf>,
    pub inline_session_policy: Option<String>,
    pub managed_session_policies: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum AssumeStrategy<'a> {
    Oidc(&'a str),
    WebIdentityFile(&'a Path),
    Credentials,
}

impl<'a> AssumeStrategy<'a> {
    fn select(params: &'a RoleAssumption) -> Self {
        match (
            params.web_identity_token.as_deref(),
            params.web_identity_token_file.as_deref(),
        ) {
            (Some(token), _) if !token.is_empty() => Self::Oidc(token),
            (_, Some(path)) if !path.as_os_str().is_empty() => Self::WebIdentityFile(path),
            _ => Self::Credentials,
        }
    }
}

/// Turns a role name into an ARN in the source account; ARNs pass through.
pub fn role_arn<E: std::error::Error + 'static>(
    role_to_assume: &str,
    source_account_id: Option<&str>,
) -> Result<String, Error<E>> {
    if role_to_assume.starts_with(ARN_PREFIX) {
        return Ok(role_to_assume.to_string());
    }
    let account = source_account_id
        .filter(|a| !a.is_empty())
        .ok_or(Error::MissingSourceAccount)?;
    Ok(format!("arn:aws:iam::{account}:role/{role_to_assume}"))
}

pub fn session_tags(context: &GithubContext) -> Vec<SessionTag> {
    let mut tags = vec![
        SessionTag::new("GitHub", "Actions"),
        SessionTag::new("Repository", &context.repository),
        SessionTag::new("Workflow", sanitize_tag_value(&context.workflow)),
        SessionTag::new("Action", &context.action),
        SessionTag::new("Actor", sanitize_tag_value(&context.actor)),
        SessionTag::new("Commit", &context.sha),
    ];
    if let Some(git_ref) = &context.git_ref {
        tags.push(SessionTag::new("Branch", sanitize_tag_value(git_ref)));
    }
    tags
}

pub struct RoleAssumer<'a, S, R> {
    sts: &'a S,
    runtime: &'a R,
}

impl<'a, S, R> RoleAssumer<'a, S, R>
where
    S: StsOperations,
    R: ActionsRuntime,
{
    pub fn new(sts: &'a S, runtime: &'a R) -> Self {
        Self { sts, runtime }
    }

    fn build_request(
        &self,
        params: &RoleAssumption,
        context: &GithubContext,
    ) -> Result<AssumeRoleRequest, Error<S::Error>> {
        let tags = if params.role_skip_session_tagging {
            debug!("Role session tagging has been skipped.");
            None
        } else {
            let tags = session_tags(context);
            debug!("{} role session tags are being used.", tags.len());
            Some(tags)
        };

        Ok(AssumeRoleRequest {
            role_arn: role_arn(&params.role_to_assume, params.source_account_id.as_deref())?,
            role_session_name: params.role_session_name.clone(),
            duration_seconds: Some(params.role_duration_seconds),
            external_id: params.role_external_id.clone().filter(|e| !e.is_empty()),
            tags,
            policy: params.inline_session_policy.clone().filter(|p| !p.is_empty()),
            policy_arns: Some(params.managed_session_policies.clone()).filter(|p| !p.is_empty()),
        })
    }

    pub async fn assume_role(&self, params: &RoleAssumption) -> Result<AssumedRole, Error<S::Error>> {
        let context = GithubContext::from_runtime(self.runtime)?;
        let request = self.build_request(params, &context)?;
        info!("Assuming role {}", request.role_arn);

        match AssumeStrategy::select(params) {
            AssumeStrategy::Oidc(token) => {
                debug!("Using OIDC token to assume role");
                let request = AssumeRoleRequest {
                    tags: None,
                    ..request
                };
                self.sts
                    .assume_role_with_web_identity(&request, token)
                    .await
                    .map_err(Error::Oidc)
            }
            AssumeStrategy::WebIdentityFile(path) => {
                debug!("Using web identity token file to assume role");
                let token_file = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    context.workspace.join(path)
                };
                if !token_file.exists() {
                    return Err(Error::TokenFileMissing(token_file));
                }
                let token = std::fs::read_to_string(&token_file)
                    .map_err(|err| Error::TokenFileRead(token_file.clone(), err))?;
                let request = AssumeRoleRequest {
                    tags: None,
                    ..request
                };
                self.sts
                    .assume_role_with_web_identity(&request, &token)
                    .await
                    .map_err(Error::WebIdentityFile)
            }
            AssumeStrategy::Credentials => {
                debug!("Using IAM credentials to assume role");
                self.sts
                    .assume_role(&request)
                    .await
                    .map_err(Error::UserCredentials)
            }
        }
    }
}
