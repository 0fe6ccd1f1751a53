use super::export::{self, export_account_id, export_credentials, export_region, unset_credentials};
use crate::actions::oidc::{ProvideIdToken, REQUEST_TOKEN_VAR};
use crate::actions::ActionsRuntime;
use crate::aws_sts::assume::{RoleAssumer, RoleAssumption};
use crate::aws_sts::{AssumedRole, Credentials, StsOperations, ValidationError};
use crate::utils::retry::{Retry, RetryPolicy, Sleeper, DEFAULT_MAX_ATTEMPTS};
use crate::utils::sanitize::has_disallowed_characters;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

pub const DEFAULT_AUDIENCE: &str = "sts.amazonaws.com";
pub const DEFAULT_ROLE_SESSION_NAME: &str = "GitHubActions";
pub const DEFAULT_ROLE_DURATION_SECONDS: i32 = 3600;

static REGION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("Const region regex should be valid"));

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Region is not valid: {0}")]
    InvalidRegion(String),
    #[error("'aws-secret-access-key' must be provided if 'aws-access-key-id' is provided")]
    MissingSecretAccessKey,
    #[error("getIDToken call failed: {0}")]
    IdToken(BoxError),
    #[error(transparent)]
    Export(#[from] export::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    AssumeRole(BoxError),
    #[error("Unable to obtain credentials without special characters after {0} attempts")]
    SpecialCharacters(usize),
}

#[derive(Debug, Clone)]
pub struct ConfigureInputs {
    pub region: String,
    pub role_to_assume: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub web_identity_token_file: Option<PathBuf>,
    pub role_chaining: bool,
    pub audience: String,
    pub mask_account_id: bool,
    pub role_duration_seconds: i32,
    pub role_external_id: Option<String>,
    pub role_session_name: String,
    pub role_skip_session_tagging: bool,
    pub inline_session_policy: Option<String>,
    pub managed_session_policies: Vec<String>,
    pub output_credentials: bool,
    pub unset_current_credentials: bool,
    pub disable_retry: bool,
    pub retry_max_attempts: usize,
    pub special_characters_workaround: bool,
}

impl Default for ConfigureInputs {
    fn default() -> Self {
        Self {
            region: String::new(),
            role_to_assume: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            web_identity_token_file: None,
            role_chaining: false,
            audience: DEFAULT_AUDIENCE.to_string(),
            mask_account_id: false,
            role_duration_seconds: DEFAULT_ROLE_DURATION_SECONDS,
            role_external_id: None,
            role_session_name: DEFAULT_ROLE_SESSION_NAME.to_string(),
            role_skip_session_tagging: false,
            inline_session_policy: None,
            managed_session_policies: Vec::new(),
            output_credentials: false,
            unset_current_credentials: false,
            disable_retry: false,
            retry_max_attempts: DEFAULT_MAX_ATTEMPTS,
            special_characters_workaround: false,
        }
    }
}

impl ConfigureInputs {
    /// Whether failures are retried, and with which budget.
    ///
    /// The special characters workaround needs retries, so it overrides
    /// `disable-retry` and the attempt count.
    pub fn retry_settings(&self) -> (bool, RetryPolicy) {
        if self.special_characters_workaround {
            (true, RetryPolicy::new(DEFAULT_MAX_ATTEMPTS))
        } else {
            (!self.disable_retry, RetryPolicy::new(self.retry_max_attempts))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum AuthMethod<'a> {
    Oidc {
        audience: &'a str,
    },
    StaticCredentials {
        access_key_id: &'a str,
        secret_access_key: Option<&'a str>,
        session_token: Option<&'a str>,
    },
    WebIdentityFile(&'a PathBuf),
    AmbientCredentials,
}

impl<'a> AuthMethod<'a> {
    fn select<R: ActionsRuntime>(inputs: &'a ConfigureInputs, runtime: &R) -> Self {
        let has_role = inputs.role_to_assume.is_some();
        let has_request_token = runtime.env(REQUEST_TOKEN_VAR).is_some();
        let oidc_candidate = has_role
            && inputs.web_identity_token_file.is_none()
            && inputs.access_key_id.is_none()
            && !inputs.role_chaining;

        if oidc_candidate && !has_request_token {
            warn!(
                "It looks like you might be trying to authenticate with OIDC. \
                 Did you mean to set the `id-token` permission? If you are not trying to \
                 authenticate with OIDC and the action is working successfully, you can ignore this message."
            );
        }

        match (
            oidc_candidate && has_request_token,
            inputs.access_key_id.as_deref(),
            inputs.web_identity_token_file.as_ref(),
        ) {
            (true, _, _) => Self::Oidc {
                audience: &inputs.audience,
            },
            (_, Some(access_key_id), _) => Self::StaticCredentials {
                access_key_id,
                secret_access_key: inputs.secret_access_key.as_deref(),
                session_token: inputs.session_token.as_deref(),
            },
            (_, _, Some(path)) => Self::WebIdentityFile(path),
            _ => Self::AmbientCredentials,
        }
    }
}

/// Resolves credentials for the job and exports them.
pub async fn exec_configure<R, S, T, Z>(
    runtime: &R,
    sts: &S,
    id_token_provider: &T,
    sleeper: Z,
    inputs: &ConfigureInputs,
) -> Result<(), Error>
where
    R: ActionsRuntime,
    S: StsOperations,
    T: ProvideIdToken,
    Z: Sleeper,
{
    let (retryable, policy) = inputs.retry_settings();
    let retry = Retry::new(policy, retryable).with_sleeper(sleeper);

    if inputs.unset_current_credentials {
        unset_credentials(runtime)?;
    }
    if !REGION_REGEX.is_match(&inputs.region) {
        return Err(Error::InvalidRegion(inputs.region.clone()));
    }
    export_region(runtime, &inputs.region)?;

    let mut source_account_id = None;
    let mut web_identity_token = None;
    match AuthMethod::select(inputs, runtime) {
        AuthMethod::Oidc { audience } => {
            let token = retry
                .run(|| id_token_provider.get_id_token(audience))
                .await
                .map_err(|err| Error::IdToken(Box::new(err)))?;
            runtime.set_secret(&token).map_err(export::Error::from)?;
            web_identity_token = Some(token);
        }
        AuthMethod::StaticCredentials {
            access_key_id,
            secret_access_key,
            session_token,
        } => {
            let secret_access_key = secret_access_key.ok_or(Error::MissingSecretAccessKey)?;
            // The STS client signs with the environment, so the keys go out first.
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                session_token.map(str::to_string),
                None,
                "ActionInputs",
            );
            export_credentials(runtime, &credentials, false)?;
        }
        AuthMethod::WebIdentityFile(_) => {}
        AuthMethod::AmbientCredentials if !inputs.role_chaining => {
            sts.validate_credentials(None, false).await?;
            source_account_id = Some(export_account_id(runtime, sts, inputs.mask_account_id).await?);
        }
        AuthMethod::AmbientCredentials => {}
    }

    if inputs.access_key_id.is_some() || inputs.role_chaining {
        sts.validate_credentials(inputs.access_key_id.as_deref(), inputs.role_chaining)
            .await?;
        source_account_id = Some(export_account_id(runtime, sts, inputs.mask_account_id).await?);
    }

    let Some(role_to_assume) = &inputs.role_to_assume else {
        info!("Proceeding with IAM user credentials");
        return Ok(());
    };

    let params = RoleAssumption {
        role_to_assume: role_to_assume.clone(),
        role_session_name: inputs.role_session_name.clone(),
        role_duration_seconds: inputs.role_duration_seconds,
        role_external_id: inputs.role_external_id.clone(),
        role_skip_session_tagging: inputs.role_skip_session_tagging,
        source_account_id,
        web_identity_token,
        web_identity_token_file: inputs.web_identity_token_file.clone(),
        inline_session_policy: inputs.inline_session_policy.clone(),
        managed_session_policies: inputs.managed_session_policies.clone(),
    };
    let role = assume_role_until_clean(
        &RoleAssumer::new(sts, runtime),
        &retry,
        &params,
        inputs.special_characters_workaround,
    )
    .await?;

    info!(
        "Authenticated as assumedRoleId {}",
        role.assumed_role_id.as_deref().unwrap_or_default()
    );
    if let Some(arn) = &role.arn {
        debug!("Assumed role ARN is {arn}");
    }
    export_credentials(runtime, &role.credentials, inputs.output_credentials)?;

    // Hosted runners set GITHUB_ACTIONS; elsewhere the exported keys may be
    // shadowed by other sources, and input keys may have been bogus.
    if runtime.env("GITHUB_ACTIONS").is_none() || inputs.access_key_id.is_some() {
        sts.validate_credentials(Some(role.credentials.access_key_id()), false)
            .await?;
    }
    export_account_id(runtime, sts, inputs.mask_account_id).await?;
    Ok(())
}

/// Assumes the role with retries, then repeats the whole exchange while the
/// workaround is on and the returned keys contain special characters.
async fn assume_role_until_clean<R, S, Z>(
    assumer: &RoleAssumer<'_, S, R>,
    retry: &Retry<Z>,
    params: &RoleAssumption,
    special_characters_workaround: bool,
) -> Result<AssumedRole, Error>
where
    R: ActionsRuntime,
    S: StsOperations,
    Z: Sleeper,
{
    let invocations = if special_characters_workaround {
        DEFAULT_MAX_ATTEMPTS
    } else {
        1
    };
    for invocation in 1..=invocations {
        let role = retry
            .run(|| assumer.assume_role(params))
            .await
            .map_err(|err| Error::AssumeRole(Box::new(err)))?;
        if !special_characters_workaround || !has_disallowed_characters(&role.credentials) {
            return Ok(role);
        }
        debug!("Credentials contain special characters, requesting new ones ({invocation}/{invocations})");
    }
    Err(Error::SpecialCharacters(invocations))
}
