use crate::actions::{self, ActionsRuntime};
use crate::aws_sts::{Credentials, StsOperations};
use chrono::{DateTime, Utc};
use tracing::debug;

pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";
pub const REGION_VAR: &str = "AWS_REGION";
pub const DEFAULT_REGION_VAR: &str = "AWS_DEFAULT_REGION";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Runtime(#[from] actions::Error),
    #[error("Could not get Account ID from STS. Did you set credentials?")]
    MissingAccountId,
    #[error("Could not get Account ID from STS: {0}")]
    CallerIdentity(Box<dyn std::error::Error + Send + Sync>),
}

/// Masks and exports a credential set, optionally mirroring it to step outputs.
pub fn export_credentials<R: ActionsRuntime>(
    runtime: &R,
    credentials: &Credentials,
    output_credentials: bool,
) -> Result<(), Error> {
    let access_key_id = credentials.access_key_id();
    let secret_access_key = credentials.secret_access_key();

    if !access_key_id.is_empty() {
        runtime.set_secret(access_key_id)?;
        runtime.export_variable(ACCESS_KEY_ID_VAR, access_key_id)?;
    }
    if !secret_access_key.is_empty() {
        runtime.set_secret(secret_access_key)?;
        runtime.export_variable(SECRET_ACCESS_KEY_VAR, secret_access_key)?;
    }

    match credentials.session_token().filter(|t| !t.is_empty()) {
        Some(session_token) => {
            runtime.set_secret(session_token)?;
            runtime.export_variable(SESSION_TOKEN_VAR, session_token)?;
        }
        // A token left over from an earlier credential set would not match the new keys.
        None if runtime.env(SESSION_TOKEN_VAR).is_some() => {
            runtime.export_variable(SESSION_TOKEN_VAR, "")?;
        }
        None => {}
    }

    if let Some(expiry) = credentials.expiry() {
        let expiry: DateTime<Utc> = expiry.into();
        debug!(
            "Credentials expire at {}",
            expiry.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );
    }

    if output_credentials {
        if !access_key_id.is_empty() {
            runtime.set_output("aws-access-key-id", access_key_id)?;
        }
        if !secret_access_key.is_empty() {
            runtime.set_output("aws-secret-access-key", secret_access_key)?;
        }
        if let Some(session_token) = credentials.session_token().filter(|t| !t.is_empty()) {
            runtime.set_output("aws-session-token", session_token)?;
        }
    }
    Ok(())
}

pub fn unset_credentials<R: ActionsRuntime>(runtime: &R) -> Result<(), Error> {
    for name in [
        ACCESS_KEY_ID_VAR,
        SECRET_ACCESS_KEY_VAR,
        SESSION_TOKEN_VAR,
        REGION_VAR,
        DEFAULT_REGION_VAR,
    ] {
        runtime.export_variable(name, "")?;
    }
    Ok(())
}

pub fn export_region<R: ActionsRuntime>(runtime: &R, region: &str) -> Result<(), Error> {
    runtime.export_variable(DEFAULT_REGION_VAR, region)?;
    runtime.export_variable(REGION_VAR, region)?;
    Ok(())
}

/// Looks up the account of the current credentials and publishes it as the
/// `aws-account-id` output.
pub async fn export_account_id<R, S>(runtime: &R, sts: &S, mask: bool) -> Result<String, Error>
where
    R: ActionsRuntime,
    S: StsOperations,
{
    let identity = sts
        .get_caller_identity()
        .await
        .map_err(|err| Error::CallerIdentity(Box::new(err)))?;
    let account_id = identity
        .account
        .filter(|a| !a.is_empty())
        .ok_or(Error::MissingAccountId)?;
    if mask {
        runtime.set_secret(&account_id)?;
    }
    runtime.set_output("aws-account-id", &account_id)?;
    Ok(account_id)
}
