use crate::commands::configure::{
    ConfigureInputs, DEFAULT_AUDIENCE, DEFAULT_ROLE_DURATION_SECONDS, DEFAULT_ROLE_SESSION_NAME,
};
use crate::utils::retry::DEFAULT_MAX_ATTEMPTS;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Configure AWS credentials for the steps of a GitHub Actions job.
///
/// Every option can also be given as the action input of the same name,
/// which the runner passes as an `INPUT_<NAME>` environment variable.
#[derive(Parser)]
#[command(about, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve credentials and export them to the job (the main step).
    Configure(ConfigureArgs),
    /// Remove the exported credentials from the job (the post step).
    Cleanup,
}

/// Booleans follow the YAML 1.2 core schema, as action inputs do. Unset
/// inputs arrive as empty strings.
fn parse_yaml_bool(s: &str) -> Result<bool, String> {
    let s = s.trim();
    match s {
        "" | "false" | "False" | "FALSE" => Ok(false),
        "true" | "True" | "TRUE" => Ok(true),
        _ => Err(format!(
            "Input does not meet YAML 1.2 \"Core Schema\" specification: {s}\n\
             Support boolean input list: `true | True | TRUE | false | False | FALSE`"
        )),
    }
}

fn parse_number<T: std::str::FromStr>(s: &str, default: T) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    match s.trim() {
        "" => Ok(default),
        s => s.parse().map_err(|err| format!("Invalid number {s:?}: {err}")),
    }
}

fn parse_role_duration(s: &str) -> Result<i32, String> {
    parse_number(s, DEFAULT_ROLE_DURATION_SECONDS)
}

fn parse_max_attempts(s: &str) -> Result<i64, String> {
    parse_number(s, DEFAULT_MAX_ATTEMPTS as i64)
}

/// Multiline inputs hold one value per line; blank lines are dropped.
fn multiline(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Args, Debug, Clone)]
pub struct ConfigureArgs {
    /// AWS region, e.g. us-east-2.
    #[arg(long, env = "INPUT_AWS-REGION")]
    pub aws_region: String,

    /// ARN or name of the role to assume. Names are resolved in the account
    /// of the source credentials.
    #[arg(long, env = "INPUT_ROLE-TO-ASSUME")]
    pub role_to_assume: Option<String>,

    /// AWS access key id. Requires `aws-secret-access-key`.
    #[arg(long, env = "INPUT_AWS-ACCESS-KEY-ID")]
    pub aws_access_key_id: Option<String>,

    #[arg(long, env = "INPUT_AWS-SECRET-ACCESS-KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    #[arg(long, env = "INPUT_AWS-SESSION-TOKEN", hide_env_values = true)]
    pub aws_session_token: Option<String>,

    /// Web identity token file to assume the role with, relative to the workspace.
    #[arg(long, env = "INPUT_WEB-IDENTITY-TOKEN-FILE")]
    pub web_identity_token_file: Option<PathBuf>,

    /// Use the credentials already in the environment to assume the role.
    #[arg(long, env = "INPUT_ROLE-CHAINING", value_parser = parse_yaml_bool, default_value = "false", action = ArgAction::Set)]
    pub role_chaining: bool,

    /// Audience of the OIDC token.
    #[arg(long, env = "INPUT_AUDIENCE")]
    pub audience: Option<String>,

    /// Proxy for the calls to STS.
    #[arg(long, env = "INPUT_HTTP-PROXY")]
    pub http_proxy: Option<String>,

    /// Mask the account id in the logs.
    #[arg(long, env = "INPUT_MASK-AWS-ACCOUNT-ID", value_parser = parse_yaml_bool, default_value = "false", action = ArgAction::Set)]
    pub mask_aws_account_id: bool,

    #[arg(long, env = "INPUT_ROLE-DURATION-SECONDS", value_parser = parse_role_duration, default_value = "")]
    pub role_duration_seconds: i32,

    #[arg(long, env = "INPUT_ROLE-EXTERNAL-ID", hide_env_values = true)]
    pub role_external_id: Option<String>,

    #[arg(long, env = "INPUT_ROLE-SESSION-NAME")]
    pub role_session_name: Option<String>,

    /// Do not attach session tags to the assumed role session.
    #[arg(long, env = "INPUT_ROLE-SKIP-SESSION-TAGGING", value_parser = parse_yaml_bool, default_value = "false", action = ArgAction::Set)]
    pub role_skip_session_tagging: bool,

    /// Inline IAM policy JSON to scope down the role session.
    #[arg(long, env = "INPUT_INLINE-SESSION-POLICY")]
    pub inline_session_policy: Option<String>,

    /// Managed policy ARNs to scope down the role session, one per line.
    #[arg(long, env = "INPUT_MANAGED-SESSION-POLICIES")]
    pub managed_session_policies: Option<String>,

    /// Also set the credentials as step outputs.
    #[arg(long, env = "INPUT_OUTPUT-CREDENTIALS", value_parser = parse_yaml_bool, default_value = "false", action = ArgAction::Set)]
    pub output_credentials: bool,

    /// Clear credentials already in the environment before anything else.
    #[arg(long, env = "INPUT_UNSET-CURRENT-CREDENTIALS", value_parser = parse_yaml_bool, default_value = "false", action = ArgAction::Set)]
    pub unset_current_credentials: bool,

    #[arg(long, env = "INPUT_DISABLE-RETRY", value_parser = parse_yaml_bool, default_value = "false", action = ArgAction::Set)]
    pub disable_retry: bool,

    /// Attempts for each retried call; values below 1 mean a single attempt.
    #[arg(long, env = "INPUT_RETRY-MAX-ATTEMPTS", value_parser = parse_max_attempts, default_value = "", allow_negative_numbers = true)]
    pub retry_max_attempts: i64,

    /// Request new credentials until neither key contains special characters.
    #[arg(long, env = "INPUT_SPECIAL-CHARACTERS-WORKAROUND", value_parser = parse_yaml_bool, default_value = "false", action = ArgAction::Set)]
    pub special_characters_workaround: bool,
}

impl ConfigureArgs {
    pub fn proxy_server(&self) -> Option<&str> {
        self.http_proxy
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

impl From<ConfigureArgs> for ConfigureInputs {
    fn from(args: ConfigureArgs) -> Self {
        Self {
            region: args.aws_region.trim().to_string(),
            role_to_assume: non_empty(args.role_to_assume),
            access_key_id: non_empty(args.aws_access_key_id),
            secret_access_key: non_empty(args.aws_secret_access_key),
            session_token: non_empty(args.aws_session_token),
            web_identity_token_file: args
                .web_identity_token_file
                .filter(|p| !p.as_os_str().is_empty()),
            role_chaining: args.role_chaining,
            audience: non_empty(args.audience).unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            mask_account_id: args.mask_aws_account_id,
            role_duration_seconds: args.role_duration_seconds,
            role_external_id: non_empty(args.role_external_id),
            role_session_name: non_empty(args.role_session_name)
                .unwrap_or_else(|| DEFAULT_ROLE_SESSION_NAME.to_string()),
            role_skip_session_tagging: args.role_skip_session_tagging,
            inline_session_policy: non_empty(args.inline_session_policy),
            managed_session_policies: multiline(args.managed_session_policies),
            output_credentials: args.output_credentials,
            unset_current_credentials: args.unset_current_credentials,
            disable_retry: args.disable_retry,
            retry_max_attempts: usize::try_from(args.retry_max_attempts.max(1)).unwrap_or(1),
            special_characters_workaround: args.special_characters_workaround,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(
            ["configure-aws-credentials"]
                .into_iter()
                .chain(args.iter().copied()),
        )
    }

    fn configure_inputs(args: &[&str]) -> ConfigureInputs {
        match parse(args).unwrap().command {
            Commands::Configure(args) => ConfigureInputs::from(args),
            Commands::Cleanup => panic!("expected configure"),
        }
    }

    #[test]
    fn test_yaml_bool() {
        for value in ["true", "True", "TRUE"] {
            assert_eq!(parse_yaml_bool(value), Ok(true));
        }
        for value in ["", "false", "False", "FALSE"] {
            assert_eq!(parse_yaml_bool(value), Ok(false));
        }
        assert_eq!(parse_yaml_bool("true "), Ok(true));
        assert_eq!(parse_yaml_bool(" FALSE\n"), Ok(false));
        assert!(parse_yaml_bool("yes").is_err());
        assert!(parse_yaml_bool("1").is_err());
    }

    #[test]
    fn test_defaults() {
        let inputs = configure_inputs(&["configure", "--aws-region", "us-west-2"]);
        assert_eq!(inputs.region, "us-west-2");
        assert_eq!(inputs.audience, DEFAULT_AUDIENCE);
        assert_eq!(inputs.role_session_name, DEFAULT_ROLE_SESSION_NAME);
        assert_eq!(inputs.role_duration_seconds, 3600);
        assert_eq!(inputs.retry_max_attempts, 12);
        assert!(!inputs.role_chaining);
        assert!(inputs.managed_session_policies.is_empty());
    }

    #[test]
    fn test_flags() {
        let inputs = configure_inputs(&[
            "configure",
            "--aws-region",
            "eu-central-1",
            "--role-to-assume",
            "Deploy",
            "--aws-access-key-id",
            "",
            "--role-chaining",
            "True",
            "--retry-max-attempts",
            "-3",
            "--role-duration-seconds",
            "900",
            "--managed-session-policies",
            "arn:aws:iam::aws:policy/A\n\n  arn:aws:iam::aws:policy/B  \n",
        ]);
        assert_eq!(inputs.role_to_assume.as_deref(), Some("Deploy"));
        assert_eq!(inputs.access_key_id, None);
        assert!(inputs.role_chaining);
        assert_eq!(inputs.retry_max_attempts, 1);
        assert_eq!(inputs.role_duration_seconds, 900);
        assert_eq!(
            inputs.managed_session_policies,
            vec!["arn:aws:iam::aws:policy/A", "arn:aws:iam::aws:policy/B"]
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse(&["configure", "--aws-region", "x", "--disable-retry", "yes"]).is_err());
        assert!(parse(&["configure", "--aws-region", "x", "--role-duration-seconds", "1h"]).is_err());
    }

    #[test]
    fn test_cleanup() {
        assert!(matches!(parse(&["cleanup"]).unwrap().command, Commands::Cleanup));
    }
}
