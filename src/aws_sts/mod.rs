pub mod assume;
pub mod client;

pub use aws_sdk_sts::config::Credentials;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTag {
    pub key: String,
    pub value: String,
}

impl SessionTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Parameters shared by `AssumeRole` and `AssumeRoleWithWebIdentity`.
///
/// Every optional field left as `None` is omitted from the outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub role_session_name: String,
    pub duration_seconds: Option<i32>,
    pub external_id: Option<String>,
    pub tags: Option<Vec<SessionTag>>,
    pub policy: Option<String>,
    pub policy_arns: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct AssumedRole {
    pub credentials: Credentials,
    pub assumed_role_id: Option<String>,
    pub arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account: Option<String>,
    pub arn: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Credentials could not be loaded, please check your action inputs: {0}")]
    Load(BoxError),
    #[error("Unexpected failure: Credentials loaded by the SDK do not match the access key ID configured by the action")]
    Mismatch,
}

#[derive(Debug, thiserror::Error)]
#[error("Access key ID empty after loading credentials")]
struct EmptyAccessKeyId;

/// The slice of STS the action needs.
pub trait StsOperations {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolves whatever the default credential provider chain currently finds.
    async fn load_credentials(&self) -> Result<Credentials, Self::Error>;

    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<AssumedRole, Self::Error>;

    async fn assume_role_with_web_identity(
        &self,
        request: &AssumeRoleRequest,
        web_identity_token: &str,
    ) -> Result<AssumedRole, Self::Error>;

    async fn get_caller_identity(&self) -> Result<CallerIdentity, Self::Error>;

    /// Checks that ambient credentials can be loaded and, unless role chaining,
    /// that they carry the access key id the caller expects.
    async fn validate_credentials(
        &self,
        expected_access_key_id: Option<&str>,
        role_chaining: bool,
    ) -> Result<(), ValidationError> {
        let credentials = self
            .load_credentials()
            .await
            .map_err(|err| ValidationError::Load(Box::new(err)))?;
        if credentials.access_key_id().is_empty() {
            return Err(ValidationError::Load(Box::new(EmptyAccessKeyId)));
        }

        if !role_chaining {
            if let Some(expected) = expected_access_key_id.filter(|e| !e.is_empty()) {
                if expected != credentials.access_key_id() {
                    return Err(ValidationError::Mismatch);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted [`StsOperations`] for tests.

    use super::*;
    use crate::actions::testing::FakeRuntime;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    pub struct FakeStsError(pub String);

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StsCall {
        LoadCredentials,
        AssumeRole(AssumeRoleRequest),
        AssumeRoleWithWebIdentity(AssumeRoleRequest, String),
        GetCallerIdentity,
    }

    /// Resolves ambient credentials from the fake runtime's environment, the
    /// way the default provider chain reads the process environment.
    #[derive(Default)]
    pub struct FakeSts {
        pub runtime: FakeRuntime,
        pub account: Option<String>,
        pub assume_results: Mutex<VecDeque<Result<AssumedRole, FakeStsError>>>,
        pub calls: Mutex<Vec<StsCall>>,
    }

    pub fn assumed_role(access_key_id: &str, secret_access_key: &str) -> AssumedRole {
        AssumedRole {
            credentials: Credentials::new(
                access_key_id,
                secret_access_key,
                Some(format!("{access_key_id}-session")),
                None,
                "AssumeRole",
            ),
            assumed_role_id: Some(format!("AROAEXAMPLE:{access_key_id}")),
            arn: Some(format!(
                "arn:aws:sts::123456789012:assumed-role/Deploy/{access_key_id}"
            )),
        }
    }

    impl FakeSts {
        pub fn new(runtime: &FakeRuntime) -> Self {
            Self {
                runtime: runtime.clone(),
                account: Some("123456789012".to_string()),
                ..Self::default()
            }
        }

        pub fn script(&self, result: Result<AssumedRole, FakeStsError>) {
            self.assume_results.lock().unwrap().push_back(result);
        }

        pub fn calls(&self) -> Vec<StsCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn assume_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| {
                    matches!(
                        c,
                        StsCall::AssumeRole(_) | StsCall::AssumeRoleWithWebIdentity(..)
                    )
                })
                .count()
        }

        fn next_assume_result(&self) -> Result<AssumedRole, FakeStsError> {
            self.assume_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FakeStsError("no scripted response".to_string())))
        }
    }

    impl StsOperations for FakeSts {
        type Error = FakeStsError;

        async fn load_credentials(&self) -> Result<Credentials, Self::Error> {
            self.calls.lock().unwrap().push(StsCall::LoadCredentials);
            let access_key_id = self
                .runtime
                .raw_env("AWS_ACCESS_KEY_ID")
                .ok_or_else(|| FakeStsError("Could not load credentials from any providers".into()))?;
            Ok(Credentials::new(
                access_key_id,
                self.runtime
                    .raw_env("AWS_SECRET_ACCESS_KEY")
                    .unwrap_or_default(),
                self.runtime.raw_env("AWS_SESSION_TOKEN"),
                None,
                "Environment",
            ))
        }

        async fn assume_role(
            &self,
            request: &AssumeRoleRequest,
        ) -> Result<AssumedRole, Self::Error> {
            self.calls
                .lock()
                .unwrap()
                .push(StsCall::AssumeRole(request.clone()));
            self.next_assume_result()
        }

        async fn assume_role_with_web_identity(
            &self,
            request: &AssumeRoleRequest,
            web_identity_token: &str,
        ) -> Result<AssumedRole, Self::Error> {
            self.calls.lock().unwrap().push(StsCall::AssumeRoleWithWebIdentity(
                request.clone(),
                web_identity_token.to_string(),
            ));
            self.next_assume_result()
        }

        async fn get_caller_identity(&self) -> Result<CallerIdentity, Self::Error> {
            self.calls.lock().unwrap().push(StsCall::GetCallerIdentity);
            Ok(CallerIdentity {
                account: self.account.clone(),
                ..CallerIdentity::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeSts, StsCall};
    use super::*;
    use crate::actions::testing::FakeRuntime;

    #[tokio::test]
    async fn test_validate_fails_without_ambient_credentials() {
        let sts = FakeSts::new(&FakeRuntime::default());
        let err = sts.validate_credentials(None, false).await.unwrap_err();
        assert!(matches!(err, ValidationError::Load(_)));
        assert!(err
            .to_string()
            .starts_with("Credentials could not be loaded, please check your action inputs: "));
        assert_eq!(sts.calls(), vec![StsCall::LoadCredentials]);
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_access_key_id() {
        let runtime = FakeRuntime::with_env(&[("AWS_ACCESS_KEY_ID", "")]);
        let sts = FakeSts::new(&runtime);
        let err = sts.validate_credentials(None, false).await.unwrap_err();
        assert!(err.to_string().ends_with("Access key ID empty after loading credentials"));
    }

    #[tokio::test]
    async fn test_validate_detects_mismatch_unless_role_chaining() {
        let runtime = FakeRuntime::with_env(&[
            ("AWS_ACCESS_KEY_ID", "AKIAAMBIENT"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]);
        let sts = FakeSts::new(&runtime);

        assert!(sts.validate_credentials(None, false).await.is_ok());
        assert!(sts
            .validate_credentials(Some("AKIAAMBIENT"), false)
            .await
            .is_ok());
        assert!(matches!(
            sts.validate_credentials(Some("AKIAEXPECTED"), false).await,
            Err(ValidationError::Mismatch)
        ));
        assert!(sts
            .validate_credentials(Some("AKIAEXPECTED"), true)
            .await
            .is_ok());
    }
}
