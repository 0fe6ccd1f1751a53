use super::ActionsRuntime;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

pub const REQUEST_URL_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
pub const REQUEST_TOKEN_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to get {} env variable", REQUEST_URL_VAR)]
    MissingRequestUrl,
    #[error("Unable to get {} env variable", REQUEST_TOKEN_VAR)]
    MissingRequestToken,
    #[error("Invalid ID token request URL {0:?}: {1}")]
    InvalidRequestUrl(String, String),
    #[error("Failed to get ID Token: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Response json body do not have ID Token field")]
    MissingToken,
}

/// Source of signed OIDC identity tokens for the running job.
pub trait ProvideIdToken {
    type Error: std::error::Error + Send + Sync + 'static;
    async fn get_id_token(&self, audience: &str) -> Result<String, Self::Error>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    value: Option<String>,
}

/// Requests ID tokens from the Actions runtime token service.
///
/// Both the request URL and the bearer token are only present when the job
/// was granted the `id-token: write` permission.
pub struct ActionsIdTokenProvider {
    client: reqwest::Client,
    request_url: Option<String>,
    request_token: Option<String>,
}

impl ActionsIdTokenProvider {
    pub fn from_runtime<R: ActionsRuntime>(runtime: &R) -> Self {
        Self {
            client: reqwest::Client::new(),
            request_url: runtime.env(REQUEST_URL_VAR),
            request_token: runtime.env(REQUEST_TOKEN_VAR),
        }
    }
}

fn token_request_url(base: &str, audience: &str) -> Result<Url, Error> {
    let mut url =
        Url::parse(base).map_err(|err| Error::InvalidRequestUrl(base.to_string(), err.to_string()))?;
    if !audience.is_empty() {
        url.query_pairs_mut().append_pair("audience", audience);
    }
    Ok(url)
}

impl ProvideIdToken for ActionsIdTokenProvider {
    type Error = Error;

    async fn get_id_token(&self, audience: &str) -> Result<String, Self::Error> {
        let request_url = self
            .request_url
            .as_deref()
            .ok_or(Error::MissingRequestUrl)?;
        let request_token = self
            .request_token
            .as_deref()
            .ok_or(Error::MissingRequestToken)?;
        let url = token_request_url(request_url, audience)?;
        debug!("ID token url is {url}");

        let response = self
            .client
            .get(url)
            .bearer_auth(request_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await?;

        response
            .value
            .filter(|token| !token.is_empty())
            .ok_or(Error::MissingToken)
    }
}
