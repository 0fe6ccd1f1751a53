pub mod cleanup;
pub mod configure;
pub mod export;

use crate::actions::oidc::ActionsIdTokenProvider;
use crate::actions::GithubActions;
use crate::aws_sts::client::{self, CredentialsClient};
use crate::cmd::Commands;
use crate::utils::retry::TokioSleeper;
use configure::ConfigureInputs;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] client::Error),
    #[error(transparent)]
    Configure(#[from] configure::Error),
    #[error(transparent)]
    Export(#[from] export::Error),
}

pub async fn exec_command(command: Commands) -> Result<(), Error> {
    let runtime = GithubActions::from_env();
    match command {
        Commands::Configure(args) => {
            let sts = CredentialsClient::new(args.aws_region.trim(), args.proxy_server())?;
            let id_token_provider = ActionsIdTokenProvider::from_runtime(&runtime);
            configure::exec_configure(
                &runtime,
                &sts,
                &id_token_provider,
                TokioSleeper,
                &ConfigureInputs::from(args),
            )
            .await?;
        }
        Commands::Cleanup => cleanup::exec_cleanup(&runtime)?,
    }
    Ok(())
}
