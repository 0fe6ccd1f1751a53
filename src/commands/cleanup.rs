use super::export::{self, unset_credentials};
use crate::actions::ActionsRuntime;
use tracing::info;

/// Post-job step: removes the credentials exported by the main step.
pub fn exec_cleanup<R: ActionsRuntime>(runtime: &R) -> Result<(), export::Error> {
    unset_credentials(runtime)?;
    info!("Cleared AWS credentials from the job environment");
    Ok(())
}
