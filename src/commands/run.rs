use crate::args::ServerArgs;
use debugsk::daemon::run_foreground;
use tracing::info;

/// Serve in the foreground. This is also what `start` spawns.
pub(crate) async fn cmd_run(server: ServerArgs) -> anyhow::Result<()> {
    let options = super::resolve_options(server.into())?;
    let (runtime, reason) = run_foreground(options).await?;
    info!(pid = runtime.pid, ?reason, "Ingest server exited");
    Ok(())
}
