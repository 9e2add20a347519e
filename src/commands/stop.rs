use crate::args::LogsArgs;
use debugsk::daemon::Controller;
use serde_json::json;

pub(crate) async fn cmd_stop(logs: LogsArgs, json: bool) -> anyhow::Result<()> {
    let logs_dir = super::resolve_logs_dir(logs)?;
    let outcome = Controller::new(&logs_dir)?.stop().await?;

    if json {
        super::print_json(&json!({
            "ok": true,
            "stopped": outcome.stopped,
            "running": false,
            "pid": outcome.pid,
            "logsDir": logs_dir,
        }));
        return Ok(());
    }

    let state = if outcome.stopped { "stopped" } else { "not-running" };
    match outcome.pid {
        Some(pid) => println!("stop {state} pid={pid}"),
        None => println!("stop {state}"),
    }
    Ok(())
}
