use crate::args::LogsArgs;
use debugsk::daemon::Controller;
use serde_json::json;

pub(crate) fn cmd_status(logs: LogsArgs, json: bool) -> anyhow::Result<()> {
    let logs_dir = super::resolve_logs_dir(logs)?;
    let report = Controller::new(&logs_dir)?.status()?;

    if json {
        super::print_json(&json!({
            "ok": true,
            "running": report.running,
            "logsDir": logs_dir,
            "runtime": report.runtime,
        }));
        return Ok(());
    }

    let state = if report.running { "running" } else { "stopped" };
    match &report.runtime {
        Some(runtime) => println!(
            "status {state} pid={} baseUrl={}",
            runtime.pid, runtime.server.base_url
        ),
        None => println!("status {state} logsDir={}", logs_dir.display()),
    }
    Ok(())
}
