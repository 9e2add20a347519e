use crate::args::ServerArgs;
use debugsk::daemon::Controller;
use serde_json::json;

pub(crate) async fn cmd_start(server: ServerArgs, force: bool, json: bool) -> anyhow::Result<()> {
    let options = super::resolve_options(server.into())?;
    let controller = Controller::new(&options.logs_dir)?;
    let outcome = controller.start(&options, force).await?;
    let runtime = &outcome.runtime;

    if json {
        super::print_json(&json!({
            "ok": true,
            "version": runtime.version,
            "pid": runtime.pid,
            "cwd": runtime.cwd,
            "logsDir": runtime.logs_dir,
            "server": runtime.server,
            "options": runtime.options,
            "existing": outcome.existing,
            "spawnedPid": outcome.spawned_pid,
            "snippets": { "jsFetch": outcome.js_fetch_snippet() },
        }));
    } else {
        let verb = if outcome.existing { "running" } else { "started" };
        println!(
            "{verb} pid={} baseUrl={} logsDir={}",
            runtime.pid,
            runtime.server.base_url,
            runtime.logs_dir.display()
        );
        println!("{}", outcome.js_fetch_snippet());
    }
    Ok(())
}
