pub(crate) mod run;
pub(crate) mod start;
pub(crate) mod status;
pub(crate) mod stop;

use crate::args::LogsArgs;
use debugsk::{DebugError, OptionLayer, ServerOptions};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Resolve options for the current directory from flags, env and config.
pub(crate) fn resolve_options(flags: OptionLayer) -> anyhow::Result<ServerOptions> {
    let cwd = std::env::current_dir()?;
    Ok(ServerOptions::resolve(flags, &cwd)?)
}

/// Logs directory for commands that only inspect runtime state.
pub(crate) fn resolve_logs_dir(logs: LogsArgs) -> anyhow::Result<PathBuf> {
    Ok(resolve_options(logs.into())?.logs_dir)
}

pub(crate) fn print_json(value: &Value) {
    println!("{value}");
}

/// Render a failure as `{ok:false,error,hint?}` on stdout or a line on stderr.
pub(crate) fn report_error(err: &anyhow::Error, json: bool) {
    let debug_err = err.downcast_ref::<DebugError>();
    let code = debug_err.map_or("internal_error", DebugError::code);
    let hint = debug_err.and_then(DebugError::hint);

    if json {
        let mut body = json!({ "ok": false, "error": code, "message": format!("{err:#}") });
        if let Some(hint) = hint {
            body["hint"] = hint.into();
        }
        print_json(&body);
    } else {
        match hint {
            Some(hint) => eprintln!("error: {err:#}: {hint}"),
            None => eprintln!("error: {err:#}"),
        }
    }
}
