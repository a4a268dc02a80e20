use std::{env, path::Path, process::Stdio};

use anyhow::{anyhow, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use super::daemon_path::to_daemon_path;

/// Terminates every running daemon started from the executable next to the current one.
pub fn kill_previous_servers() -> Result<()> {
    let daemon = to_daemon_path(env::current_exe()?);
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't find own pid {e}"))?;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| daemon == *v)
            .is_some()
        {
            info!("Stopping daemon {pid}");
            // This will forcefully terminate the process on Windows.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
        }
    }
    Ok(())
}

/// Shuts down a previous daemon and starts a new one for `dir`.
pub fn restart_server(dir: &Path) -> Result<()> {
    kill_previous_servers()?;
    let daemon = to_daemon_path(env::current_exe()?);
    let mut command = std::process::Command::new(daemon);
    command.arg("--dir").arg(dir);
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());

    println!("Spawning");
    let status = command.status()?;
    if !status.success() {
        return Err(anyhow!("Daemon exited with {status}"));
    }
    println!("Success");
    Ok(())
}
