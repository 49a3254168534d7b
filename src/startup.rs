//! Spawning of detached child processes.
//!
//! Used for keybound `spawn` actions and the startup program list.
//! Children are put in their own session so they survive the window
//! manager and are never reaped as its zombies (SIGCHLD is ignored at
//! startup).

use std::process::Command;

/// Spawn a command line without blocking. Tilde expansion applies to
/// the whole line; the rest is plain whitespace splitting, anything
/// fancier belongs in a shell invocation.
pub fn spawn_command(command: &str) {
    let expanded = shellexpand::tilde(command);
    let parts: Vec<&str> = expanded.split_whitespace().collect();

    let Some((program, args)) = parts.split_first() else {
        log::warn!("Refusing to spawn empty command");
        return;
    };
    let mut cmd = Command::new(program);
    cmd.args(args);

    // Detach into a new session so the child outlives the WM
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    match cmd.spawn() {
        Ok(child) => log::debug!("Spawned '{}' (pid {})", command, child.id()),
        Err(e) => log::error!("Failed to spawn '{}': {}", command, e),
    }
}

/// Run the configured startup program list once.
pub fn run_startup_programs(programs: &[String]) {
    for command in programs {
        log::info!("Startup: spawning '{}'", command);
        spawn_command(command);
    }
}

/// Leave SIGCHLD handling to the kernel so detached children never
/// accumulate as zombies of the window manager.
pub fn ignore_sigchld() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGCHLD, libc::SIG_IGN);
    }
}
