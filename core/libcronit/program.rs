// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! The supervisor program: bootstrap, the signal loop and the escalating
//! shutdown.
use crate::config::Settings;
use crate::error::*;
use crate::registry::ServiceRegistry;
use crate::supervisor::{SignalInfo, Supervisor};
use basic::signal::signal_name;
use basic::time_util::until_next_minute;
use cron::CronTime;
use nix::sys::signal::Signal;
use nix::unistd::{self, Pid};
use snafu::prelude::*;
use std::time::{Duration, Instant, SystemTime};

/// Wait granted to the final reap after processes were killed.
const KILL_RESIDUAL_WAIT: Duration = Duration::from_millis(1);

/// Why the signal loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A termination signal arrived.
    Signaled(Signal),
    /// No child is left and nothing is scheduled.
    Idle,
}

/// How the shutdown completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every process ended after the termination request.
    Graceful,
    /// Processes had to be killed.
    Forced,
}

impl ShutdownOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownOutcome::Graceful => 0,
            ShutdownOutcome::Forced => 1,
        }
    }
}

/// Fail unless the current process is the init process of its pid
/// namespace.
pub fn ensure_init_process() -> Result<()> {
    let pid = unistd::getpid();
    ensure!(pid.as_raw() == 1, NotInitSnafu { pid: pid.as_raw() });
    Ok(())
}

fn log_signal(info: &SignalInfo) {
    log::debug!(
        "Signal received: {} (from pid {}).",
        signal_name(info.signo),
        info.pid
    );
}

/// Drives the registry with the supervisor through the whole lifetime of
/// the process.
pub struct SupervisorProgram {
    registry: ServiceRegistry,
    settings: Settings,
    kill_target: Pid,
}

impl SupervisorProgram {
    /// The forceful shutdown signals every process (`kill(-1, ...)`).
    pub fn new(registry: ServiceRegistry, settings: Settings) -> Self {
        SupervisorProgram {
            registry,
            settings,
            kill_target: Pid::from_raw(-1),
        }
    }

    /// Limit the forceful shutdown to `target` (kill(2) semantics).
    pub fn with_kill_target(mut self, target: Pid) -> Self {
        self.kill_target = target;
        self
    }

    ///
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Bootstrap, loop until told to stop, then shut down.
    pub fn run(&self, supervisor: &Supervisor) -> Result<ShutdownOutcome> {
        log::info!("Starting (pid {}).", unistd::getpid());
        self.bootstrap(supervisor)?;

        match self.main_loop(supervisor)? {
            LoopExit::Signaled(sig) => log::info!("Terminating on {:?}.", sig),
            LoopExit::Idle => log::info!("Nothing left to supervise."),
        }

        let outcome = self.shutdown(supervisor)?;
        log::info!("Exiting ({:?} shutdown).", outcome);
        Ok(outcome)
    }

    /// Enter the working directory and start the boot services.
    pub fn bootstrap(&self, supervisor: &Supervisor) -> Result<()> {
        if let Some(workdir) = &self.settings.workdir {
            log::debug!("Changing working directory to {:?}", workdir);
            unistd::chdir(workdir.as_path()).context(NixSnafu)?;
        }

        self.registry.validate()?;
        self.registry.bootstrap(supervisor)
    }

    /// Wait for signals until a termination signal arrives or nothing is
    /// left to supervise. Cron schedules are checked at every minute.
    pub fn main_loop(&self, supervisor: &Supervisor) -> Result<LoopExit> {
        let scheduled = self.registry.has_schedules();
        let mut last_check = CronTime::now();

        loop {
            if scheduled {
                last_check = self.check_schedule(supervisor, last_check)?;
            }

            let deadline = if scheduled {
                Some(Instant::now() + until_next_minute(SystemTime::now()))
            } else {
                None
            };

            let info = match supervisor.wait_signal(deadline)? {
                Some(info) => info,
                None => continue,
            };
            log_signal(&info);

            match info.signal() {
                Some(
                    sig @ (Signal::SIGHUP | Signal::SIGINT | Signal::SIGQUIT | Signal::SIGTERM),
                ) => return Ok(LoopExit::Signaled(sig)),
                Some(Signal::SIGCHLD) => {
                    if self.registry.reap_processes(supervisor, true)? && !scheduled {
                        return Ok(LoopExit::Idle);
                    }
                }
                _ => log::debug!("Ignoring signal {}.", signal_name(info.signo)),
            }
        }
    }

    /// Start the services scheduled in the minutes after `last` up to now.
    /// Returns the last minute checked.
    fn check_schedule(&self, supervisor: &Supervisor, last: CronTime) -> Result<CronTime> {
        let now = CronTime::now();
        if now <= last {
            return Ok(last);
        }

        let mut begin = last;
        begin.increment();
        let started = self.registry.check_schedule(supervisor, &begin, &now)?;
        if !started.is_empty() {
            log::info!("Scheduled services started at {}: {:?}", now, started);
        }
        Ok(now)
    }

    /// Stop everything within the configured budget: stop the services,
    /// then terminate and finally kill whatever is left, then reap.
    pub fn shutdown(&self, supervisor: &Supervisor) -> Result<ShutdownOutcome> {
        let deadline = Instant::now() + Duration::from_secs(self.settings.shutdown_timeout);

        let graceful = self.stop_all_services(supervisor, deadline)?;
        let killed = self.kill_all_processes(supervisor, deadline)?;

        let outcome = supervisor.reap_zombie_process(Pid::from_raw(-1))?;
        if let Some(status) = outcome.status {
            log::debug!("Collected remaining process: {:?}", status);
        }

        if graceful && !killed {
            Ok(ShutdownOutcome::Graceful)
        } else {
            Ok(ShutdownOutcome::Forced)
        }
    }

    fn stop_all_services(&self, supervisor: &Supervisor, deadline: Instant) -> Result<bool> {
        log::debug!("Stopping all services.");
        if self.registry.stop(supervisor, deadline) {
            return Ok(true);
        }

        log::debug!("Waiting for services to stop.");
        while self.registry.is_running() {
            let info = match supervisor.wait_signal(Some(deadline))? {
                Some(info) => info,
                None => {
                    log::warn!("Timed out stopping services.");
                    return Ok(false);
                }
            };
            log_signal(&info);
            if info.signal() == Some(Signal::SIGCHLD) {
                self.registry.reap_processes(supervisor, false)?;
            }
        }
        Ok(true)
    }

    /// Returns whether anything had to be killed.
    fn kill_all_processes(&self, supervisor: &Supervisor, deadline: Instant) -> Result<bool> {
        log::debug!("Terminating remaining processes.");
        if !supervisor.send_signal(self.kill_target, Signal::SIGTERM)? {
            log::debug!("No process left to terminate.");
            return Ok(false);
        }

        let mut deadline = deadline;
        let mut killed = false;
        loop {
            match supervisor.wait_signal(Some(deadline))? {
                None => {
                    log::warn!("Killing remaining processes.");
                    if !supervisor.send_signal(self.kill_target, Signal::SIGKILL)? {
                        log::debug!("No process left to kill.");
                        return Ok(killed);
                    }
                    killed = true;
                    if self.registry.reap_processes(supervisor, false)? {
                        return Ok(killed);
                    }
                    deadline = Instant::now() + KILL_RESIDUAL_WAIT;
                }
                Some(info) if info.signal() == Some(Signal::SIGCHLD) => {
                    log_signal(&info);
                    if self.registry.reap_processes(supervisor, false)? {
                        return Ok(killed);
                    }
                }
                Some(info) => log_signal(&info),
            }
        }
    }
}
