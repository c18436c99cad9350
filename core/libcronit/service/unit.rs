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

//! A managed service and its execution state.
use super::config::{RestartPolicy, ServiceConfig};
use super::scheduler::ServiceScheduler;
use crate::error::*;
use crate::registry::ServiceRegistry;
use crate::supervisor::Supervisor;
use basic::process::{exit_code, EXIT_CODE_SIGNALED};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::cell::RefCell;
use std::fmt;
use std::time::Instant;

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    ///
    NotStarted,
    ///
    Running,
    /// Exited after a stop request.
    Stopped,
    /// Exited or reaped without a stop request.
    Broken,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::NotStarted => "not-started",
            ServiceStatus::Running => "running",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Broken => "broken",
        };
        write!(f, "{}", s)
    }
}

struct ServiceState {
    status: ServiceStatus,
    pid: Option<Pid>,
    exit_code: i32,
    stop_requested: bool,
}

/// One managed service.
pub struct Service {
    config: ServiceConfig,
    scheduler: ServiceScheduler,
    state: RefCell<ServiceState>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.config.name)
            .field("status", &self.status())
            .field("pid", &self.pid())
            .finish()
    }
}

impl Service {
    /// Create a not started service, parsing its schedule.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        if config.argv.is_empty() {
            return InvalidCommandSnafu {
                what: "empty command line".to_string(),
            }
            .fail();
        }
        let scheduler = ServiceScheduler::new(&config.schedule).context(InvalidScheduleSnafu)?;

        Ok(Service {
            config,
            scheduler,
            state: RefCell::new(ServiceState {
                status: ServiceStatus::NotStarted,
                pid: None,
                exit_code: 0,
                stop_requested: false,
            }),
        })
    }

    ///
    pub fn name(&self) -> &str {
        &self.config.name
    }

    ///
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    ///
    pub fn scheduler(&self) -> &ServiceScheduler {
        &self.scheduler
    }

    ///
    pub fn status(&self) -> ServiceStatus {
        self.state.borrow().status
    }

    /// The process of the service, if one is running.
    pub fn pid(&self) -> Option<Pid> {
        self.state.borrow().pid
    }

    /// Exit code of the last process, -1 when it was killed by a signal.
    pub fn exit_code(&self) -> i32 {
        self.state.borrow().exit_code
    }

    ///
    pub fn is_running(&self) -> bool {
        self.pid().is_some()
    }

    /// Whether the restart policy allows starting the service again.
    pub fn can_restart(&self) -> bool {
        if self.is_running() {
            return false;
        }

        let state = self.state.borrow();
        match self.config.restart {
            RestartPolicy::Never => false,
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => state.exit_code != 0,
            RestartPolicy::UnlessStopped => state.status != ServiceStatus::Stopped,
        }
    }

    /// Start the dependencies, then the service itself.
    ///
    /// The whole start order is resolved before anything is spawned, so a
    /// dependency cycle or a dependency that may not restart spawns nothing.
    pub fn start(&self, registry: &ServiceRegistry, supervisor: &Supervisor) -> Result<()> {
        let mut stack = Vec::new();
        let mut plan = Vec::new();
        self.plan_start(registry, &mut stack, &mut plan)?;

        for service in plan {
            service.spawn(supervisor)?;
        }
        Ok(())
    }

    fn plan_start<'a>(
        &'a self,
        registry: &'a ServiceRegistry,
        stack: &mut Vec<&'a str>,
        plan: &mut Vec<&'a Service>,
    ) -> Result<()> {
        if stack.contains(&self.name()) {
            let mut chain = stack.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(self.name());
            return DependencyCycleSnafu { chain }.fail();
        }
        stack.push(self.name());

        for name in &self.config.depends_on {
            let dependency = registry.get_service(name)?;
            match dependency.status() {
                _ if dependency.is_running() => continue,
                ServiceStatus::Stopped | ServiceStatus::Broken if !dependency.can_restart() => {
                    return DependencyBlockedSnafu {
                        service: self.name(),
                        dependency: dependency.name(),
                        status: dependency.status().to_string(),
                    }
                    .fail();
                }
                _ => dependency.plan_start(registry, stack, plan)?,
            }
        }

        stack.pop();
        if !plan.iter().any(|s| s.name() == self.name()) {
            plan.push(self);
        }
        Ok(())
    }

    fn spawn(&self, supervisor: &Supervisor) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(pid) = state.pid {
            log::info!("Service '{}' is already running (pid {}).", self.name(), pid);
            return Ok(());
        }

        match supervisor.spawn(&self.config.argv) {
            Ok(pid) => {
                state.pid = Some(pid);
                state.status = ServiceStatus::Running;
                state.stop_requested = false;
                log::info!(
                    "Service '{}' started (pid {}): {}",
                    self.name(),
                    pid,
                    self.config.command_line()
                );
                Ok(())
            }
            Err(e) => {
                state.status = ServiceStatus::Broken;
                log::error!("Failed to start service '{}': {}", self.name(), e);
                Err(e)
            }
        }
    }

    /// Ask the process to terminate and wait for it until `deadline`.
    ///
    /// Returns true when no process is left.
    pub fn stop(&self, supervisor: &Supervisor, deadline: Instant) -> Result<bool> {
        if !self.request_stop(supervisor)? {
            return Ok(true);
        }
        self.wait_stopped(supervisor, deadline)
    }

    /// Mark a stop request and send SIGTERM to the process.
    ///
    /// A process that already exited is reaped first and keeps the status of
    /// an unrequested exit. Returns whether a process was signalled.
    pub fn request_stop(&self, supervisor: &Supervisor) -> Result<bool> {
        if !self.check_process_state(supervisor)? {
            return Ok(false);
        }
        let pid = match self.pid() {
            Some(pid) => pid,
            None => return Ok(false),
        };

        log::info!("Stopping service '{}' (pid {}).", self.name(), pid);
        self.state.borrow_mut().stop_requested = true;
        if !supervisor.send_signal(pid, Signal::SIGTERM)? {
            log::debug!("Process {} of service '{}' is already gone.", pid, self.name());
        }
        Ok(true)
    }

    /// Wait for a process asked to stop until `deadline`.
    ///
    /// Returns true when no process is left.
    pub fn wait_stopped(&self, supervisor: &Supervisor, deadline: Instant) -> Result<bool> {
        let pid = match self.pid() {
            Some(pid) => pid,
            None => return Ok(true),
        };

        supervisor.check_for_exited_process(pid, Some(deadline))?;
        if self.check_process_state(supervisor)? {
            log::warn!("Service '{}' (pid {}) did not stop in time.", self.name(), pid);
            /* a later kill is not a stop the service agreed to */
            self.state.borrow_mut().stop_requested = false;
            return Ok(false);
        }
        Ok(true)
    }

    /// Reap the process of the service if it terminated.
    ///
    /// Returns whether the process is still running. This is the only
    /// place a service leaves the running state.
    pub fn check_process_state(&self, supervisor: &Supervisor) -> Result<bool> {
        let pid = match self.pid() {
            Some(pid) => pid,
            None => return Ok(false),
        };

        let outcome = supervisor.reap_zombie_process(pid)?;
        if !outcome.reaped {
            return Ok(true);
        }

        let code = match outcome.status.as_ref().and_then(exit_code) {
            Some(code) => code,
            None => {
                log::warn!(
                    "Exit status of service '{}' (pid {}) was lost.",
                    self.name(),
                    pid
                );
                EXIT_CODE_SIGNALED
            }
        };

        let mut state = self.state.borrow_mut();
        state.pid = None;
        state.exit_code = code;
        state.status = if state.stop_requested {
            ServiceStatus::Stopped
        } else {
            ServiceStatus::Broken
        };
        state.stop_requested = false;

        log::info!(
            "Service '{}' (pid {}) exited with code {}, now {}.",
            self.name(),
            pid,
            code,
            state.status
        );
        Ok(false)
    }

    #[cfg(test)]
    pub(crate) fn set_exit(&self, status: ServiceStatus, exit_code: i32) {
        let mut state = self.state.borrow_mut();
        state.pid = None;
        state.status = status;
        state.exit_code = exit_code;
    }

    #[cfg(test)]
    pub(crate) fn set_running(&self, pid: Pid) {
        let mut state = self.state.borrow_mut();
        state.pid = Some(pid);
        state.status = ServiceStatus::Running;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::config::ServiceConfig;
    use serial_test::serial;
    use std::time::Duration;

    fn config(name: &str, args: &[&str]) -> ServiceConfig {
        ServiceConfig::new(name, args.iter().map(|s| s.to_string()).collect())
    }

    fn wait_exit(service: &Service, supervisor: &Supervisor) {
        let pid = service.pid().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        supervisor
            .check_for_exited_process(pid, Some(deadline))
            .unwrap();
        assert!(!service.check_process_state(supervisor).unwrap());
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(matches!(
            Service::new(config("a", &[])),
            Err(Error::InvalidCommand { .. })
        ));
        assert!(matches!(
            Service::new(config("a", &["true"]).with_schedule(&["* * *"])),
            Err(Error::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_initial_state() {
        let service = Service::new(config("a", &["true"])).unwrap();
        assert_eq!(service.status(), ServiceStatus::NotStarted);
        assert_eq!(service.pid(), None);
        assert_eq!(service.exit_code(), 0);
        assert!(!service.is_running());
        assert!(service.scheduler().on_boot());
    }

    #[test]
    fn test_can_restart_truth_table() {
        use RestartPolicy::*;
        use ServiceStatus::*;

        /* (policy, status, exit code, expected) */
        let table = [
            (Never, Stopped, 0, false),
            (Never, Broken, 1, false),
            (Always, Stopped, 0, true),
            (Always, Broken, 0, true),
            (Always, Broken, 1, true),
            (OnFailure, Stopped, 0, false),
            (OnFailure, Broken, 0, false),
            (OnFailure, Stopped, 1, true),
            (OnFailure, Broken, -1, true),
            (UnlessStopped, Stopped, 0, false),
            (UnlessStopped, Stopped, 1, false),
            (UnlessStopped, Broken, 0, true),
            (UnlessStopped, Broken, 1, true),
        ];

        for (policy, status, code, expected) in table {
            let service = Service::new(config("a", &["true"]).with_restart(policy)).unwrap();
            service.set_exit(status, code);
            assert_eq!(
                service.can_restart(),
                expected,
                "{:?} {:?} {}",
                policy,
                status,
                code
            );

            service.set_running(Pid::from_raw(1));
            assert!(!service.can_restart(), "{:?} while running", policy);
        }
    }

    #[test]
    #[serial]
    fn test_start_and_exit_code() {
        let supervisor = Supervisor::new().unwrap();
        let registry = ServiceRegistry::new();
        let service = Service::new(config("a", &["sh", "-c", "exit 7"])).unwrap();

        service.start(&registry, &supervisor).unwrap();
        assert_eq!(service.status(), ServiceStatus::Running);
        assert!(service.is_running());

        wait_exit(&service, &supervisor);
        assert_eq!(service.status(), ServiceStatus::Broken);
        assert_eq!(service.exit_code(), 7);
        assert_eq!(service.pid(), None);
        assert!(!service.check_process_state(&supervisor).unwrap());
    }

    #[test]
    #[serial]
    fn test_start_when_running_is_noop() {
        let supervisor = Supervisor::new().unwrap();
        let registry = ServiceRegistry::new();
        let service = Service::new(config("a", &["sleep", "30"])).unwrap();

        service.start(&registry, &supervisor).unwrap();
        let pid = service.pid();
        service.start(&registry, &supervisor).unwrap();
        assert_eq!(service.pid(), pid);

        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(service.stop(&supervisor, deadline).unwrap());
        assert_eq!(service.status(), ServiceStatus::Stopped);
        assert_eq!(service.exit_code(), EXIT_CODE_SIGNALED);
    }

    #[test]
    #[serial]
    fn test_stop_not_running() {
        let supervisor = Supervisor::new().unwrap();
        let service = Service::new(config("a", &["true"])).unwrap();
        assert!(service
            .stop(&supervisor, Instant::now() + Duration::from_secs(1))
            .unwrap());
        assert_eq!(service.status(), ServiceStatus::NotStarted);
    }

    #[test]
    #[serial]
    fn test_stop_ignoring_term_times_out() {
        let supervisor = Supervisor::new().unwrap();
        let registry = ServiceRegistry::new();
        let service = Service::new(config(
            "stubborn",
            &["sh", "-c", "trap '' TERM; while true; do sleep 1; done"],
        ))
        .unwrap();

        service.start(&registry, &supervisor).unwrap();
        /* let the shell install its trap */
        std::thread::sleep(Duration::from_millis(300));

        let deadline = Instant::now() + Duration::from_millis(300);
        assert!(!service.stop(&supervisor, deadline).unwrap());
        assert!(service.is_running());

        let pid = service.pid().unwrap();
        supervisor.send_signal(pid, Signal::SIGKILL).unwrap();
        wait_exit(&service, &supervisor);
        assert_eq!(service.status(), ServiceStatus::Broken);
        assert_eq!(service.exit_code(), EXIT_CODE_SIGNALED);
    }

    #[test]
    #[serial]
    fn test_stop_after_crash_stays_broken() {
        let supervisor = Supervisor::new().unwrap();
        let registry = ServiceRegistry::new();
        let service = Service::new(config("crash", &["sh", "-c", "exit 3"])).unwrap();

        service.start(&registry, &supervisor).unwrap();
        let pid = service.pid().unwrap();
        /* exited but not reaped yet */
        let deadline = Instant::now() + Duration::from_secs(5);
        supervisor
            .check_for_exited_process(pid, Some(deadline))
            .unwrap();
        assert!(service.is_running());

        assert!(!service.request_stop(&supervisor).unwrap());
        assert_eq!(service.status(), ServiceStatus::Broken);
        assert_eq!(service.exit_code(), 3);
        assert!(service.stop(&supervisor, Instant::now()).unwrap());
        assert_eq!(service.status(), ServiceStatus::Broken);
    }
}
