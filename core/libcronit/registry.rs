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

//! The set of services, keyed by name, and the operations that fan out
//! over all of them.
use crate::error::*;
use crate::service::{Service, ServiceConfig, ServiceStatus};
use crate::supervisor::{ChildState, Supervisor};
use cron::CronTime;
use nix::unistd::Pid;
use snafu::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

/// Owns every service for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Service>,
}

impl ServiceRegistry {
    ///
    pub fn new() -> Self {
        ServiceRegistry {
            services: BTreeMap::new(),
        }
    }

    /// Wrap `config` in a service and insert it under its name.
    pub fn add_service(&mut self, config: ServiceConfig) -> Result<()> {
        let name = config.name.clone();
        ensure!(
            !self.services.contains_key(&name),
            DuplicateServiceSnafu { name: &name }
        );

        let service = Service::new(config).context(InvalidServiceSnafu { name: &name })?;
        log::debug!("Added service '{}'.", name);
        self.services.insert(name, service);
        Ok(())
    }

    /// Check that every dependency exists and that the dependency graph
    /// has no cycle.
    pub fn validate(&self) -> Result<()> {
        for service in self.services.values() {
            for dependency in &service.config().depends_on {
                if !self.services.contains_key(dependency) {
                    return Err(Error::ServiceNotFound {
                        name: dependency.clone(),
                    })
                    .context(InvalidServiceSnafu {
                        name: service.name(),
                    });
                }
            }
        }

        let mut done = HashSet::new();
        for service in self.services.values() {
            let mut stack = Vec::new();
            self.check_cycle(service, &mut stack, &mut done)?;
        }
        Ok(())
    }

    fn check_cycle<'a>(
        &'a self,
        service: &'a Service,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if done.contains(service.name()) {
            return Ok(());
        }
        if stack.contains(&service.name()) {
            let mut chain = stack.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(service.name());
            return DependencyCycleSnafu { chain }.fail();
        }

        stack.push(service.name());
        for name in &service.config().depends_on {
            let dependency = self.get_service(name)?;
            self.check_cycle(dependency, stack, done)?;
        }
        stack.pop();
        done.insert(service.name());
        Ok(())
    }

    /// Look up a service by name.
    pub fn get_service(&self, name: &str) -> Result<&Service> {
        self.services
            .get(name)
            .context(ServiceNotFoundSnafu { name })
    }

    ///
    pub fn try_get_service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// The service owning the process `pid`, if any.
    pub fn try_get_service_by_pid(&self, pid: Pid) -> Option<&Service> {
        self.services.values().find(|s| s.pid() == Some(pid))
    }

    /// Iterate over the services in name order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    ///
    pub fn len(&self) -> usize {
        self.services.len()
    }

    ///
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Start every service that fires at boot. Any error is returned.
    pub fn bootstrap(&self, supervisor: &Supervisor) -> Result<()> {
        for service in self.services.values() {
            if !service.scheduler().on_boot() {
                continue;
            }
            log::debug!("Bootstrapping service '{}'.", service.name());
            service.start(self, supervisor)?;
        }
        Ok(())
    }

    /// Start each service whose schedule matches any minute in the
    /// inclusive range `[begin, end]`, once, in the order of first match.
    ///
    /// Returns the names of the services that were started.
    pub fn check_schedule(
        &self,
        supervisor: &Supervisor,
        begin: &CronTime,
        end: &CronTime,
    ) -> Result<Vec<String>> {
        let mut matched: Vec<&Service> = Vec::new();
        let mut time = *begin;

        while time <= *end {
            for service in self.services.values() {
                if matched.iter().any(|s| s.name() == service.name()) {
                    continue;
                }
                if service.scheduler().check_time(&time) {
                    log::debug!("Service '{}' is scheduled at {}.", service.name(), time);
                    matched.push(service);
                }
            }
            time.increment();
        }

        let mut started = Vec::new();
        for service in matched {
            if let Err(e) = service.start(self, supervisor) {
                if !e.is_recoverable() {
                    return Err(e);
                }
                log::error!("Scheduled start of '{}' failed: {}", service.name(), e);
                continue;
            }
            started.push(service.name().to_string());
        }
        Ok(started)
    }

    /// Services ordered so that each comes after its dependencies.
    fn start_order(&self) -> Vec<&Service> {
        fn visit<'a>(
            registry: &'a ServiceRegistry,
            service: &'a Service,
            seen: &mut HashSet<&'a str>,
            order: &mut Vec<&'a Service>,
        ) {
            if !seen.insert(service.name()) {
                return;
            }
            for name in &service.config().depends_on {
                if let Some(dependency) = registry.try_get_service(name) {
                    visit(registry, dependency, seen, order);
                }
            }
            order.push(service);
        }

        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(self.services.len());
        for service in self.services.values() {
            visit(self, service, &mut seen, &mut order);
        }
        order
    }

    /// Stop every service, dependents before their dependencies.
    ///
    /// All services are asked to terminate first and then waited for, so
    /// each of them gets whatever is left until `deadline`. Returns true when
    /// all of them are gone. Failures are logged and left to the caller's
    /// forceful stage.
    pub fn stop(&self, supervisor: &Supervisor, deadline: Instant) -> bool {
        let mut all_stopped = true;
        let mut stopping = Vec::new();
        for service in self.start_order().into_iter().rev() {
            match service.request_stop(supervisor) {
                Ok(true) => stopping.push(service),
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Failed to stop service '{}': {}", service.name(), e);
                    all_stopped = false;
                }
            }
        }

        for service in stopping {
            match service.wait_stopped(supervisor, deadline) {
                Ok(stopped) => all_stopped &= stopped,
                Err(e) => {
                    log::warn!("Failed to stop service '{}': {}", service.name(), e);
                    all_stopped = false;
                }
            }
        }
        all_stopped
    }

    /// Restart `service` if it has exited and its policy allows it.
    ///
    /// Returns whether the service ends up running. Services that never
    /// ran are left to boot or schedule.
    pub fn check_service(&self, service: &Service, supervisor: &Supervisor) -> Result<bool> {
        if service.is_running() {
            return Ok(true);
        }
        if service.status() == ServiceStatus::NotStarted || !service.can_restart() {
            return Ok(false);
        }

        log::info!(
            "Restarting service '{}' (policy {}, last exit code {}).",
            service.name(),
            service.config().restart,
            service.exit_code()
        );
        match service.start(self, supervisor) {
            Ok(()) => Ok(service.is_running()),
            Err(e) if e.is_recoverable() => {
                log::error!("Failed to restart service '{}': {}", service.name(), e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Run [`check_service`](Self::check_service) over every service.
    /// Returns true when all services are running.
    pub fn check_all_services(&self, supervisor: &Supervisor) -> Result<bool> {
        let mut all_running = true;
        for service in self.services.values() {
            all_running &= self.check_service(service, supervisor)?;
        }
        Ok(all_running)
    }

    /// Whether any service has a process.
    pub fn is_running(&self) -> bool {
        self.services.values().any(|s| s.is_running())
    }

    /// Whether any service waits for a cron schedule.
    pub fn has_schedules(&self) -> bool {
        self.services.values().any(|s| s.scheduler().has_schedules())
    }

    /// Reap every exited child. Processes of services update their state,
    /// anything else is an orphan and is collected directly. With
    /// `restart`, the restart sweep runs once afterwards.
    ///
    /// Returns true when no child process is left at all.
    pub fn reap_processes(&self, supervisor: &Supervisor, restart: bool) -> Result<bool> {
        let any = Pid::from_raw(-1);
        let mut no_children = false;

        loop {
            match supervisor.check_for_exited_process(any, None)? {
                ChildState::NoChildren => {
                    no_children = true;
                    break;
                }
                ChildState::Running => break,
                ChildState::Exited(pid) => match self.try_get_service_by_pid(pid) {
                    Some(service) => reap_service(service, supervisor, pid)?,
                    None => {
                        let outcome = supervisor.reap_zombie_process(pid)?;
                        log::debug!("Reaped orphan process {}: {:?}", pid, outcome.status);
                    }
                },
            }
        }

        if restart {
            self.check_all_services(supervisor)?;
            if self.is_running() {
                return Ok(false);
            }
        }
        Ok(no_children)
    }
}

/// Collect the exited process `pid` of `service`.
fn reap_service(service: &Service, supervisor: &Supervisor, pid: Pid) -> Result<()> {
    ensure!(
        !service.check_process_state(supervisor)?,
        InvalidProcessStateSnafu {
            name: service.name(),
            pid: pid.as_raw(),
        }
    );
    Ok(())
}
