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

//! Static description of a service.
use crate::error::*;
use std::{fmt, str::FromStr};

/// Decides whether a stopped or crashed service is started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    /// `no`
    #[default]
    Never,
    /// `always`
    Always,
    /// `on-failure`: only after a non zero exit code.
    OnFailure,
    /// `unless-stopped`: unless the last exit followed a stop request.
    UnlessStopped,
}

impl FromStr for RestartPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" => Ok(RestartPolicy::Never),
            "always" => Ok(RestartPolicy::Always),
            "on-failure" => Ok(RestartPolicy::OnFailure),
            "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
            _ => InvalidRestartSnafu { value: s }.fail(),
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestartPolicy::Never => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        };
        write!(f, "{}", s)
    }
}

/// Name, command line, dependencies, restart policy and schedule of one
/// service. Immutable once the service is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Unique key in the registry.
    pub name: String,
    /// Program and arguments, never empty.
    pub argv: Vec<String>,
    /// Services started before this one.
    pub depends_on: Vec<String>,
    ///
    pub restart: RestartPolicy,
    /// Cron expressions. Empty means started at boot.
    pub schedule: Vec<String>,
}

impl ServiceConfig {
    /// A boot service with no dependencies that is never restarted.
    pub fn new(name: &str, argv: Vec<String>) -> Self {
        ServiceConfig {
            name: name.to_string(),
            argv,
            depends_on: Vec::new(),
            restart: RestartPolicy::Never,
            schedule: Vec::new(),
        }
    }

    ///
    pub fn with_depends_on(mut self, depends_on: &[&str]) -> Self {
        self.depends_on = depends_on.iter().map(|s| s.to_string()).collect();
        self
    }

    ///
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    ///
    pub fn with_schedule(mut self, schedule: &[&str]) -> Self {
        self.schedule = schedule.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Command line as a single string, for logging.
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}
