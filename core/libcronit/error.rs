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

//! Error define of the supervisor.
//!
//! Configuration errors are fatal at startup and never retried. System
//! errors come from the OS interfaces the supervisor drives. "No such
//! process" and "no child" are not errors here: the supervisor reports them
//! as values.
pub use nix::errno::Errno;
use snafu::prelude::*;
#[allow(unused_imports)]
pub use snafu::ResultExt;
use std::path::PathBuf;

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Failed to read config file '{}': {}", path.display(), source))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse config file '{}': {}", path.display(), source))]
    ParseConfig {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("No services defined in '{}'", path.display()))]
    NoServices { path: PathBuf },

    #[snafu(display("Confique error: {}", source))]
    Confique { source: confique::Error },

    #[snafu(display("Invalid service '{}': {}", name, source))]
    InvalidService {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Invalid command: {}", what))]
    InvalidCommand { what: String },

    #[snafu(display("Invalid restart policy '{}'", value))]
    InvalidRestart { value: String },

    #[snafu(display("Invalid schedule: {}", source))]
    InvalidSchedule { source: cron::Error },

    #[snafu(display("Duplicate service name '{}'", name))]
    DuplicateService { name: String },

    #[snafu(display("Service '{}' not found", name))]
    ServiceNotFound { name: String },

    #[snafu(display("Circular dependency detected: {}", chain))]
    DependencyCycle { chain: String },

    #[snafu(display(
        "Service '{}' cannot start: dependency '{}' is {} and cannot restart",
        service,
        dependency,
        status
    ))]
    DependencyBlocked {
        service: String,
        dependency: String,
        status: String,
    },

    #[snafu(display("Must run as the init process (pid 1), current pid is {}", pid))]
    NotInit { pid: i32 },

    #[snafu(display("A supervisor instance already exists"))]
    AlreadyInitialized,

    #[snafu(display("Failed to spawn '{}': {}", command, source))]
    Spawn { command: String, source: nix::Error },

    #[snafu(display("Invalid process state of service '{}': pid {} exited but is still owned", name, pid))]
    InvalidProcessState { name: String, pid: i32 },

    #[snafu(display("UtilError: {}", source))]
    Util { source: basic::error::Error },

    #[snafu(display("NixError: {}", source))]
    Nix { source: nix::Error },
}

impl Error {
    /// Whether this error comes from the configuration rather than the OS.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::ReadConfig { .. }
                | Error::ParseConfig { .. }
                | Error::NoServices { .. }
                | Error::Confique { .. }
                | Error::InvalidService { .. }
                | Error::InvalidCommand { .. }
                | Error::InvalidRestart { .. }
                | Error::InvalidSchedule { .. }
                | Error::DuplicateService { .. }
                | Error::ServiceNotFound { .. }
                | Error::DependencyCycle { .. }
                | Error::DependencyBlocked { .. }
        )
    }

    /// Errors that leave the supervisor consistent, so the running loop
    /// logs them and retries on a later cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Spawn { .. } | Error::DependencyBlocked { .. })
    }
}

///
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let e = Error::DependencyCycle {
            chain: "a -> b -> a".to_string(),
        };
        assert!(e.is_config());
        assert!(!e.is_recoverable());
        assert_eq!(e.to_string(), "Circular dependency detected: a -> b -> a");

        let e = Error::Spawn {
            command: "sleep".to_string(),
            source: Errno::EAGAIN,
        };
        assert!(!e.is_config());
        assert!(e.is_recoverable());

        let e = Error::Nix {
            source: Errno::EPERM,
        };
        assert!(!e.is_config());
        assert!(!e.is_recoverable());

        let e = Error::InvalidService {
            name: "web".to_string(),
            source: Box::new(Error::InvalidRestart {
                value: "sometimes".to_string(),
            }),
        };
        assert!(e.is_config());
        assert_eq!(
            e.to_string(),
            "Invalid service 'web': Invalid restart policy 'sometimes'"
        );
    }
}
