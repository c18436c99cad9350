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

//! Loading of the YAML configuration file.
//!
//! ```yaml
//! settings:
//!   workdir: data
//!   shutdown_timeout: 10
//! services:
//!   web: "nginx -g 'daemon off;'"
//!   worker:
//!     command: ["worker", "--queue", "a"]
//!     depends_on: web
//!     restart: on-failure
//!     schedule: ["@reboot", "*/5 * * * *"]
//! ```
//!
//! The `settings` section is layered with confique: environment first,
//! then the file, then the defaults.
use crate::error::*;
use crate::service::{RestartPolicy, ServiceConfig};
use confique::{Config, Partial};
use serde::Deserialize;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file of multi service mode.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/cronit.yaml";

/// Default service name of single service mode.
pub const DEFAULT_SERVICE_NAME: &str = "main";

/// Supervisor wide settings.
#[derive(Config, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Working directory of the supervisor and every service. A relative
    /// path in the file is relative to the directory of the file.
    #[config(env = "CRONIT_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Seconds granted to the whole shutdown sequence.
    #[config(env = "CRONIT_SHUTDOWN_TIMEOUT", default = 5)]
    pub shutdown_timeout: u64,
}

type SettingsPartial = <Settings as Config>::Partial;

impl Settings {
    /// Settings from the environment and the defaults only.
    pub fn from_env() -> Result<Self> {
        Self::layered(None)
    }

    fn layered(file: Option<SettingsPartial>) -> Result<Self> {
        let mut partial = SettingsPartial::from_env().context(ConfiqueSnafu)?;
        if let Some(file) = file {
            partial = partial.with_fallback(file);
        }
        partial = partial.with_fallback(SettingsPartial::default_values());
        Settings::from_partial(partial).context(ConfiqueSnafu)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) => vec![s],
            StringOrList::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceDefinition {
    command: StringOrList,
    #[serde(default)]
    depends_on: Option<StringOrList>,
    #[serde(default)]
    restart: Option<String>,
    #[serde(default)]
    schedule: Option<StringOrList>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceEntry {
    Command(String),
    Detailed(ServiceDefinition),
}

#[derive(Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    settings: Option<SettingsPartial>,
    #[serde(default)]
    services: Option<BTreeMap<String, ServiceEntry>>,
}

/// Word split a command line the way a POSIX shell would, without any
/// expansion.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(command).map_err(|e| Error::InvalidCommand {
        what: format!("'{}': {}", command, e),
    })?;
    ensure!(
        !argv.is_empty(),
        InvalidCommandSnafu {
            what: "empty command line"
        }
    );
    Ok(argv)
}

fn build_service(name: &str, entry: ServiceEntry) -> Result<ServiceConfig> {
    let definition = match entry {
        ServiceEntry::Command(command) => {
            return Ok(ServiceConfig::new(name, split_command(&command)?));
        }
        ServiceEntry::Detailed(definition) => definition,
    };

    let argv = match definition.command {
        StringOrList::One(command) => split_command(&command)?,
        StringOrList::Many(argv) => {
            ensure!(
                !argv.is_empty(),
                InvalidCommandSnafu {
                    what: "empty command line"
                }
            );
            argv
        }
    };

    let mut config = ServiceConfig::new(name, argv);
    if let Some(depends_on) = definition.depends_on {
        config.depends_on = depends_on.into_vec();
    }
    if let Some(restart) = definition.restart {
        config.restart = restart.parse::<RestartPolicy>()?;
    }
    if let Some(schedule) = definition.schedule {
        config.schedule = schedule.into_vec();
    }
    Ok(config)
}

/// The parsed configuration file.
#[derive(Debug)]
pub struct CronitConfig {
    ///
    pub settings: Settings,
    /// Service definitions in name order.
    pub services: Vec<ServiceConfig>,
}

impl CronitConfig {
    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading configuration from {:?}", path);
        let content = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::parse(&content, path, base)
    }

    /// Parse `content`, naming `path` in errors and resolving a relative
    /// working directory against `base`.
    pub fn parse(content: &str, path: &Path, base: &Path) -> Result<Self> {
        let document: ConfigDocument =
            serde_yaml::from_str(content).context(ParseConfigSnafu { path })?;

        let mut settings = Settings::layered(document.settings)?;
        if let Some(workdir) = settings.workdir.take() {
            settings.workdir = Some(base.join(workdir));
        }

        let entries = document.services.context(NoServicesSnafu { path })?;
        let mut services = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            let config = build_service(&name, entry).context(InvalidServiceSnafu { name: &name })?;
            services.push(config);
        }

        Ok(CronitConfig { settings, services })
    }

    /// A single boot service running `argv`, never restarted.
    pub fn single_service(name: &str, argv: Vec<String>) -> Result<Self> {
        ensure!(
            !argv.is_empty(),
            InvalidCommandSnafu {
                what: "empty command line"
            }
        );
        Ok(CronitConfig {
            settings: Settings::from_env()?,
            services: vec![ServiceConfig::new(name, argv)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn parse(content: &str) -> Result<CronitConfig> {
        CronitConfig::parse(content, Path::new("/etc/cronit.yaml"), Path::new("/etc"))
    }

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("nginx -g 'daemon off;'").unwrap(),
            vec!["nginx", "-g", "daemon off;"]
        );
        assert!(matches!(
            split_command("   "),
            Err(Error::InvalidCommand { .. })
        ));
        assert!(matches!(
            split_command("echo 'unterminated"),
            Err(Error::InvalidCommand { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_parse_services() {
        let config = parse(
            r#"
services:
  web: "nginx -g 'daemon off;'"
  worker:
    command: ["worker", "--queue", "a b"]
    depends_on: web
    restart: on-failure
    schedule: "*/5 * * * *"
  backup:
    command: backup --all
    depends_on: [web, worker]
    schedule: ["@reboot", "@daily"]
"#,
        )
        .unwrap();

        assert_eq!(config.settings.workdir, None);
        assert_eq!(config.settings.shutdown_timeout, 5);

        let names: Vec<&str> = config.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["backup", "web", "worker"]);

        let backup = &config.services[0];
        assert_eq!(backup.argv, vec!["backup", "--all"]);
        assert_eq!(backup.depends_on, vec!["web", "worker"]);
        assert_eq!(backup.restart, RestartPolicy::Never);
        assert_eq!(backup.schedule, vec!["@reboot", "@daily"]);

        let web = &config.services[1];
        assert_eq!(web.argv, vec!["nginx", "-g", "daemon off;"]);
        assert!(web.depends_on.is_empty());
        assert!(web.schedule.is_empty());

        let worker = &config.services[2];
        assert_eq!(worker.argv, vec!["worker", "--queue", "a b"]);
        assert_eq!(worker.depends_on, vec!["web"]);
        assert_eq!(worker.restart, RestartPolicy::OnFailure);
        assert_eq!(worker.schedule, vec!["*/5 * * * *"]);
    }

    #[test]
    #[serial]
    fn test_parse_settings() {
        let config = parse(
            r#"
settings:
  workdir: data
  shutdown_timeout: 12
services:
  main: sleep 10
"#,
        )
        .unwrap();
        assert_eq!(config.settings.workdir, Some(PathBuf::from("/etc/data")));
        assert_eq!(config.settings.shutdown_timeout, 12);

        let config = parse("settings:\n  workdir: /srv\nservices:\n  main: sleep 1\n").unwrap();
        assert_eq!(config.settings.workdir, Some(PathBuf::from("/srv")));
    }

    #[test]
    #[serial]
    fn test_parse_errors() {
        assert!(matches!(
            parse("services: [a, b"),
            Err(Error::ParseConfig { .. })
        ));
        assert!(matches!(
            parse("settings:\n  workdir: x\n"),
            Err(Error::NoServices { .. })
        ));

        let e = parse("services:\n  web:\n    command: run\n    restart: sometimes\n").unwrap_err();
        assert!(e.is_config());
        assert_eq!(
            e.to_string(),
            "Invalid service 'web': Invalid restart policy 'sometimes'"
        );

        assert!(matches!(
            parse("services:\n  web:\n    command: []\n"),
            Err(Error::InvalidService { .. })
        ));
        assert!(matches!(
            parse("services:\n  web: \"\"\n"),
            Err(Error::InvalidService { .. })
        ));
        /* an unknown key is rejected, not ignored */
        assert!(parse("services:\n  web:\n    command: run\n    user: nobody\n").is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        std::env::set_var("CRONIT_SHUTDOWN_TIMEOUT", "30");
        std::env::set_var("CRONIT_WORKDIR", "/var/lib/cronit");
        let config = parse("settings:\n  shutdown_timeout: 12\nservices:\n  main: sleep 1\n");
        std::env::remove_var("CRONIT_SHUTDOWN_TIMEOUT");
        std::env::remove_var("CRONIT_WORKDIR");

        let config = config.unwrap();
        assert_eq!(config.settings.shutdown_timeout, 30);
        assert_eq!(
            config.settings.workdir,
            Some(PathBuf::from("/var/lib/cronit"))
        );
    }

    #[test]
    #[serial]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cronit.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "settings:\n  workdir: run\nservices:\n  main: sleep 5").unwrap();

        let config = CronitConfig::load(&path).unwrap();
        assert_eq!(config.settings.workdir, Some(dir.path().join("run")));
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].argv, vec!["sleep", "5"]);

        assert!(matches!(
            CronitConfig::load(&dir.path().join("missing.yaml")),
            Err(Error::ReadConfig { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_single_service() {
        let config =
            CronitConfig::single_service(DEFAULT_SERVICE_NAME, vec!["sleep".into(), "1".into()])
                .unwrap();
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].name, "main");
        assert_eq!(config.settings.shutdown_timeout, 5);
        assert!(CronitConfig::single_service("main", Vec::new()).is_err());
    }
}
