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

//! cronit init process
use clap::Parser;
use cronit::config::{CronitConfig, DEFAULT_CONFIG_FILE, DEFAULT_SERVICE_NAME};
use cronit::error::*;
use cronit::program::{ensure_init_process, ShutdownOutcome, SupervisorProgram};
use cronit::{ServiceRegistry, Supervisor};
use log::{LevelFilter, LogTarget};
use std::path::PathBuf;
use std::process::exit;

/// Exit code when the supervisor cannot run at all.
const EXIT_FATAL: i32 = 3;

/// Init process for containers: supervises services, restarts them,
/// runs them on cron schedules and reaps zombies.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
#[clap(setting(clap::AppSettings::TrailingVarArg))]
struct Args {
    /// Run the services of a configuration file.
    #[clap(
        short,
        long,
        value_name = "FILE",
        require_equals = true,
        conflicts_with = "command"
    )]
    config: Option<Option<PathBuf>>,

    /// Name of the service in single service mode.
    #[clap(short, long, default_value = DEFAULT_SERVICE_NAME)]
    name: String,

    /// Log level: error, warn, info, debug or trace.
    #[clap(short, long, default_value = "info")]
    log: LevelFilter,

    /// Log target: console, syslog or null.
    #[clap(short = 'L', long, default_value = "console")]
    logger: LogTarget,

    /// Seconds granted to the shutdown sequence.
    #[clap(long, value_name = "SECS")]
    shutdown_timeout: Option<u64>,

    /// Command of the single service. Options end at the first non-option
    /// or at `--`.
    #[clap(value_name = "CMD", multiple_values = true)]
    command: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    File(PathBuf),
    Single { name: String, argv: Vec<String> },
}

impl Args {
    fn mode(&self) -> Mode {
        if !self.command.is_empty() {
            return Mode::Single {
                name: self.name.clone(),
                argv: self.command.clone(),
            };
        }

        let path = self
            .config
            .clone()
            .flatten()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Mode::File(path)
    }
}

fn run(args: &Args) -> Result<ShutdownOutcome> {
    ensure_init_process()?;

    let config = match args.mode() {
        Mode::File(path) => CronitConfig::load(&path)?,
        Mode::Single { name, argv } => CronitConfig::single_service(&name, argv)?,
    };

    let mut settings = config.settings;
    if let Some(timeout) = args.shutdown_timeout {
        settings.shutdown_timeout = timeout;
    }

    let mut registry = ServiceRegistry::new();
    for service in config.services {
        registry.add_service(service)?;
    }

    let supervisor = Supervisor::new()?;
    SupervisorProgram::new(registry, settings).run(&supervisor)
}

fn main() {
    let args = Args::parse();
    log::init_log("cronit", args.log, &[args.logger]);

    let code = match run(&args) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) if e.is_config() => {
            log::error!("Invalid configuration: {}", e);
            EXIT_FATAL
        }
        Err(e) => {
            log::error!("{}", e);
            EXIT_FATAL
        }
    };
    exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("cronit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_mode() {
        let args = parse(&[]);
        assert_eq!(args.mode(), Mode::File(PathBuf::from(DEFAULT_CONFIG_FILE)));
        assert_eq!(args.log, LevelFilter::Info);
        assert_eq!(args.logger, LogTarget::Console);
        assert_eq!(args.shutdown_timeout, None);
    }

    #[test]
    fn test_config_mode() {
        assert_eq!(
            parse(&["-c"]).mode(),
            Mode::File(PathBuf::from(DEFAULT_CONFIG_FILE))
        );
        assert_eq!(
            parse(&["--config=/srv/cronit.yaml", "-l", "debug"]).mode(),
            Mode::File(PathBuf::from("/srv/cronit.yaml"))
        );
    }

    #[test]
    fn test_single_mode() {
        let args = parse(&["-n", "web", "-L", "null", "--", "nginx", "-g", "daemon off;"]);
        assert_eq!(
            args.mode(),
            Mode::Single {
                name: "web".to_string(),
                argv: vec!["nginx".into(), "-g".into(), "daemon off;".into()],
            }
        );
        assert_eq!(args.logger, LogTarget::Null);

        let args = parse(&["--shutdown-timeout", "9", "sleep", "10"]);
        assert_eq!(args.shutdown_timeout, Some(9));
        assert_eq!(
            args.mode(),
            Mode::Single {
                name: DEFAULT_SERVICE_NAME.to_string(),
                argv: vec!["sleep".into(), "10".into()],
            }
        );
    }

    #[test]
    fn test_options_before_command() {
        let args = parse(&["-l", "debug", "sleep", "1"]);
        assert_eq!(args.log, LevelFilter::Debug);
        assert_eq!(
            args.mode(),
            Mode::Single {
                name: DEFAULT_SERVICE_NAME.to_string(),
                argv: vec!["sleep".into(), "1".into()],
            }
        );

        let args = parse(&["-l", "debug", "--config=/x.yaml"]);
        assert_eq!(args.log, LevelFilter::Debug);
        assert_eq!(args.mode(), Mode::File(PathBuf::from("/x.yaml")));

        /* everything after the command belongs to it */
        let args = parse(&["-n", "web", "nginx", "-l", "x"]);
        assert_eq!(args.log, LevelFilter::Info);
        assert_eq!(
            args.mode(),
            Mode::Single {
                name: "web".to_string(),
                argv: vec!["nginx".into(), "-l".into(), "x".into()],
            }
        );
    }

    #[test]
    fn test_usage_errors() {
        let parse_err = |args: &[&str]| {
            Args::try_parse_from(std::iter::once("cronit").chain(args.iter().copied())).is_err()
        };
        assert!(parse_err(&["--config=/a.yaml", "sleep", "1"]));
        assert!(parse_err(&["--logger", "file"]));
        assert!(parse_err(&["--log", "loud"]));
    }
}
