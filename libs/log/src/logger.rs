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

//! Log sinks behind the `log` facade.
use log::{Level, LevelFilter, Log};
use std::{
    fmt,
    io::Write,
    os::unix::net::UnixDatagram,
    str::FromStr,
    sync::Mutex,
};

/// Syslog facility used for every record (LOG_DAEMON).
const SYSLOG_FACILITY: u8 = 3;

/// Where log records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Timestamped lines on stderr.
    Console,
    /// Datagrams sent to `/dev/log`.
    Syslog,
    /// Discard everything.
    Null,
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console" | "terminal" | "output" => Ok(LogTarget::Console),
            "syslog" => Ok(LogTarget::Syslog),
            "null" => Ok(LogTarget::Null),
            _ => Err(format!("invalid log target '{}'", s)),
        }
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogTarget::Console => "console",
            LogTarget::Syslog => "syslog",
            LogTarget::Null => "null",
        };
        write!(f, "{}", s)
    }
}

fn local_time_prefix() -> String {
    let time: libc::time_t = unsafe { libc::time(std::ptr::null_mut()) };
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    if unsafe { libc::localtime_r(&time, &mut tm) }.is_null() {
        return String::new();
    }
    format!(
        "{:0>4}-{:0>2}-{:0>2} {:0>2}:{:0>2}:{:0>2}",
        tm.tm_year + 1900, /* tm_year is years since 1900 */
        tm.tm_mon + 1,     /* tm_mon is months since Jan: [0, 11] */
        tm.tm_mday,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec
    )
}

fn write_msg_common(writer: &mut impl Write, level: Level, module: &str, msg: &str) {
    let line = format!(
        "{} {:<5} {} {}\n",
        local_time_prefix(),
        level,
        module,
        msg
    );
    /* Nowhere left to report a failing stderr. */
    let _ = writer.write_all(line.as_bytes());
}

fn syslog_severity(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

struct SysLogger {
    ident: String,
    dgram: Mutex<Option<UnixDatagram>>,
}

impl SysLogger {
    fn new(ident: &str) -> Result<Self, std::io::Error> {
        let dgram = Self::connect()?;
        Ok(Self {
            ident: ident.to_string(),
            dgram: Mutex::new(Some(dgram)),
        })
    }

    fn connect() -> Result<UnixDatagram, std::io::Error> {
        let sock = UnixDatagram::unbound()?;
        sock.connect("/dev/log")?;
        Ok(sock)
    }

    fn format(&self, record: &log::Record) -> String {
        let pri = (SYSLOG_FACILITY << 3) | syslog_severity(record.level());
        format!(
            "<{}>{}[{}]: {}",
            pri,
            self.ident,
            std::process::id(),
            record.args()
        )
    }
}

/* Only the very basic log function. A failed send drops the socket and
 * the next record reconnects. */
impl Log for SysLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let msg = self.format(record);
        let mut dgram = match self.dgram.lock() {
            Ok(v) => v,
            Err(_) => return,
        };

        if dgram.is_none() {
            match Self::connect() {
                Ok(sock) => *dgram = Some(sock),
                Err(e) => {
                    eprintln!("Failed to connect syslogger: {}", e);
                    return;
                }
            }
        }

        if let Some(sock) = dgram.as_ref() {
            if let Err(e) = sock.send(msg.as_bytes()) {
                eprintln!("Failed to send message to syslogger: {}", e);
                *dgram = None;
            }
        }
    }

    fn flush(&self) {}
}

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let mut stderr = std::io::stderr().lock();
        let module_path = record.module_path().unwrap_or("unknown");
        write_msg_common(
            &mut stderr,
            record.level(),
            module_path,
            &record.args().to_string(),
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

struct NullLogger;

impl Log for NullLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        false
    }

    fn log(&self, _record: &log::Record) {}

    fn flush(&self) {}
}

/// Collect different kinds of loggers together.
struct CombinedLogger {
    level: LevelFilter,
    loggers: Vec<Box<dyn Log>>,
}

impl Log for CombinedLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        for logger in &self.loggers {
            logger.log(record);
        }
    }

    fn flush(&self) {
        for logger in &self.loggers {
            logger.flush();
        }
    }
}

/// Initialize the global logger.
///
/// Repeated targets take effect only once. A target that cannot be opened
/// is reported on stderr and skipped. The global logger can be set only once
/// per process; later calls only adjust the maximum level.
///
/// # Arguments
///
/// * `name` - The application name, used as the syslog identifier.
/// * `level` - Maximum level written.
/// * `targets` - A set of log targets.
pub fn init_log(name: &str, level: LevelFilter, targets: &[LogTarget]) {
    let mut loggers: Vec<Box<dyn Log>> = Vec::new();
    let mut seen: Vec<LogTarget> = Vec::new();

    for target in targets {
        if seen.contains(target) {
            continue;
        }
        seen.push(*target);

        let logger = match target {
            LogTarget::Console => Box::new(ConsoleLogger) as Box<dyn Log>,
            LogTarget::Syslog => match SysLogger::new(name) {
                Ok(logger) => Box::new(logger) as Box<dyn Log>,
                Err(e) => {
                    eprintln!("{} failed to create syslogger: {}", name, e);
                    continue;
                }
            },
            LogTarget::Null => Box::new(NullLogger) as Box<dyn Log>,
        };
        loggers.push(logger);
    }

    if loggers.is_empty() {
        eprintln!("{}: no available log targets.", name);
    }

    log::set_max_level(level);
    if let Err(e) = log::set_boxed_logger(Box::new(CombinedLogger { level, loggers })) {
        eprintln!("{}: failed to set global logger: {}", name, e);
    }
}
