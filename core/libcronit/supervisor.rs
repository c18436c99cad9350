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

//! The process supervisor: sole owner of the signal mask and of the process
//! primitives the services are driven with.
//!
//! Every signal is blocked while a [`Supervisor`] exists, so signals queue
//! up and are consumed synchronously through [`Supervisor::wait_signal`].
use crate::error::*;
use basic::process::wait_status_pid;
use basic::time_util::{duration_to_timespec, expired, remaining};
use nix::sys::signal::{self, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{self, Id, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static INSTANCE: AtomicBool = AtomicBool::new(false);

/// Interval between two peeks while waiting for a process to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

extern "C" fn unexpected_signal_handler(signo: libc::c_int) {
    basic::signal::write_signal_notice(b"cronit: unexpected signal ", signo);
}

/// A signal consumed by [`Supervisor::wait_signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalInfo {
    /// Signal number.
    pub signo: i32,
    /// Sending process, 0 when the kernel raised it.
    pub pid: Pid,
}

impl SignalInfo {
    /// The signal, if the platform knows its number.
    pub fn signal(&self) -> Option<Signal> {
        Signal::try_from(self.signo).ok()
    }
}

/// Result of peeking at exited children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    /// A process exited and waits to be reaped.
    Exited(Pid),
    /// Children exist but none has exited.
    Running,
    /// There is no child matching the target at all.
    NoChildren,
}

/// Result of [`Supervisor::reap_zombie_process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapOutcome {
    /// The target has no live, unreaped member left.
    pub reaped: bool,
    /// The last termination collected, if any.
    pub status: Option<WaitStatus>,
}

fn wait_id(target: Pid) -> Id {
    match target.as_raw() {
        -1 => Id::All,
        0 => Id::PGid(unistd::getpgrp()),
        p if p < -1 => Id::PGid(Pid::from_raw(-p)),
        _ => Id::Pid(target),
    }
}

/// The process supervisor. At most one exists per process.
#[derive(Debug)]
pub struct Supervisor {
    saved_mask: SigSet,
}

impl Supervisor {
    /// Block every signal and install the diagnostic handler.
    ///
    /// Fails with [`Error::AlreadyInitialized`] while another instance is
    /// alive.
    pub fn new() -> Result<Self> {
        if INSTANCE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return AlreadyInitializedSnafu.fail();
        }

        let saved_mask = match basic::signal::block_all_signals() {
            Ok(mask) => mask,
            Err(e) => {
                INSTANCE.store(false, Ordering::SeqCst);
                return Err(e).context(UtilSnafu);
            }
        };
        let supervisor = Supervisor { saved_mask };

        /* The handler only fires for signals that cannot be blocked. */
        basic::signal::install_catchall_handler(unexpected_signal_handler).context(UtilSnafu)?;

        log::debug!("All signals are blocked, waiting on them synchronously.");
        Ok(supervisor)
    }

    /// The signal mask in effect before the supervisor was created.
    pub fn saved_mask(&self) -> &SigSet {
        &self.saved_mask
    }

    /// Fork and exec `argv`, searching `PATH` for the program.
    ///
    /// The child gets the original signal mask back and default signal
    /// dispositions. When exec fails the child exits with 127.
    pub fn spawn(&self, argv: &[String]) -> Result<Pid> {
        let command = match argv.first() {
            Some(c) => c.clone(),
            None => {
                return InvalidCommandSnafu {
                    what: "empty command line".to_string(),
                }
                .fail()
            }
        };

        let mut args = Vec::with_capacity(argv.len());
        for arg in argv {
            match CString::new(arg.as_str()) {
                Ok(a) => args.push(a),
                Err(_) => {
                    return InvalidCommandSnafu {
                        what: format!("'{}' contains a nul byte", arg),
                    }
                    .fail()
                }
            }
        }

        match unsafe { unistd::fork() } {
            Ok(ForkResult::Parent { child }) => {
                log::debug!("Spawned '{}' as pid {}.", command, child);
                Ok(child)
            }
            Ok(ForkResult::Child) => self.exec_child(&args),
            Err(e) => Err(e).context(SpawnSnafu { command }),
        }
    }

    fn exec_child(&self, args: &[CString]) -> ! {
        basic::signal::reset_all_signal_handlers();
        if signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.saved_mask), None).is_err()
        {
            basic::signal::reset_signal_mask();
        }

        let Err(e) = unistd::execvp(&args[0], args);
        log::error!("Failed to execute {:?}: {}", args[0], e);
        unsafe { libc::_exit(127) }
    }

    /// Reap terminated children of `target` without blocking.
    ///
    /// `target` follows waitpid(2): a pid, `-1` for any child, `0` for the
    /// own process group or `-pgid`. Reaping repeats until the target pid is
    /// collected or nothing more is available. `reaped` is true when the
    /// target has no unreaped member left, including when there is no child
    /// at all.
    pub fn reap_zombie_process(&self, target: Pid) -> Result<ReapOutcome> {
        let mut outcome = ReapOutcome {
            reaped: false,
            status: None,
        };

        loop {
            match wait::waitpid(target, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => return Ok(outcome),
                Ok(status) => {
                    let pid = wait_status_pid(&status);
                    log::debug!("Reaped process {:?}: {:?}", pid, status);
                    outcome.status = Some(status);
                    if pid == Some(target) {
                        outcome.reaped = true;
                        return Ok(outcome);
                    }
                }
                Err(Errno::ECHILD) => {
                    outcome.reaped = true;
                    return Ok(outcome);
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).context(NixSnafu),
            }
        }
    }

    fn peek_exited_process(&self, target: Pid) -> Result<ChildState> {
        let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
        loop {
            return match wait::waitid(wait_id(target), flags) {
                Ok(WaitStatus::StillAlive) => Ok(ChildState::Running),
                Ok(status) => match wait_status_pid(&status) {
                    Some(pid) => Ok(ChildState::Exited(pid)),
                    None => Ok(ChildState::Running),
                },
                Err(Errno::ECHILD) => Ok(ChildState::NoChildren),
                Err(Errno::EINTR) => continue,
                Err(e) => Err(e).context(NixSnafu),
            };
        }
    }

    /// Peek for an exited but unreaped member of `target` without consuming
    /// it. With a deadline, poll until something exits or the deadline
    /// passes.
    pub fn check_for_exited_process(
        &self,
        target: Pid,
        deadline: Option<Instant>,
    ) -> Result<ChildState> {
        loop {
            let state = self.peek_exited_process(target)?;
            match deadline {
                Some(d) if state == ChildState::Running && !expired(d) => {
                    std::thread::sleep(EXIT_POLL_INTERVAL.min(remaining(d)));
                }
                _ => return Ok(state),
            }
        }
    }

    /// Send `sig` to `target` (kill(2) semantics). Returns false when no
    /// such process exists.
    pub fn send_signal(&self, target: Pid, sig: Signal) -> Result<bool> {
        match signal::kill(target, sig) {
            Ok(()) => Ok(true),
            Err(e) if basic::errno_is_gone(e) => Ok(false),
            Err(e) => Err(e).context(NixSnafu),
        }
    }

    /// Wait for the next pending signal, until `deadline` if given.
    ///
    /// `Ok(None)` means the deadline passed without a signal.
    pub fn wait_signal(&self, deadline: Option<Instant>) -> Result<Option<SignalInfo>> {
        let set = SigSet::all();
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };

        loop {
            let ret = match deadline {
                None => unsafe { libc::sigwaitinfo(set.as_ref(), &mut info) },
                Some(d) => {
                    let ts = duration_to_timespec(remaining(d));
                    unsafe { libc::sigtimedwait(set.as_ref(), &mut info, &ts) }
                }
            };

            if ret > 0 {
                let pid = Pid::from_raw(unsafe { info.si_pid() });
                return Ok(Some(SignalInfo { signo: ret, pid }));
            }

            match Errno::last() {
                Errno::EAGAIN => return Ok(None),
                Errno::EINTR => continue,
                errno => {
                    return Err(basic::Error::Syscall {
                        syscall: "sigtimedwait",
                        ret,
                        errno: errno as i32,
                    })
                    .context(UtilSnafu)
                }
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Err(e) = basic::signal::restore_signal_mask(&self.saved_mask) {
            log::warn!("Failed to restore the signal mask: {}", e);
        }
        INSTANCE.store(false, Ordering::SeqCst);
    }
}
