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

//! signal mask and disposition helpers
use crate::error::*;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};

/// reset all signal handlers
pub fn reset_all_signal_handlers() {
    for sig in Signal::iterator() {
        /* SIGKILL and SIGSTOP is invalid, see sigaction(2) */
        if sig == Signal::SIGKILL || sig == Signal::SIGSTOP {
            continue;
        }
        let sig_action = SigAction::new(SigHandler::SigDfl, SaFlags::SA_RESTART, SigSet::empty());
        unsafe {
            if let Err(e) = signal::sigaction(sig, &sig_action) {
                log::warn!("Failed to reset signal {}: {}", sig, e);
            }
        }
    }
}

/// reset signal mask
pub fn reset_signal_mask() {
    if let Err(e) = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None) {
        log::warn!("reset sigprocmask failed:{}", e);
    }
}

/// Block every signal for the calling thread, returning the previous mask.
pub fn block_all_signals() -> Result<SigSet> {
    let mut old = SigSet::empty();
    signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::all()), Some(&mut old))
        .context(NixSnafu)?;
    Ok(old)
}

/// Replace the signal mask of the calling thread.
pub fn restore_signal_mask(mask: &SigSet) -> Result<()> {
    signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(mask), None).context(NixSnafu)
}

/// Install `handler` on every catchable signal.
///
/// The disposition resets after the first delivery, so a synchronous fault
/// that cannot be blocked is reported once and then takes its default action.
pub fn install_catchall_handler(handler: extern "C" fn(libc::c_int)) -> Result<()> {
    let sig_action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESETHAND | SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in Signal::iterator() {
        if sig == Signal::SIGKILL || sig == Signal::SIGSTOP {
            continue;
        }
        unsafe { signal::sigaction(sig, &sig_action) }.context(NixSnafu)?;
    }
    Ok(())
}

/// Name of a signal number, `SIG<n>` when unknown to the platform table.
pub fn signal_name(signo: i32) -> String {
    match Signal::try_from(signo) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("SIG{}", signo),
    }
}

/// Write `prefix` followed by the decimal signal number and a newline to
/// stderr.
///
/// Only calls write(2) on a stack buffer, so it may run inside a signal
/// handler.
pub fn write_signal_notice(prefix: &[u8], signo: i32) {
    let mut buf = [0u8; 128];
    let mut len = 0;

    for b in prefix.iter().take(buf.len() - 16) {
        buf[len] = *b;
        len += 1;
    }

    let mut digits = [0u8; 12];
    let mut n = signo.unsigned_abs();
    let mut count = 0;
    loop {
        digits[count] = b'0' + (n % 10) as u8;
        count += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    if signo < 0 {
        buf[len] = b'-';
        len += 1;
    }
    while count > 0 {
        count -= 1;
        buf[len] = digits[count];
        len += 1;
    }
    buf[len] = b'\n';
    len += 1;

    unsafe {
        libc::write(libc::STDERR_FILENO, buf.as_ptr() as *const libc::c_void, len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_signal_name() {
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
        assert_eq!(signal_name(libc::SIGCHLD), "SIGCHLD");
        assert_eq!(signal_name(1000), "SIG1000");
    }

    #[test]
    fn test_write_signal_notice() {
        write_signal_notice(b"test: unexpected signal ", libc::SIGUSR1);
        write_signal_notice(b"", -7);
    }

    #[test]
    #[serial]
    fn test_block_and_restore() {
        let old = block_all_signals().unwrap();
        let current = SigSet::thread_get_mask().unwrap();
        assert!(current.contains(Signal::SIGTERM));
        assert!(current.contains(Signal::SIGCHLD));

        restore_signal_mask(&old).unwrap();
        let current = SigSet::thread_get_mask().unwrap();
        assert_eq!(
            current.contains(Signal::SIGTERM),
            old.contains(Signal::SIGTERM)
        );
    }
}
