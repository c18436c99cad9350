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

//! process wait status helpers
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// Exit code recorded for a process terminated by a signal.
pub const EXIT_CODE_SIGNALED: i32 = -1;

/// The pid a wait status refers to, if any process changed state.
pub fn wait_status_pid(status: &WaitStatus) -> Option<Pid> {
    match status {
        WaitStatus::StillAlive => None,
        other => other.pid(),
    }
}

/// The exit code of a terminated process: the exit status on a normal
/// exit, [`EXIT_CODE_SIGNALED`] when killed by a signal. `None` for any
/// state that is not a termination.
pub fn exit_code(status: &WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(*code),
        WaitStatus::Signaled(_, _, _) => Some(EXIT_CODE_SIGNALED),
        _ => None,
    }
}
