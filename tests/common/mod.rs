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

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// The cronit binary built for this test run.
pub fn cronit() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cronit"))
}

/// Run cronit with `args`, logging to stderr at debug level.
pub fn run_cronit(args: &[&str]) -> Output {
    let output = cronit()
        .args(["-l", "debug"])
        .args(args)
        .output()
        .expect("failed to execute cronit!");
    println!("[cronit {:?}]: {}", args, output.status);
    println!("{}", String::from_utf8_lossy(&output.stderr));
    output
}

/// Run cronit as pid 1 of a new pid namespace. Needs root and unshare(1).
pub fn run_cronit_as_init(args: &[&str]) -> Output {
    let output = Command::new("unshare")
        .args(["--pid", "--fork", "--mount-proc"])
        .arg(env!("CARGO_BIN_EXE_cronit"))
        .args(["-l", "debug"])
        .args(args)
        .output()
        .expect("failed to execute unshare!");
    println!("[cronit {:?} as init]: {}", args, output.status);
    println!("{}", String::from_utf8_lossy(&output.stderr));
    output
}

/// Write `content` to `name` under `dir`.
pub fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("failed to write config!");
    path
}
