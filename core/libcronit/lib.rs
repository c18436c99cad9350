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

//! cronit: a small init process for containers.
//!
//! It runs as pid 1, starts services at boot or on cron schedules,
//! restarts them according to their policy, reaps every zombie and shuts
//! everything down in escalating steps when asked to terminate.
//!
//! All signals are blocked and consumed synchronously by the
//! [`Supervisor`], so the whole program is a single threaded loop.
pub mod config;
pub mod error;
pub mod program;
pub mod registry;
pub mod service;
pub mod supervisor;

pub use config::{CronitConfig, Settings};
pub use program::{LoopExit, ShutdownOutcome, SupervisorProgram};
pub use registry::ServiceRegistry;
pub use service::{RestartPolicy, Service, ServiceConfig, ServiceStatus};
pub use supervisor::Supervisor;
