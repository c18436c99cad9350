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

//! When a service is started: at boot, on cron schedules, or both.
use cron::{CronExpression, CronTime};

/// Parsed schedule of a service.
#[derive(Debug, Clone)]
pub struct ServiceScheduler {
    on_boot: bool,
    expressions: Vec<CronExpression>,
}

impl ServiceScheduler {
    /// Parse every schedule entry. No entry at all, or an `@reboot` entry,
    /// starts the service at boot.
    pub fn new<S: AsRef<str>>(schedule: &[S]) -> cron::Result<Self> {
        let mut on_boot = schedule.is_empty();
        let mut expressions = Vec::new();

        for entry in schedule {
            let expr = CronExpression::parse(entry.as_ref())?;
            if expr.is_reboot() {
                on_boot = true;
            } else {
                expressions.push(expr);
            }
        }

        Ok(ServiceScheduler {
            on_boot,
            expressions,
        })
    }

    /// Whether the service starts at boot.
    pub fn on_boot(&self) -> bool {
        self.on_boot
    }

    /// Whether any cron expression other than `@reboot` is set.
    pub fn has_schedules(&self) -> bool {
        !self.expressions.is_empty()
    }

    /// Whether any cron expression matches `time`.
    pub fn check_time(&self, time: &CronTime) -> bool {
        self.expressions.iter().any(|e| e.matches(time))
    }
}
