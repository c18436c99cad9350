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

//! Minute granularity calendar instants in UTC.
use crate::error::*;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use snafu::prelude::*;
use std::{cmp::Ordering, fmt, time::SystemTime};

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// A calendar minute: minute, hour, day-of-month (1-31), month (1-12),
/// day-of-week (0-6, sunday is 0) and year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronTime {
    minute: u32,
    hour: u32,
    dom: u32,
    month: u32,
    dow: u32,
    year: i32,
}

impl CronTime {
    /// Build an instant from its calendar fields, computing the weekday.
    pub fn new(year: i32, month: u32, dom: u32, hour: u32, minute: u32) -> Result<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, dom).context(InvalidTimeSnafu {
            what: format!("{:04}-{:02}-{:02}", year, month, dom),
        })?;
        ensure!(
            hour < 24 && minute < 60,
            InvalidTimeSnafu {
                what: format!("{:02}:{:02}", hour, minute),
            }
        );

        Ok(CronTime {
            minute,
            hour,
            dom,
            month,
            dow: date.weekday().num_days_from_sunday(),
            year,
        })
    }

    /// Truncate a UTC date time to its minute.
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        CronTime {
            minute: dt.minute(),
            hour: dt.hour(),
            dom: dt.day(),
            month: dt.month(),
            dow: dt.weekday().num_days_from_sunday(),
            year: dt.year(),
        }
    }

    /// Convert wall clock time, interpreted as UTC.
    pub fn from_system_time(t: SystemTime) -> Self {
        Self::from_datetime(&DateTime::<Utc>::from(t))
    }

    /// The current minute.
    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    /// Advance by one minute, rolling over hour, day, weekday, month and
    /// year.
    pub fn increment(&mut self) {
        self.minute += 1;
        if self.minute < 60 {
            return;
        }
        self.minute = 0;

        self.hour += 1;
        if self.hour < 24 {
            return;
        }
        self.hour = 0;

        self.dow = (self.dow + 1) % 7;
        self.dom += 1;
        if self.dom <= days_in_month(self.year, self.month) {
            return;
        }
        self.dom = 1;

        self.month += 1;
        if self.month <= 12 {
            return;
        }
        self.month = 1;
        self.year += 1;
    }

    ///
    pub fn minute(&self) -> u32 {
        self.minute
    }

    ///
    pub fn hour(&self) -> u32 {
        self.hour
    }

    ///
    pub fn dom(&self) -> u32 {
        self.dom
    }

    ///
    pub fn month(&self) -> u32 {
        self.month
    }

    ///
    pub fn dow(&self) -> u32 {
        self.dow
    }

    ///
    pub fn year(&self) -> i32 {
        self.year
    }
}

impl Ord for CronTime {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.year, self.month, self.dom, self.hour, self.minute).cmp(&(
            other.year,
            other.month,
            other.dom,
            other.hour,
            other.minute,
        ))
    }
}

impl PartialOrd for CronTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CronTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.dom, self.hour, self.minute
        )
    }
}
