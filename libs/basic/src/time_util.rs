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

//! deadline helpers
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time left until `deadline`, zero once it has passed.
pub fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Whether `deadline` has passed.
pub fn expired(deadline: Instant) -> bool {
    Instant::now() >= deadline
}

/// Convert a duration into a `timespec` for the raw timed syscalls.
pub fn duration_to_timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}

/// Time from `now` until the next whole wall clock minute.
pub fn until_next_minute(now: SystemTime) -> Duration {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let into_minute = Duration::new(since_epoch.as_secs() % 60, since_epoch.subsec_nanos());
    Duration::from_secs(60) - into_minute
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining() {
        let past = Instant::now();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(remaining(past), Duration::ZERO);
        assert!(expired(past));

        let future = Instant::now() + Duration::from_secs(60);
        assert!(remaining(future) > Duration::from_secs(59));
        assert!(!expired(future));
    }

    #[test]
    fn test_duration_to_timespec() {
        let ts = duration_to_timespec(Duration::from_millis(1500));
        assert_eq!(ts.tv_sec, 1);
        assert_eq!(ts.tv_nsec, 500_000_000);
    }

    #[test]
    fn test_until_next_minute() {
        let t = UNIX_EPOCH + Duration::from_secs(120);
        assert_eq!(until_next_minute(t), Duration::from_secs(60));

        let t = UNIX_EPOCH + Duration::from_millis(125_500);
        assert_eq!(until_next_minute(t), Duration::from_millis(54_500));
    }
}
