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

//! Parser and matcher of five field cron expressions.
use crate::error::*;
use crate::time::CronTime;
use bitflags::bitflags;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, digit1},
    combinator::{map_res, opt},
    multi::separated_list1,
    sequence::preceded,
    IResult,
};
use snafu::OptionExt;
use std::{fmt, str::FromStr};

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DOW_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

bitflags! {
    struct EntryFlags: u8 {
        const MIN_STAR = 0x01;
        const HR_STAR = 0x02;
        const DOM_STAR = 0x04;
        const DOW_STAR = 0x08;
        const WHEN_REBOOT = 0x10;
    }
}

struct FieldSpec {
    low: u32,
    high: u32,
    names: &'static [&'static str],
    star: EntryFlags,
    cause: &'static str,
}

const FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        low: 0,
        high: 59,
        names: &[],
        star: EntryFlags::MIN_STAR,
        cause: "bad minute",
    },
    FieldSpec {
        low: 0,
        high: 23,
        names: &[],
        star: EntryFlags::HR_STAR,
        cause: "bad hour",
    },
    FieldSpec {
        low: 1,
        high: 31,
        names: &[],
        star: EntryFlags::DOM_STAR,
        cause: "bad day-of-month",
    },
    FieldSpec {
        low: 1,
        high: 12,
        names: MONTH_NAMES,
        star: EntryFlags::empty(),
        cause: "bad month",
    },
    /* 0 and 7 are both sunday */
    FieldSpec {
        low: 0,
        high: 7,
        names: DOW_NAMES,
        star: EntryFlags::DOW_STAR,
        cause: "bad day-of-week",
    },
];

const BAD_TIMESPEC: &str = "bad time specifier";

/// `(first, last, step)` of one comma separated element.
type Range = (u32, u32, u32);

fn number(i: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>())(i)
}

fn name<'a>(i: &'a str, spec: &FieldSpec) -> IResult<&'a str, u32> {
    let (rest, word) = alpha1(i)?;
    match spec.names.iter().position(|n| n.eq_ignore_ascii_case(word)) {
        Some(idx) => Ok((rest, spec.low + idx as u32)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn value<'a>(i: &'a str, spec: &FieldSpec) -> IResult<&'a str, u32> {
    alt((number, |i: &'a str| name(i, spec)))(i)
}

fn step(i: &str) -> IResult<&str, Option<u32>> {
    opt(preceded(tag("/"), number))(i)
}

/// range = "*" ["/" step] | value ["-" value ["/" step]]
fn range<'a>(i: &'a str, spec: &FieldSpec) -> IResult<&'a str, Range> {
    let (i, star) = opt(tag("*"))(i)?;
    if star.is_some() {
        let (i, step) = step(i)?;
        return Ok((i, (spec.low, spec.high, step.unwrap_or(1))));
    }

    let (i, first) = value(i, spec)?;
    let (i, last) = opt(preceded(tag("-"), |i: &'a str| value(i, spec)))(i)?;
    match last {
        /* a single value takes no step */
        None => Ok((i, (first, first, 1))),
        Some(last) => {
            let (i, step) = step(i)?;
            Ok((i, (first, last, step.unwrap_or(1))))
        }
    }
}

fn list<'a>(i: &'a str, spec: &FieldSpec) -> IResult<&'a str, Vec<Range>> {
    separated_list1(tag(","), |i: &'a str| range(i, spec))(i)
}

/// Parse one whitespace free field into a bit set indexed by value.
fn parse_field(token: &str, spec: &FieldSpec) -> Option<u64> {
    let (rest, ranges) = list(token, spec).ok()?;
    if !rest.is_empty() {
        return None;
    }

    let mut bits = 0u64;
    for (first, last, step) in ranges {
        if step == 0 || first > last {
            return None;
        }
        let mut v = first;
        while v <= last {
            if v < spec.low || v > spec.high {
                return None;
            }
            bits |= 1 << v;
            v = match v.checked_add(step) {
                Some(n) => n,
                None => break,
            };
        }
    }
    Some(bits)
}

fn all_bits(spec: &FieldSpec) -> u64 {
    (spec.low..=spec.high).fold(0, |bits, v| bits | (1 << v))
}

fn bit_test(bits: u64, v: u32) -> bool {
    v < 64 && bits & (1 << v) != 0
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minute: u64,
    hour: u64,
    dom: u64,
    month: u64,
    dow: u64,
    flags: EntryFlags,
}

impl CronExpression {
    /// Parse five whitespace separated fields, or one of the `@` shortcuts.
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        let mut entry = match trimmed.strip_prefix('@') {
            Some(special) => Self::parse_shortcut(expr, special)?,
            None => Self::parse_fields(expr, trimmed)?,
        };

        if bit_test(entry.dow, 0) || bit_test(entry.dow, 7) {
            entry.dow |= 1 | (1 << 7);
        }
        Ok(entry)
    }

    fn empty(expr: &str) -> Self {
        CronExpression {
            source: expr.to_string(),
            minute: 0,
            hour: 0,
            dom: 0,
            month: 0,
            dow: 0,
            flags: EntryFlags::empty(),
        }
    }

    fn parse_fields(expr: &str, trimmed: &str) -> Result<Self> {
        let mut entry = Self::empty(expr);
        let mut tokens = trimmed.split_whitespace();
        let mut bits = [0u64; 5];

        for (idx, spec) in FIELDS.iter().enumerate() {
            let token = tokens.next().context(ParseSnafu {
                cause: spec.cause,
                expr,
            })?;
            if token.starts_with('*') {
                entry.flags |= spec.star;
            }
            bits[idx] = parse_field(token, spec).context(ParseSnafu {
                cause: spec.cause,
                expr,
            })?;
        }

        if tokens.next().is_some() {
            return ParseSnafu {
                cause: FIELDS[4].cause,
                expr,
            }
            .fail();
        }

        [entry.minute, entry.hour, entry.dom, entry.month, entry.dow] = bits;
        Ok(entry)
    }

    fn parse_shortcut(expr: &str, special: &str) -> Result<Self> {
        let (word, rest) = match special.find(char::is_whitespace) {
            Some(pos) => special.split_at(pos),
            None => (special, ""),
        };
        if !rest.trim().is_empty() {
            return ParseSnafu {
                cause: BAD_TIMESPEC,
                expr,
            }
            .fail();
        }

        let [_, hour, dom, month, dow] = &FIELDS;
        let mut entry = Self::empty(expr);
        match word {
            "reboot" => {
                entry.flags |= EntryFlags::WHEN_REBOOT;
            }
            "yearly" | "annually" => {
                entry.minute = 1 << 0;
                entry.hour = 1 << 0;
                entry.dom = 1 << 1;
                entry.month = 1 << 1;
                entry.dow = all_bits(dow);
                entry.flags |= EntryFlags::DOW_STAR;
            }
            "monthly" => {
                entry.minute = 1 << 0;
                entry.hour = 1 << 0;
                entry.dom = 1 << 1;
                entry.month = all_bits(month);
                entry.dow = all_bits(dow);
                entry.flags |= EntryFlags::DOW_STAR;
            }
            "weekly" => {
                entry.minute = 1 << 0;
                entry.hour = 1 << 0;
                entry.dom = all_bits(dom);
                entry.month = all_bits(month);
                entry.dow = 1 << 0;
                entry.flags |= EntryFlags::DOW_STAR;
            }
            "daily" | "midnight" => {
                entry.minute = 1 << 0;
                entry.hour = 1 << 0;
                entry.dom = all_bits(dom);
                entry.month = all_bits(month);
                entry.dow = all_bits(dow);
            }
            "hourly" => {
                entry.minute = 1 << 0;
                entry.hour = all_bits(hour);
                entry.dom = all_bits(dom);
                entry.month = all_bits(month);
                entry.dow = all_bits(dow);
                entry.flags |= EntryFlags::HR_STAR;
            }
            _ => {
                return ParseSnafu {
                    cause: BAD_TIMESPEC,
                    expr,
                }
                .fail()
            }
        }
        Ok(entry)
    }

    /// Whether this is the `@reboot` marker.
    pub fn is_reboot(&self) -> bool {
        self.flags.contains(EntryFlags::WHEN_REBOOT)
    }

    /// The expression as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Test a calendar instant.
    ///
    /// Minute, hour and month must all match. When the day-of-month or the
    /// day-of-week field was written with a leading `*`, both day fields
    /// must match, otherwise either one is enough. `@reboot` never matches.
    pub fn matches(&self, time: &CronTime) -> bool {
        if self.is_reboot() {
            return false;
        }

        let dom = bit_test(self.dom, time.dom());
        let dow = bit_test(self.dow, time.dow());
        let day = if self
            .flags
            .intersects(EntryFlags::DOM_STAR | EntryFlags::DOW_STAR)
        {
            dom && dow
        } else {
            dom || dow
        };

        bit_test(self.minute, time.minute())
            && bit_test(self.hour, time.hour())
            && bit_test(self.month, time.month())
            && day
    }
}

impl FromStr for CronExpression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CronExpression::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(year: i32, month: u32, dom: u32, hour: u32, minute: u32) -> CronTime {
        CronTime::new(year, month, dom, hour, minute).unwrap()
    }

    fn cause(expr: &str) -> &'static str {
        CronExpression::parse(expr).unwrap_err().cause().unwrap()
    }

    #[test]
    fn test_wildcard_matches_everything() {
        let e = CronExpression::parse("* * * * *").unwrap();
        let mut t = at(2023, 12, 31, 23, 58);
        for _ in 0..5 {
            assert!(e.matches(&t));
            t.increment();
        }
        assert!(e.matches(&at(2024, 2, 29, 12, 0)));
        assert!(!e.is_reboot());
    }

    #[test]
    fn test_specific_time() {
        let e = CronExpression::parse("30 12 * * *").unwrap();
        assert!(e.matches(&at(2024, 5, 17, 12, 30)));
        assert!(!e.matches(&at(2024, 5, 17, 12, 31)));
        assert!(!e.matches(&at(2024, 5, 17, 13, 30)));
    }

    #[test]
    fn test_lists_ranges_steps() {
        let e = CronExpression::parse("*/15 * * * *").unwrap();
        assert_eq!(e.minute, 1 | 1 << 15 | 1 << 30 | 1 << 45);

        let e = CronExpression::parse("10-20/5 1,2,5 * * *").unwrap();
        assert_eq!(e.minute, 1 << 10 | 1 << 15 | 1 << 20);
        assert_eq!(e.hour, 1 << 1 | 1 << 2 | 1 << 5);

        let e = CronExpression::parse("0 9-17 * * 1-5").unwrap();
        assert!(e.matches(&at(2024, 1, 1, 9, 0)));
        assert!(!e.matches(&at(2024, 1, 6, 9, 0)));
    }

    #[test]
    fn test_names() {
        let e = CronExpression::parse("0 0 * jan,JUL Sun").unwrap();
        assert_eq!(e.month, 1 << 1 | 1 << 7);
        assert!(e.matches(&at(2024, 7, 7, 0, 0)));
        assert!(!e.matches(&at(2024, 8, 4, 0, 0)));

        let e = CronExpression::parse("0 0 * mar-may mon-fri").unwrap();
        assert_eq!(e.month, 1 << 3 | 1 << 4 | 1 << 5);
        assert_eq!(e.dow, 0b11_1110);
    }

    #[test]
    fn test_sunday_is_zero_and_seven() {
        let e = CronExpression::parse("0 0 * * 7").unwrap();
        assert!(bit_test(e.dow, 0));
        /* 2024-01-07 is a sunday */
        assert!(e.matches(&at(2024, 1, 7, 0, 0)));

        let e = CronExpression::parse("0 0 * * 0").unwrap();
        assert!(bit_test(e.dow, 7));
    }

    #[test]
    fn test_day_or_rule() {
        let e = CronExpression::parse("0 0 15 * sun").unwrap();
        assert!(e.matches(&at(2024, 1, 7, 0, 0)));
        assert!(e.matches(&at(2024, 1, 15, 0, 0)));
        assert!(!e.matches(&at(2024, 1, 16, 0, 0)));
    }

    #[test]
    fn test_day_and_rule() {
        let e = CronExpression::parse("0 0 * * sun").unwrap();
        assert!(e.matches(&at(2024, 1, 7, 0, 0)));
        assert!(!e.matches(&at(2024, 1, 8, 0, 0)));

        /* a stepped wildcard still counts as a wildcard */
        let e = CronExpression::parse("0 0 */2 * mon").unwrap();
        assert!(e.matches(&at(2024, 1, 1, 0, 0)));
        assert!(!e.matches(&at(2024, 1, 8, 0, 0)));
        assert!(!e.matches(&at(2024, 1, 3, 0, 0)));
    }

    #[test]
    fn test_shortcuts() {
        let yearly = CronExpression::parse("@yearly").unwrap();
        assert!(yearly.matches(&at(2024, 1, 1, 0, 0)));
        assert!(!yearly.matches(&at(2024, 2, 1, 0, 0)));
        assert_eq!(yearly, CronExpression::parse("@annually").unwrap().with_source("@yearly"));

        let monthly = CronExpression::parse("@monthly").unwrap();
        assert!(monthly.matches(&at(2024, 3, 1, 0, 0)));
        assert!(!monthly.matches(&at(2024, 3, 2, 0, 0)));

        let weekly = CronExpression::parse("@weekly").unwrap();
        assert!(weekly.matches(&at(2024, 1, 7, 0, 0)));
        assert!(!weekly.matches(&at(2024, 1, 1, 0, 0)));

        let daily = CronExpression::parse("@daily").unwrap();
        assert!(daily.matches(&at(2024, 1, 3, 0, 0)));
        assert!(!daily.matches(&at(2024, 1, 3, 0, 1)));
        assert!(CronExpression::parse("@midnight").unwrap().matches(&at(2024, 1, 3, 0, 0)));

        let hourly = CronExpression::parse("  @hourly  ").unwrap();
        assert!(hourly.matches(&at(2024, 1, 3, 17, 0)));
        assert!(!hourly.matches(&at(2024, 1, 3, 17, 30)));
    }

    #[test]
    fn test_reboot_never_matches() {
        let e = CronExpression::parse("@reboot").unwrap();
        assert!(e.is_reboot());
        let mut t = at(2024, 1, 1, 0, 0);
        for _ in 0..120 {
            assert!(!e.matches(&t));
            t.increment();
        }
    }

    #[test]
    fn test_errors() {
        assert_eq!(cause("60 * * * *"), "bad minute");
        assert_eq!(cause("*/0 * * * *"), "bad minute");
        assert_eq!(cause("5-1 * * * *"), "bad minute");
        assert_eq!(cause("5/2 * * * *"), "bad minute");
        assert_eq!(cause("a * * * *"), "bad minute");
        assert_eq!(cause("1, * * * *"), "bad minute");
        assert_eq!(cause(""), "bad minute");
        assert_eq!(cause("* 24 * * *"), "bad hour");
        assert_eq!(cause("* * 0 * *"), "bad day-of-month");
        assert_eq!(cause("* * 32 * *"), "bad day-of-month");
        assert_eq!(cause("* * * 13 *"), "bad month");
        assert_eq!(cause("* * * foo *"), "bad month");
        assert_eq!(cause("* * * * 8"), "bad day-of-week");
        assert_eq!(cause("* * * *"), "bad day-of-week");
        assert_eq!(cause("* * * * * *"), "bad day-of-week");
        assert_eq!(cause("@reboot now"), "bad time specifier");
        assert_eq!(cause("@fortnightly"), "bad time specifier");
        assert_eq!(cause("@"), "bad time specifier");
    }

    #[test]
    fn test_error_display() {
        let err = "* * * * 9".parse::<CronExpression>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to parse cron expression '* * * * 9': bad day-of-week."
        );
    }

    impl CronExpression {
        fn with_source(mut self, source: &str) -> Self {
            self.source = source.to_string();
            self
        }
    }
}
