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

//! Errors of the cron matcher.
use snafu::prelude::*;

#[allow(missing_docs)]
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Failed to parse cron expression '{}': {}.", expr, cause))]
    ParseError { cause: &'static str, expr: String },

    #[snafu(display("Invalid calendar time: {}.", what))]
    InvalidTimeError { what: String },
}

///
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// The generic cause of a parse failure, such as `bad minute`.
    pub fn cause(&self) -> Option<&'static str> {
        match self {
            Error::ParseError { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
