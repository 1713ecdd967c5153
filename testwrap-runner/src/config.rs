// Copyright (c) The testwrap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration read from the environment.
//!
//! All environment lookups happen in [`WrapEnv::from_lookup`]. The rest of the crate takes
//! explicit configuration.

use crate::errors::EnvConfigError;
use camino::Utf8PathBuf;
use std::ffi::OsString;

/// Forces wrapping on or off. Always set to `0` for the child process.
pub const TEST_WRAP_ENV: &str = "TEST_WRAP";

/// Where to write the JUnit report.
pub const XML_OUTPUT_FILE_ENV: &str = "XML_OUTPUT_FILE";

/// Requests that the verbosity flag be passed to the test binary.
pub const TEST_WRAP_TESTV_ENV: &str = "TEST_WRAP_TESTV";

/// Wrapping settings derived from the environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WrapEnv {
    /// Whether the test binary should be supervised at all.
    pub wrap: bool,

    /// Where to write the report, if anywhere.
    pub report_path: Option<Utf8PathBuf>,

    /// Whether to prefix the verbosity flag to the test binary's arguments.
    pub add_verbose_flag: bool,
}

impl WrapEnv {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, EnvConfigError> {
        Self::from_lookup(|var| std::env::var_os(var))
    }

    /// Reads settings through `lookup`, which returns the value of an environment variable if
    /// it's set.
    ///
    /// * If `TEST_WRAP` is set, it decides whether to wrap.
    /// * Otherwise, wrapping is enabled if `XML_OUTPUT_FILE` is set.
    ///
    /// An empty `XML_OUTPUT_FILE` is treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let report_path = match lookup(XML_OUTPUT_FILE_ENV) {
            Some(value) if value.is_empty() => None,
            Some(value) => Some(Utf8PathBuf::try_from(std::path::PathBuf::from(value)).map_err(
                |error| EnvConfigError::NotUnicode {
                    var: XML_OUTPUT_FILE_ENV,
                    value: error.into_path_buf().into_os_string(),
                },
            )?),
            None => None,
        };

        let wrap = match parse_bool_var(TEST_WRAP_ENV, &lookup)? {
            Some(wrap) => wrap,
            None => report_path.is_some(),
        };
        let add_verbose_flag = parse_bool_var(TEST_WRAP_TESTV_ENV, &lookup)?.unwrap_or(false);

        Ok(Self {
            wrap,
            report_path,
            add_verbose_flag,
        })
    }
}

fn parse_bool_var<F>(var: &'static str, lookup: &F) -> Result<Option<bool>, EnvConfigError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    let value = value
        .into_string()
        .map_err(|value| EnvConfigError::NotUnicode { var, value })?;

    match parse_bool(&value) {
        Some(b) => Ok(Some(b)),
        None => Err(EnvConfigError::InvalidBool { var, value }),
    }
}

/// Parses a boolean the way Go's `strconv.ParseBool` does, which is what test binaries and Bazel
/// rules set these variables with.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
