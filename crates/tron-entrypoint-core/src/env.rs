// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed access to the entrypoint's environment variables.
//!
//! An absent variable and an empty one are treated the same way: "use the default".

use std::collections::HashMap;
use std::env::{self, VarError};
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

use crate::error::EntrypointError;

/// Separator placed between quoted filter entries so that they line up inside the
/// node config's array syntax.
pub const FILTER_SEPARATOR: &str = ",\n      ";

/// Somewhere environment variables can be looked up.
pub trait EnvSource {
    /// `Ok(None)` when unset; an error when set to something unusable.
    fn var(&self, name: &str) -> Result<Option<String>, EntrypointError>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Result<Option<String>, EntrypointError> {
        match env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(raw)) => Err(EntrypointError::NotUnicode {
                name: name.to_string(),
                value: raw.to_string_lossy().into_owned(),
            }),
        }
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Result<Option<String>, EntrypointError> {
        Ok(self.get(name).cloned())
    }
}

/// Validating reader over an [`EnvSource`].
pub struct EnvReader<'a, S: EnvSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: EnvSource + ?Sized> EnvReader<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// The raw value, or `None` when unset or empty.
    pub fn string(&self, name: &str) -> Result<Option<String>, EntrypointError> {
        Ok(self.source.var(name)?.filter(|value| !value.is_empty()))
    }

    /// Strictly `"true"` or `"false"`; anything else is fatal.
    pub fn boolean(&self, name: &'static str) -> Result<Option<bool>, EntrypointError> {
        match self.string(name)?.as_deref() {
            None => Ok(None),
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(EntrypointError::InvalidBoolean {
                name,
                value: other.to_string(),
            }),
        }
    }

    pub fn boolean_or(&self, name: &'static str, default: bool) -> Result<bool, EntrypointError> {
        Ok(self.boolean(name)?.unwrap_or(default))
    }

    /// Strict integer parse, used for ports.
    pub fn integer<T>(&self, name: &'static str) -> Result<Option<T>, EntrypointError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(value) = self.string(name)? else {
            return Ok(None);
        };
        value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| EntrypointError::InvalidNumber {
                name,
                value,
                reason: format!("Must be an integer ({e})"),
            })
    }

    /// Strict floating point parse; NaN and infinities are rejected.
    pub fn double(&self, name: &'static str) -> Result<Option<f64>, EntrypointError> {
        let Some(value) = self.string(name)? else {
            return Ok(None);
        };
        match value.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => Ok(Some(parsed)),
            Ok(_) => Err(EntrypointError::InvalidNumber {
                name,
                value,
                reason: "Must be a finite number".to_string(),
            }),
            Err(e) => Err(EntrypointError::InvalidNumber {
                name,
                value,
                reason: format!("Must be a number ({e})"),
            }),
        }
    }

    /// A positive whole number, accepting decimals that are rounded (`"1.5"` -> 2).
    ///
    /// Invalid values are not fatal: a warning naming `fallback` is logged and `None`
    /// is returned so the caller can fall back.
    pub fn positive_rounded(
        &self,
        name: &str,
        fallback: &str,
    ) -> Result<Option<i64>, EntrypointError> {
        let Some(value) = self.string(name)? else {
            return Ok(None);
        };
        let parsed = parse_positive_rounded(&value);
        if parsed.is_none() {
            warn!("Invalid {name}: {value}, falling back to {fallback}");
        }
        Ok(parsed)
    }

    /// Whitespace-separated entries, each quoted and joined with [`FILTER_SEPARATOR`].
    ///
    /// Returns `None` when there is nothing to override so that the caller keeps its
    /// default representation.
    pub fn filter_list(&self, name: &str) -> Result<Option<String>, EntrypointError> {
        Ok(self.string(name)?.as_deref().and_then(build_filter))
    }
}

/// Parses an integer, or a decimal rounded to the nearest integer, and requires the
/// result to be strictly positive.
pub fn parse_positive_rounded(value: &str) -> Option<i64> {
    let value = value.trim();
    let parsed = match value.parse::<i64>() {
        Ok(parsed) => parsed,
        Err(_) => {
            let parsed = value.parse::<f64>().ok().filter(|v| v.is_finite())?;
            // `as` saturates, so absurdly large values clamp to i64::MAX.
            parsed.round() as i64
        }
    };
    (parsed > 0).then_some(parsed)
}

/// Quotes each whitespace-separated entry of `value` for embedding in a config array.
pub fn build_filter(value: &str) -> Option<String> {
    let items = value
        .split_whitespace()
        .map(|item| format!("\"{item}\""))
        .collect::<Vec<String>>();
    if items.is_empty() {
        return None;
    }
    Some(items.join(FILTER_SEPARATOR))
}

#[cfg(test)]
pub(crate) fn env_from(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
