//! Request parameters (the submitted report options form).
//!
//! Parameters are plain key/value pairs. A key may repeat (multi-select
//! filters); PHP-style `name[]` keys are folded into `name`.
//!
//! | Parameter              | Meaning                                     |
//! |------------------------|---------------------------------------------|
//! | `report_format`        | `pdf`, `html`, `html-no-headers`, `xls`, `doc` |
//! | `page_orientation`     | `L` or `P`                                  |
//! | `paper_size`           | `A4` or `A3`                                |
//! | `report_mode`          | `summary` for the one-row-per-group table   |
//! | `grouping_level`       | number of grouping levels to apply          |
//! | `grouping_<n>_newpage` | `1` to start each level `n` group on a new page |
//! | `ignored_fields`       | comma-separated fields hidden from tables   |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{ReportError, ReportResult};

static NEWPAGE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^grouping_(\d+)_newpage$").expect("valid newpage pattern"));

/// A single value or a list, as accepted from JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

/// Key/value request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, ParamValue>")]
pub struct RequestParams {
    values: BTreeMap<String, Vec<String>>,
}

impl From<BTreeMap<String, ParamValue>> for RequestParams {
    fn from(map: BTreeMap<String, ParamValue>) -> Self {
        let mut params = Self::default();
        for (key, value) in map {
            match value {
                ParamValue::One(v) => params.insert(key, v),
                ParamValue::Many(vs) => {
                    for v in vs {
                        params.insert(key.clone(), v);
                    }
                }
            }
        }
        params
    }
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build parameters from key/value pairs, keeping repeated keys.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (k, v) in pairs {
            params.insert(k, v);
        }
        params
    }

    /// Add a value. Repeated keys accumulate.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let key = key.strip_suffix("[]").map(str::to_string).unwrap_or(key);
        self.values.entry(key).or_default().push(value.into());
    }

    /// First value of a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|vs| vs.first())
            .map(String::as_str)
    }

    /// All values of a key, skipping blanks.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.values
            .get(key)
            .map(|vs| {
                vs.iter()
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First non-blank value of a key.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Whether a checkbox-style parameter is set to `1`.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.trim() == "1")
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Parse a parameter, falling back to the type's default when absent.
    pub fn parse_or_default<T>(&self, key: &str) -> ReportResult<T>
    where
        T: FromStr<Err = ReportError> + Default,
    {
        match self.get_non_empty(key) {
            Some(v) => v.parse(),
            None => Ok(T::default()),
        }
    }

    /// Comma-separated list parameter, also accepting repeated keys.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get_all(key)
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect()
    }

    /// Grouping levels (1-based) whose groups start on a new page.
    pub fn page_break_levels(&self) -> Vec<usize> {
        let mut levels: Vec<usize> = self
            .values
            .keys()
            .filter_map(|k| NEWPAGE_PARAM.captures(k))
            .filter_map(|c| c[1].parse::<usize>().ok())
            .filter(|level| self.is_set(&format!("grouping_{level}_newpage")))
            .collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    /// Number of grouping levels requested, if limited.
    pub fn grouping_level(&self) -> ReportResult<Option<usize>> {
        self.get_non_empty("grouping_level")
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|_| ReportError::invalid_param("grouping_level", v))
            })
            .transpose()
    }

    /// Whether the summary table was requested instead of nested groups.
    pub fn summary_mode(&self) -> ReportResult<bool> {
        match self.get_non_empty("report_mode") {
            None => Ok(false),
            Some(v) if v.eq_ignore_ascii_case("summary") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("grouped") || v.eq_ignore_ascii_case("detail") => {
                Ok(false)
            }
            Some(v) => Err(ReportError::invalid_param("report_mode", v)),
        }
    }
}
