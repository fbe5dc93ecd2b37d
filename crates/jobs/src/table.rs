use crate::error::{Error, ErrorKind, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").unwrap());

/// Name of a job table.
///
/// Table names end up inside SQL text (identifiers can't be bound as
/// parameters), so the only way to get one is through validation: a letter or
/// underscore followed by up to 63 letters, digits or underscores.
///
/// ```
/// use stow_jobs::TableName;
///
/// assert!(TableName::new("scans_2016").is_ok());
/// assert!(TableName::new("scans; DROP TABLE x").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !IDENTIFIER.is_match(&name) {
            exn::bail!(ErrorKind::InvalidTable(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
