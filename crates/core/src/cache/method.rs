//! Transform method labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::Error;

/// Which transform produced (or should produce) an artifact.
///
/// Part of the cache key: the same input is cached once per method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Crocodile,
    Dolphin,
    Grizzly,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Crocodile, Method::Dolphin, Method::Grizzly];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Crocodile => "crocodile",
            Method::Dolphin => "dolphin",
            Method::Grizzly => "grizzly",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidMethod(s.to_string()))
    }
}

impl ToSql for Method {
    fn to_sql(&self) -> tokio_rusqlite::rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Method {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: Error| FromSqlError::Other(e.to_string().into()))
    }
}
