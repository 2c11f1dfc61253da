use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Cloud drive a file or folder was listed from. The pair `(provider, id)`
/// identifies a file globally; ids from different providers never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gdrive,
    Onedrive,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gdrive => "gdrive",
            Provider::Onedrive => "onedrive",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gdrive" => Ok(Provider::Gdrive),
            "onedrive" => Ok(Provider::Onedrive),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
