//! Pipeline problem domain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The problem domain a pipeline run targets.
///
/// Used only as a namespace tag: sessions are tagged with it, and knowledge
/// records are partitioned by it. Unknown domains are preserved verbatim
/// (lowercased) in [`Domain::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Domain {
    Web,
    Mobile,
    Data,
    Backend,
    Infra,
    Other(String),
}

impl Domain {
    /// The canonical string form stored on disk.
    pub fn as_str(&self) -> &str {
        match self {
            Domain::Web => "web",
            Domain::Mobile => "mobile",
            Domain::Data => "data",
            Domain::Backend => "backend",
            Domain::Infra => "infra",
            Domain::Other(name) => name,
        }
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "web" => Domain::Web,
            "mobile" => Domain::Mobile,
            "data" => Domain::Data,
            "backend" => Domain::Backend,
            "infra" => Domain::Infra,
            _ => Domain::Other(normalized),
        }
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Domain::from(s.as_str())
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> Self {
        d.as_str().to_string()
    }
}

impl FromStr for Domain {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Domain::from(s))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
