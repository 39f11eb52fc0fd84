use std::fmt;

use serde::{Deserialize, Serialize};

pub mod msg;

/// Top-level family a statistics point belongs to. Selects the endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Event,
    Usage,
    Configuration,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Event => "event",
            Category::Usage => "usage",
            Category::Configuration => "configuration",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
