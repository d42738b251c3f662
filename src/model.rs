use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One row of a ranking table. Cell text is kept verbatim (trimmed), `rank`
/// isn't guaranteed to be numeric or contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub rank: String,
    pub name: String,
    pub assoc: String,
    pub points: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Men,
    Women,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Men => "men",
            Category::Women => "women",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single category extraction settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    Records(Vec<RankingRecord>),
    Empty,
    Failed(String),
}

impl CategoryOutcome {
    pub fn from_records(records: Vec<RankingRecord>) -> Self {
        if records.is_empty() {
            CategoryOutcome::Empty
        } else {
            CategoryOutcome::Records(records)
        }
    }

    pub fn has_records(&self) -> bool {
        matches!(self, CategoryOutcome::Records(_))
    }

    /// Collapses to the plain list the response carries. Failures read as empty.
    pub fn into_records(self) -> Vec<RankingRecord> {
        match self {
            CategoryOutcome::Records(records) => records,
            CategoryOutcome::Empty | CategoryOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Both categories from one complete scrape. This is what gets cached and
/// what a 200 response carries as its body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub men: Vec<RankingRecord>,
    pub women: Vec<RankingRecord>,
}

impl Snapshot {
    pub fn from_outcomes(men: CategoryOutcome, women: CategoryOutcome) -> Self {
        Self {
            men: men.into_records(),
            women: women.into_records(),
        }
    }
}

/// The envelope handed back to whatever invoked the scrape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl Response {
    fn new(status_code: u16, body: Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), crate::CONTENT_TYPE_JSON.to_string());
        headers.insert("Access-Control-Allow-Origin".to_string(), "*".to_string());
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn ok(snapshot: &Snapshot) -> crate::Result<Self> {
        Ok(Self::new(200, serde_json::to_value(snapshot)?))
    }

    pub fn no_data() -> Self {
        Self::new(404, json!({ "message": crate::Error::NoData.to_string() }))
    }

    pub fn error(message: impl fmt::Display) -> Self {
        Self::new(500, json!({ "error": message.to_string() }))
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
