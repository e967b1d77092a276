use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PostgresDetails {
    /// Falls back to `DATABASE_URL` when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Schema to resolve destination tables in, `current_schema()` when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_ssl: Option<bool>,
}

impl PostgresDetails {
    pub fn disable_ssl(&self) -> bool {
        self.disable_ssl.unwrap_or(false)
    }
}

fn default_batch_size() -> usize {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WriterDetails {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub identity_salt: String,
}

impl Default for WriterDetails {
    fn default() -> Self {
        WriterDetails { batch_size: default_batch_size(), identity_salt: String::new() }
    }
}
