use serde::{Deserialize, Serialize};

use crate::{
    manifest::storage::{PostgresDetails, WriterDetails},
    writer::WriterSettings,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub postgres: PostgresDetails,

    #[serde(default)]
    pub writer: WriterDetails,
}

impl Manifest {
    pub fn writer_settings(&self) -> WriterSettings {
        WriterSettings {
            batch_size: self.writer.batch_size,
            identity_salt: self.writer.identity_salt.clone(),
        }
    }
}
