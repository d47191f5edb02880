//! Registration token storage.

use rusqlite::{Row, types::Value};

use crate::identity::timestamp_if_absent;
use crate::model::RegistrationRecord;

use super::{Record, Repository, Result};

impl Record for RegistrationRecord {
    const TABLE: &'static str = "registrations";
    const KEY: &'static str = "token";
    const COLUMNS: &'static [&'static str] = &["time_created"];

    fn id(&self) -> Option<&str> {
        Some(&self.token)
    }

    fn prepare(self) -> Self {
        Self {
            time_created: Some(timestamp_if_absent(self.time_created)),
            ..self
        }
    }

    fn bind(&self) -> Vec<Value> {
        vec![Value::from(self.time_created)]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            token: row.get(0)?,
            time_created: row.get(1)?,
        })
    }
}

impl Repository<RegistrationRecord> {
    /// Returns the registration for `token`, if it was ever recorded.
    pub fn get_by_token(&self, token: &str) -> Result<Option<RegistrationRecord>> {
        self.get(token)
    }
}
