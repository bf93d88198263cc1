use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use super::SessionStore;
use crate::db::queries;
use crate::errors::ClientError;

pub struct SqliteSessionStore {
    db: Arc<Mutex<Connection>>,
    session_id: String,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<Mutex<Connection>>, session_id: impl Into<String>) -> Self {
        Self {
            db,
            session_id: session_id.into(),
        }
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        Ok(queries::get_entry(&db, &self.session_id, key)?)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        queries::put_entry(&db, &self.session_id, key, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        queries::delete_entry(&db, &self.session_id, key)?;
        Ok(())
    }
}
