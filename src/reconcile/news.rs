//! News merges by `(title, date)`.

use crate::model::{NewsPayload, NewsRecord};
use crate::storage::{NewsRepository, StorageError};

use super::{MergeTarget, Mergeable};

impl Mergeable for NewsRecord {
    const COLLECTION: &'static str = "news";

    type Key = (String, i64);
    type Remote = NewsPayload;

    fn key(&self) -> (String, i64) {
        (self.title.clone(), self.date)
    }

    fn remote_key(remote: &NewsPayload) -> (String, i64) {
        (remote.title.clone(), remote.date)
    }

    fn content_equals(&self, remote: &NewsPayload) -> bool {
        self.title == remote.title
            && self.date == remote.date
            && self.url == remote.url
            && self.tldr == remote.tldr
    }

    fn local_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl MergeTarget<NewsRecord> for NewsRepository {
    fn load_local(&self) -> Result<Vec<NewsRecord>, StorageError> {
        self.get_all()
    }

    fn insert_remote(&self, remote: &NewsPayload) -> Result<(), StorageError> {
        self.add(remote.to_record(None)).map(drop)
    }

    fn update_remote(&self, id: &str, remote: &NewsPayload) -> Result<(), StorageError> {
        self.update(&remote.to_record(Some(id.to_string())))
    }

    fn delete_local(&self, id: &str) -> Result<(), StorageError> {
        self.delete(id).map(drop)
    }
}
