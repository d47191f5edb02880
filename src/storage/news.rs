//! News storage.

use rusqlite::{Row, types::Value};

use crate::identity::id_if_absent;
use crate::model::NewsRecord;

use super::Record;

impl Record for NewsRecord {
    const TABLE: &'static str = "news";
    const COLUMNS: &'static [&'static str] = &["title", "url", "date", "tldr"];
    const ORDER_BY: Option<&'static str> = Some("date DESC, title ASC");

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn prepare(self) -> Self {
        Self {
            id: Some(id_if_absent(self.id)),
            ..self
        }
    }

    fn bind(&self) -> Vec<Value> {
        vec![
            Value::from(self.title.clone()),
            Value::from(self.url.clone()),
            Value::from(self.date),
            Value::from(self.tldr.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            url: row.get(2)?,
            date: row.get(3)?,
            tldr: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::tests::test_replica;

    use super::*;

    #[test]
    fn optional_summary_round_trips() {
        let (_dir, replica) = test_replica();

        let with = replica
            .news
            .add(NewsRecord {
                id: None,
                title: "With".into(),
                url: "https://example.org/1".into(),
                date: 1,
                tldr: Some("short".into()),
            })
            .unwrap();
        let without = replica
            .news
            .add(NewsRecord {
                id: None,
                title: "Without".into(),
                url: "https://example.org/2".into(),
                date: 2,
                tldr: None,
            })
            .unwrap();

        assert_eq!(replica.news.get_all().unwrap(), vec![without, with]);
    }

    #[test]
    fn newest_first() {
        let (_dir, replica) = test_replica();
        for (title, date) in [("Old", 1), ("New", 3), ("B", 2), ("A", 2)] {
            replica
                .news
                .add(NewsRecord {
                    id: None,
                    title: title.into(),
                    url: "https://example.org".into(),
                    date,
                    tldr: None,
                })
                .unwrap();
        }

        let titles: Vec<_> = replica
            .news
            .get_all()
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, ["New", "A", "B", "Old"]);
    }

    #[test]
    fn same_title_and_date_is_rejected() {
        let (_dir, replica) = test_replica();
        let news = NewsRecord {
            id: None,
            title: "T".into(),
            url: "https://example.org".into(),
            date: 1,
            tldr: None,
        };

        replica.news.add(news.clone()).unwrap();

        assert!(replica.news.add(news).is_err());
    }
}
