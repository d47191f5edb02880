//! Step storage: steps ordered by position, and the links hanging off them.
//!
//! Links are never touched on their own. They are written together with their
//! step, inside the same transaction, and the foreign key removes them when the
//! step goes away.

use rusqlite::{Row, types::Value};

use crate::identity::id_if_absent;
use crate::model::{StepLinkRecord, StepRecord, StepWithLinks};

use super::{
    Record, Repository, Result, StorageError, insert_row, query_one, query_rows, update_row,
};

impl Record for StepRecord {
    const TABLE: &'static str = "steps";
    const COLUMNS: &'static [&'static str] =
        &["position", "title", "description", "completed", "possible_date"];
    const ORDER_BY: Option<&'static str> = Some("position ASC");

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
            Value::from(self.position),
            Value::from(self.title.clone()),
            Value::from(self.description.clone()),
            Value::from(self.completed),
            Value::from(self.possible_date.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            position: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            completed: row.get(4)?,
            possible_date: row.get(5)?,
        })
    }
}

impl Record for StepLinkRecord {
    const TABLE: &'static str = "links";
    const COLUMNS: &'static [&'static str] = &["step_id", "title", "url"];
    // Insertion order is the display order.
    const ORDER_BY: Option<&'static str> = Some("rowid ASC");

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
            Value::from(self.step_id.clone()),
            Value::from(self.title.clone()),
            Value::from(self.url.clone()),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            step_id: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
        })
    }
}

impl Repository<StepRecord> {
    /// Returns the step at `position`, if any.
    pub fn get_by_position(&self, position: i64) -> Result<Option<StepRecord>> {
        let conn = self.lock()?;
        query_one(&conn, "position = ?1", [position])
    }

    /// Returns the links of the step at `position`, empty if there is no such step.
    pub fn get_links_by_position(&self, position: i64) -> Result<Vec<StepLinkRecord>> {
        let conn = self.lock()?;
        query_rows(
            &conn,
            Some("step_id IN (SELECT id FROM steps WHERE position = ?1)"),
            [position],
        )
    }

    /// Returns every step paired with its links, ordered by position.
    pub fn get_all_with_links(&self) -> Result<Vec<StepWithLinks>> {
        let conn = self.lock()?;
        let steps: Vec<StepRecord> = query_rows(&conn, None, [])?;
        let mut links: Vec<StepLinkRecord> = query_rows(&conn, None, [])?;

        let mut result = Vec::with_capacity(steps.len());
        for step in steps {
            let id = step.id.as_deref().unwrap_or_default();
            let (own, rest): (Vec<_>, Vec<_>) = links.into_iter().partition(|l| l.step_id == id);
            links = rest;
            result.push(StepWithLinks { step, links: own });
        }
        Ok(result)
    }

    /// Number of steps.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM steps", [], |row| row.get(0))?;
        usize::try_from(n).map_err(|e| StorageError::Corrupt(format!("step count: {e}")))
    }

    /// Number of completed steps.
    pub fn count_completed(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM steps WHERE completed != 0",
            [],
            |row| row.get(0),
        )?;
        usize::try_from(n).map_err(|e| StorageError::Corrupt(format!("completed count: {e}")))
    }

    /// Inserts a step and its links in one transaction.
    ///
    /// The links' `step_id` is overwritten with the step's identifier.
    pub fn insert_with_links(
        &self,
        step: StepRecord,
        links: Vec<StepLinkRecord>,
    ) -> Result<StepWithLinks> {
        let step = step.prepare();
        let links = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            insert_row(&tx, &step)?;
            let links = insert_links(&tx, &step, links)?;
            tx.commit()?;
            links
        };
        self.notify();
        Ok(StepWithLinks { step, links })
    }

    /// Updates a step and replaces all of its links in one transaction.
    pub fn update_with_links(
        &self,
        step: StepRecord,
        links: Vec<StepLinkRecord>,
    ) -> Result<StepWithLinks> {
        let links = {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            update_row(&tx, &step)?;
            tx.execute("DELETE FROM links WHERE step_id = ?1", [step.id.as_deref()])?;
            let links = insert_links(&tx, &step, links)?;
            tx.commit()?;
            links
        };
        self.notify();
        Ok(StepWithLinks { step, links })
    }
}

fn insert_links(
    conn: &rusqlite::Connection,
    step: &StepRecord,
    links: Vec<StepLinkRecord>,
) -> Result<Vec<StepLinkRecord>> {
    let step_id = step
        .id
        .clone()
        .ok_or(StorageError::MissingId(StepRecord::TABLE))?;
    links
        .into_iter()
        .map(|link| {
            let link = StepLinkRecord {
                step_id: step_id.clone(),
                ..link
            }
            .prepare();
            insert_row(conn, &link)?;
            Ok(link)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::storage::tests::test_replica;

    use super::*;

    fn step(position: i64, title: &str, completed: bool) -> StepRecord {
        StepRecord {
            id: None,
            position,
            title: title.into(),
            description: format!("{title} description"),
            completed,
            possible_date: "2016".into(),
        }
    }

    fn link(title: &str) -> StepLinkRecord {
        StepLinkRecord {
            id: None,
            step_id: String::new(),
            title: title.into(),
            url: format!("https://example.org/{title}"),
        }
    }

    #[test]
    fn get_all_orders_by_position() {
        let (_dir, replica) = test_replica();

        // Insert out of order to verify sorting.
        replica.steps.add(step(3, "Third", false)).unwrap();
        replica.steps.add(step(1, "First", true)).unwrap();
        replica.steps.add(step(2, "Second", false)).unwrap();

        let titles: Vec<_> = replica
            .steps
            .get_all()
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, ["First", "Second", "Third"]);
    }

    #[test]
    fn duplicate_position_is_rejected() {
        let (_dir, replica) = test_replica();
        replica.steps.add(step(1, "A", false)).unwrap();

        assert!(replica.steps.add(step(1, "B", false)).is_err());
    }

    #[test]
    fn insert_with_links_assigns_owner() {
        let (_dir, replica) = test_replica();

        let stored = replica
            .steps
            .insert_with_links(step(1, "A", false), vec![link("x"), link("y")])
            .unwrap();

        let step_id = stored.step.id.clone().unwrap();
        assert!(stored.links.iter().all(|l| l.step_id == step_id));
        assert_eq!(replica.steps.get_links_by_position(1).unwrap(), stored.links);
    }

    #[test]
    fn update_with_links_replaces_links() {
        let (_dir, replica) = test_replica();
        let stored = replica
            .steps
            .insert_with_links(step(1, "A", false), vec![link("x"), link("y")])
            .unwrap();

        let mut changed = stored.step.clone();
        changed.title = "A2".into();
        replica
            .steps
            .update_with_links(changed, vec![link("z")])
            .unwrap();

        let links = replica.steps.get_links_by_position(1).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "z");
        let loaded = replica.steps.get_by_position(1).unwrap().unwrap();
        assert_eq!(loaded.title, "A2");
        assert_eq!(loaded.id, stored.step.id);
    }

    #[test]
    fn update_with_links_on_missing_step_leaves_links_alone() {
        let (_dir, replica) = test_replica();
        replica
            .steps
            .insert_with_links(step(1, "A", false), vec![link("x")])
            .unwrap();

        let mut ghost = step(9, "Ghost", false);
        ghost.id = Some("ghost".into());
        let err = replica
            .steps
            .update_with_links(ghost, vec![link("y")])
            .unwrap_err();

        assert!(matches!(err, StorageError::NotFound { .. }));
        assert_eq!(replica.steps.get_links_by_position(1).unwrap().len(), 1);
    }

    #[test]
    fn deleting_a_step_removes_its_links() {
        let (_dir, replica) = test_replica();
        let stored = replica
            .steps
            .insert_with_links(step(1, "A", false), vec![link("x")])
            .unwrap();

        replica
            .steps
            .delete(stored.step.id.as_deref().unwrap())
            .unwrap();

        assert!(replica.steps.get_links_by_position(1).unwrap().is_empty());
        assert!(replica.steps.get_all_with_links().unwrap().is_empty());
    }

    #[test]
    fn get_all_with_links_groups_by_step() {
        let (_dir, replica) = test_replica();
        replica
            .steps
            .insert_with_links(step(2, "B", false), vec![link("b1")])
            .unwrap();
        replica
            .steps
            .insert_with_links(step(1, "A", false), vec![link("a1"), link("a2")])
            .unwrap();
        replica.steps.add(step(3, "C", false)).unwrap();

        let all = replica.steps.get_all_with_links().unwrap();

        let shape: Vec<_> = all
            .iter()
            .map(|s| {
                (
                    s.step.position,
                    s.links.iter().map(|l| l.title.as_str()).collect::<Vec<_>>(),
                )
            })
            .collect();
        assert_eq!(
            shape,
            vec![(1, vec!["a1", "a2"]), (2, vec!["b1"]), (3, vec![])]
        );
    }

    #[test]
    fn counts_total_and_completed() {
        let (_dir, replica) = test_replica();
        replica.steps.add(step(1, "A", true)).unwrap();
        replica.steps.add(step(2, "B", true)).unwrap();
        replica.steps.add(step(3, "C", false)).unwrap();

        assert_eq!(replica.steps.count().unwrap(), 3);
        assert_eq!(replica.steps.count_completed().unwrap(), 2);
    }

    #[test]
    fn get_by_position_missing_is_none() {
        let (_dir, replica) = test_replica();

        assert_eq!(replica.steps.get_by_position(7).unwrap(), None);
        assert!(replica.steps.get_links_by_position(7).unwrap().is_empty());
    }
}
