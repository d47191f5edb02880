//! Steps merge by position. Links belong to the step's content: a changed
//! link list makes the step differ, and an update rewrites the links.

use crate::model::{StepPayload, StepWithLinks};
use crate::storage::{StepsRepository, StorageError};

use super::{MergeTarget, Mergeable};

impl Mergeable for StepWithLinks {
    const COLLECTION: &'static str = "steps";

    type Key = i64;
    type Remote = StepPayload;

    fn key(&self) -> i64 {
        self.step.position
    }

    fn remote_key(remote: &StepPayload) -> i64 {
        remote.position
    }

    fn content_equals(&self, remote: &StepPayload) -> bool {
        let step = &self.step;
        step.position == remote.position
            && step.title == remote.title
            && step.description == remote.description
            && step.completed == remote.completed
            && step.possible_date == remote.possible_date
            && self.links.len() == remote.links.len()
            && self
                .links
                .iter()
                .zip(&remote.links)
                .all(|(local, remote)| local.title == remote.title && local.url == remote.url)
    }

    fn local_id(&self) -> Option<&str> {
        self.step.id.as_deref()
    }
}

impl MergeTarget<StepWithLinks> for StepsRepository {
    fn load_local(&self) -> Result<Vec<StepWithLinks>, StorageError> {
        self.get_all_with_links()
    }

    fn insert_remote(&self, remote: &StepPayload) -> Result<(), StorageError> {
        self.insert_with_links(remote.to_record(None), remote.link_records(""))
            .map(drop)
    }

    fn update_remote(&self, id: &str, remote: &StepPayload) -> Result<(), StorageError> {
        self.update_with_links(remote.to_record(Some(id.to_string())), remote.link_records(id))
            .map(drop)
    }

    fn delete_local(&self, id: &str) -> Result<(), StorageError> {
        self.delete(id).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::LinkPayload;
    use crate::reconcile::{Applied, reconcile};
    use crate::storage::tests::test_replica;

    use super::*;

    fn payload(position: i64, title: &str, links: &[&str]) -> StepPayload {
        StepPayload {
            title: title.into(),
            description: "D".into(),
            possible_date: "2016".into(),
            position,
            completed: false,
            links: links
                .iter()
                .map(|t| LinkPayload {
                    title: (*t).into(),
                    url: format!("https://example.org/{t}"),
                })
                .collect(),
        }
    }

    fn titles(repo: &StepsRepository) -> Vec<(i64, String)> {
        repo.get_all()
            .unwrap()
            .into_iter()
            .map(|s| (s.position, s.title))
            .collect()
    }

    #[test]
    fn first_sync_inserts_everything() {
        let (_dir, replica) = test_replica();

        let applied = reconcile::<StepWithLinks, _>(
            &*replica.steps,
            vec![payload(1, "A", &["a"]), payload(2, "B", &[])],
        )
        .unwrap();

        assert_eq!(applied.inserted, 2);
        assert_eq!(titles(&replica.steps), vec![(1, "A".into()), (2, "B".into())]);
        assert_eq!(replica.steps.get_links_by_position(1).unwrap().len(), 1);
    }

    #[test]
    fn update_insert_delete_keeps_surviving_identifiers() {
        let (_dir, replica) = test_replica();
        reconcile::<StepWithLinks, _>(
            &*replica.steps,
            vec![payload(1, "A", &[]), payload(2, "B", &[]), payload(3, "C", &[])],
        )
        .unwrap();
        let before = replica.steps.get_by_position(2).unwrap().unwrap();

        let applied = reconcile::<StepWithLinks, _>(
            &*replica.steps,
            vec![payload(2, "B2", &[]), payload(4, "D", &[])],
        )
        .unwrap();

        assert_eq!(
            applied,
            Applied {
                inserted: 1,
                updated: 1,
                deleted: 2,
            }
        );
        assert_eq!(titles(&replica.steps), vec![(2, "B2".into()), (4, "D".into())]);
        let after = replica.steps.get_by_position(2).unwrap().unwrap();
        assert_eq!(after.id, before.id);
    }

    #[test]
    fn changed_links_count_as_a_content_change() {
        let (_dir, replica) = test_replica();
        reconcile::<StepWithLinks, _>(&*replica.steps, vec![payload(1, "A", &["x"])]).unwrap();

        let applied =
            reconcile::<StepWithLinks, _>(&*replica.steps, vec![payload(1, "A", &["x", "y"])])
                .unwrap();

        assert_eq!(applied.updated, 1);
        let links: Vec<_> = replica
            .steps
            .get_links_by_position(1)
            .unwrap()
            .into_iter()
            .map(|l| l.title)
            .collect();
        assert_eq!(links, ["x", "y"]);
    }

    #[test]
    fn unchanged_payload_touches_nothing() {
        let (_dir, replica) = test_replica();
        let incoming = vec![payload(1, "A", &["x"]), payload(2, "B", &[])];
        reconcile::<StepWithLinks, _>(&*replica.steps, incoming.clone()).unwrap();
        let link_ids: Vec<_> = replica
            .steps
            .get_links_by_position(1)
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();

        let applied = reconcile::<StepWithLinks, _>(&*replica.steps, incoming).unwrap();

        assert!(applied.is_empty());
        let again: Vec<_> = replica
            .steps
            .get_links_by_position(1)
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(again, link_ids);
    }
}
