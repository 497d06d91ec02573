//! Structural diff between the previous and current event mappings.
use crate::model::{EventMap, EventRecord};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub old: EventRecord,
    pub new: EventRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: EventMap,
    pub removed: EventMap,
    pub changed: BTreeMap<String, Change>,
    pub unchanged: EventMap,
}

impl Diff {
    /// True when there is something worth notifying about.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty())
    }
}

pub fn diff(old: &EventMap, new: &EventMap) -> Diff {
    let mut out = Diff::default();

    for (id, new_rec) in new {
        match old.get(id) {
            None => {
                out.added.insert(id.clone(), new_rec.clone());
            }
            Some(old_rec) if old_rec == new_rec => {
                out.unchanged.insert(id.clone(), new_rec.clone());
            }
            Some(old_rec) => {
                out.changed.insert(
                    id.clone(),
                    Change {
                        old: old_rec.clone(),
                        new: new_rec.clone(),
                    },
                );
            }
        }
    }

    for (id, old_rec) in old {
        if !new.contains_key(id) {
            out.removed.insert(id.clone(), old_rec.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskType;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn rec(day: u32, task_type: TaskType, cleaner: Option<&str>) -> EventRecord {
        EventRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            task_type,
            assigned_cleaner: cleaner.map(str::to_string),
        }
    }

    fn ids<V>(m: &BTreeMap<String, V>) -> BTreeSet<String> {
        m.keys().cloned().collect()
    }

    #[test]
    fn empty_inputs() {
        let d = diff(&EventMap::new(), &EventMap::new());
        assert_eq!(d, Diff::default());
        assert!(!d.has_changes());
    }

    #[test]
    fn no_previous_state_is_all_added() {
        let mut new = EventMap::new();
        new.insert("P-01012025".into(), rec(1, TaskType::CheckinNotSameDay, None));
        let d = diff(&EventMap::new(), &new);
        assert_eq!(d.added.len(), 1);
        assert!(d.added.contains_key("P-01012025"));
        assert!(d.removed.is_empty() && d.changed.is_empty() && d.unchanged.is_empty());
    }

    #[test]
    fn cleaner_reassignment_is_a_change() {
        let mut old = EventMap::new();
        old.insert("P-01012025".into(), rec(1, TaskType::CheckinNotSameDay, Some("A")));
        let mut new = EventMap::new();
        new.insert("P-01012025".into(), rec(1, TaskType::CheckinNotSameDay, Some("B")));

        let d = diff(&old, &new);
        assert!(d.added.is_empty() && d.removed.is_empty() && d.unchanged.is_empty());
        let c = &d.changed["P-01012025"];
        assert_eq!(c.old.assigned_cleaner.as_deref(), Some("A"));
        assert_eq!(c.new.assigned_cleaner.as_deref(), Some("B"));
    }

    #[test]
    fn identical_maps_are_unchanged() {
        let mut x = EventMap::new();
        x.insert("a".into(), rec(2, TaskType::CheckinSameDay, Some("A")));
        x.insert("b".into(), rec(9, TaskType::CheckinNotSameDay, None));
        let d = diff(&x, &x);
        assert!(!d.has_changes());
        assert_eq!(d.unchanged, x);
    }

    #[test]
    fn categories_partition_union_of_ids() {
        let mut old = EventMap::new();
        old.insert("keep".into(), rec(3, TaskType::CheckinSameDay, None));
        old.insert("gone".into(), rec(4, TaskType::CheckinSameDay, None));
        old.insert("flip".into(), rec(5, TaskType::CheckinSameDay, None));
        let mut new = EventMap::new();
        new.insert("keep".into(), rec(3, TaskType::CheckinSameDay, None));
        new.insert("flip".into(), rec(5, TaskType::CheckinNotSameDay, None));
        new.insert("fresh".into(), rec(6, TaskType::CheckinNotSameDay, None));

        let d = diff(&old, &new);
        let all: BTreeSet<String> = ids(&old).union(&ids(&new)).cloned().collect();
        let parts = [ids(&d.added), ids(&d.removed), ids(&d.changed), ids(&d.unchanged)];
        let total: usize = parts.iter().map(BTreeSet::len).sum();
        let joined: BTreeSet<String> = parts.iter().flatten().cloned().collect();
        assert_eq!(total, all.len());
        assert_eq!(joined, all);
        assert!(d.removed.contains_key("gone"));
        assert!(d.added.contains_key("fresh"));
        assert!(d.changed.contains_key("flip"));
    }
}
