use crate::{CategoryCount, RawSnapshot, UserRecord};
use std::collections::HashSet;

/// One roster row with the online flag already resolved against the
/// connected-users set.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub record: UserRecord,
    pub online: bool,
}

/// Derived dashboard state for one poll cycle. Immutable once built.
///
/// `online_users <= total_users` is deliberately NOT enforced: the roster and
/// the connected-users feed are independent sources and may disagree; the
/// divergence stays visible instead of being silently reconciled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewModel {
    pub total_users: usize,
    pub online_users: usize,
    pub top_category: Option<CategoryCount>,
    /// Full distribution behind `top_category`, in source order; the chart
    /// sink consumes it as labels/values.
    pub categories: Vec<CategoryCount>,
    pub rows: Vec<UserRow>,
    pub server_time: Option<i64>,
}

/// Pure derivation from one snapshot to the visible metrics. Deterministic,
/// side-effect free, never fails: every missing source degrades to its
/// empty/None default.
pub fn reconcile(snapshot: &RawSnapshot) -> ViewModel {
    let users = snapshot.users.as_deref().unwrap_or(&[]);
    let connected: HashSet<&str> = snapshot
        .connected
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .map(|c| c.id.as_str())
        .collect();

    let rows = users
        .iter()
        .map(|record| UserRow {
            online: record.online == Some(true) || connected.contains(record.id.as_str()),
            record: record.clone(),
        })
        .collect();

    let categories = snapshot.categories.clone().unwrap_or_default();

    ViewModel {
        total_users: users.len(),
        online_users: snapshot.connected.as_ref().map_or(0, |c| c.len()),
        top_category: top_category(&categories),
        categories,
        rows,
        server_time: snapshot.server_time,
    }
}

/// Left-to-right scan with strictly-greater comparison, so ties keep the
/// first-encountered entry.
fn top_category(counts: &[CategoryCount]) -> Option<CategoryCount> {
    counts
        .iter()
        .fold(None::<&CategoryCount>, |best, cur| match best {
            Some(prev) if cur.count > prev.count => Some(cur),
            Some(prev) => Some(prev),
            None => Some(cur),
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectedUser;
    use std::collections::HashMap;

    fn user(id: &str, online: Option<bool>) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            display_name: format!("user-{id}"),
            email: format!("{id}@example.net"),
            rating: 1000.0,
            category: "human".to_string(),
            group: None,
            online,
            extra: HashMap::new(),
        }
    }

    fn connected(id: &str) -> ConnectedUser {
        ConnectedUser {
            id: id.to_string(),
            extra: HashMap::new(),
        }
    }

    fn count(category: &str, count: u64) -> CategoryCount {
        CategoryCount {
            category: category.to_string(),
            count,
        }
    }

    #[test]
    fn missing_users_source_yields_zero_total_and_no_rows() {
        let snapshot = RawSnapshot {
            connected: Some(vec![connected("1"), connected("2")]),
            ..Default::default()
        };
        let view = reconcile(&snapshot);
        assert_eq!(view.total_users, 0);
        assert!(view.rows.is_empty());
        // Independent sources may disagree; the divergence stays visible.
        assert_eq!(view.online_users, 2);
    }

    #[test]
    fn connected_set_overrides_explicit_offline_flag() {
        let snapshot = RawSnapshot {
            users: Some(vec![user("1", Some(false))]),
            connected: Some(vec![connected("1")]),
            ..Default::default()
        };
        let view = reconcile(&snapshot);
        assert!(view.rows[0].online);
    }

    #[test]
    fn explicit_online_flag_holds_without_set_membership() {
        let snapshot = RawSnapshot {
            users: Some(vec![user("1", Some(true)), user("2", None)]),
            connected: Some(vec![]),
            ..Default::default()
        };
        let view = reconcile(&snapshot);
        assert!(view.rows[0].online);
        assert!(!view.rows[1].online);
    }

    #[test]
    fn top_category_keeps_first_entry_on_ties() {
        let forward = RawSnapshot {
            categories: Some(vec![count("A", 5), count("B", 5)]),
            ..Default::default()
        };
        assert_eq!(
            reconcile(&forward).top_category.unwrap().category,
            "A"
        );

        let reversed = RawSnapshot {
            categories: Some(vec![count("B", 5), count("A", 5)]),
            ..Default::default()
        };
        assert_eq!(
            reconcile(&reversed).top_category.unwrap().category,
            "B"
        );
    }

    #[test]
    fn empty_or_missing_categories_yield_none() {
        assert_eq!(reconcile(&RawSnapshot::default()).top_category, None);
        let empty = RawSnapshot {
            categories: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(reconcile(&empty).top_category, None);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let snapshot = RawSnapshot {
            users: Some(vec![user("1", Some(false)), user("2", None)]),
            connected: Some(vec![connected("1")]),
            server_time: Some(1_700_000_000_000),
            categories: Some(vec![count("X", 3), count("Y", 1)]),
        };
        assert_eq!(reconcile(&snapshot), reconcile(&snapshot));
    }

    #[test]
    fn end_to_end_snapshot_scenario() {
        let snapshot = RawSnapshot {
            users: Some(vec![user("1", Some(false))]),
            connected: Some(vec![connected("1")]),
            server_time: Some(1_700_000_000_000),
            categories: Some(vec![count("X", 3)]),
        };
        let view = reconcile(&snapshot);
        assert_eq!(view.total_users, 1);
        assert_eq!(view.online_users, 1);
        assert_eq!(view.top_category, Some(count("X", 3)));
        assert_eq!(view.rows.len(), 1);
        assert!(view.rows[0].online);
        assert_eq!(view.server_time, Some(1_700_000_000_000));
    }

    #[test]
    fn all_sources_failed_degrades_to_defaults() {
        let view = reconcile(&RawSnapshot::default());
        assert_eq!(view.total_users, 0);
        assert_eq!(view.online_users, 0);
        assert_eq!(view.top_category, None);
        assert!(view.rows.is_empty());
        assert_eq!(view.server_time, None);
    }
}
