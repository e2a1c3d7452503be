use shared::protocol::RouteChange;

use crate::route_table::{snapshots, ResolvedRoute};

/// Partition of a transition between two route lists.
#[derive(Debug, Clone, Default)]
pub struct NavigationDiff {
    pub removed: Vec<ResolvedRoute>,
    pub added: Vec<ResolvedRoute>,
    /// Routes that go under a new top. Only the previous top, except on a
    /// first navigation where everything below the new top is stacked.
    pub stacked: Vec<ResolvedRoute>,
    /// The new top when it was already present under the previous top.
    pub unstacked: Vec<ResolvedRoute>,
    /// Routes kept across the transition whose data changed.
    pub modified: Vec<ResolvedRoute>,
}

impl NavigationDiff {
    pub fn compute(previous: &[ResolvedRoute], current: &[ResolvedRoute]) -> Self {
        let removed = missing_from(previous, current);
        let added = missing_from(current, previous);

        let mut stacked = Vec::new();
        let mut unstacked = Vec::new();
        match (previous.last(), current.last()) {
            (None, Some(_)) => {
                stacked.extend(current[..current.len() - 1].iter().cloned());
            }
            (Some(old_top), Some(new_top)) => {
                if let Some(route) = current
                    .iter()
                    .find(|r| r.name() == old_top.name() && r.source_index < new_top.source_index)
                {
                    stacked.push(route.clone());
                }
                if previous
                    .iter()
                    .any(|r| r.name() == new_top.name() && r.source_index < old_top.source_index)
                {
                    unstacked.push(new_top.clone());
                }
            }
            _ => {}
        }

        let modified = current
            .iter()
            .filter(|route| {
                !contains(&stacked, route.name())
                    && !contains(&unstacked, route.name())
                    && previous
                        .iter()
                        .find(|old| old.name() == route.name())
                        .is_some_and(|old| old.data != route.data)
            })
            .cloned()
            .collect();

        Self {
            removed,
            added,
            stacked,
            unstacked,
            modified,
        }
    }

    pub fn to_change(&self, previous: &[ResolvedRoute], current: &[ResolvedRoute]) -> RouteChange {
        RouteChange {
            previous: snapshots(previous),
            current: snapshots(current),
            removed: snapshots(&self.removed),
            added: snapshots(&self.added),
            stacked: snapshots(&self.stacked),
            unstacked: snapshots(&self.unstacked),
            modified: snapshots(&self.modified),
        }
    }
}

fn contains(routes: &[ResolvedRoute], name: &str) -> bool {
    routes.iter().any(|route| route.name() == name)
}

/// Routes of `left` whose name does not appear in `right`.
fn missing_from(left: &[ResolvedRoute], right: &[ResolvedRoute]) -> Vec<ResolvedRoute> {
    left.iter()
        .filter(|route| !contains(right, route.name()))
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "tests/diff_tests.rs"]
mod tests;
