//! Assembling flat department rows into trees

use std::collections::{HashMap, HashSet, VecDeque};

use super::path;
use crate::entity::department::{Department, DepartmentNode};

/// Children grouped by parent id, siblings in row order
fn group_by_parent(rows: Vec<Department>) -> (Vec<Department>, HashMap<i64, Vec<Department>>) {
    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<Department>> = HashMap::new();
    for row in rows {
        match row.parent_id {
            Some(parent_id) => children.entry(parent_id).or_default().push(row),
            None => roots.push(row),
        }
    }
    (roots, children)
}

fn attach(
    dept: Department,
    children: &mut HashMap<i64, Vec<Department>>,
    counts: &HashMap<i64, u64>,
) -> DepartmentNode {
    // Removing the entry means a corrupted cycle cannot recurse forever
    let kids = children.remove(&dept.id).unwrap_or_default();
    let mut node = DepartmentNode::from(dept);
    node.employee_count = counts.get(&node.department.id).copied().unwrap_or(0);
    node.children = kids
        .into_iter()
        .map(|kid| attach(kid, children, counts))
        .collect();
    node
}

/// Build the forest rooted at every department without a parent
pub fn build_forest(rows: Vec<Department>, counts: &HashMap<i64, u64>) -> Vec<DepartmentNode> {
    let (roots, mut children) = group_by_parent(rows);
    roots
        .into_iter()
        .map(|root| attach(root, &mut children, counts))
        .collect()
}

/// Build the tree rooted at `root_id` from a set of rows containing it
pub fn build_subtree(
    root_id: i64,
    rows: Vec<Department>,
    counts: &HashMap<i64, u64>,
) -> Option<DepartmentNode> {
    let mut root = None;
    let mut children: HashMap<i64, Vec<Department>> = HashMap::new();
    for row in rows {
        if row.id == root_id {
            root = Some(row);
        } else if let Some(parent_id) = row.parent_id {
            children.entry(parent_id).or_default().push(row);
        }
    }
    root.map(|root| attach(root, &mut children, counts))
}

/// Path and `is_parent` every row should carry, derived from `parent_id` only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub dep_path: String,
    pub is_parent: bool,
}

/// Recompute the layout of every row.
///
/// Fails with the ids of rows that cannot be reached from a root, which
/// happens when a parent is missing or the parent links form a cycle.
pub fn expected_layout(rows: &[Department]) -> Result<HashMap<i64, Layout>, Vec<i64>> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut queue = VecDeque::new();
    for row in rows {
        match row.parent_id {
            Some(parent_id) => children.entry(parent_id).or_default().push(row.id),
            None => queue.push_back((row.id, path::path_for(None, row.id))),
        }
    }

    let mut layout = HashMap::with_capacity(rows.len());
    let mut seen = HashSet::new();
    while let Some((id, dep_path)) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let kids = children.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        for kid in kids {
            queue.push_back((*kid, path::path_for(Some(&dep_path), *kid)));
        }
        layout.insert(
            id,
            Layout {
                dep_path,
                is_parent: !kids.is_empty(),
            },
        );
    }

    let unreachable: Vec<i64> = rows
        .iter()
        .map(|r| r.id)
        .filter(|id| !layout.contains_key(id))
        .collect();
    if unreachable.is_empty() {
        Ok(layout)
    } else {
        Err(unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(id: i64, parent_id: Option<i64>) -> Department {
        Department {
            id,
            name: format!("dept-{}", id),
            name_key: format!("dept-{}", id),
            parent_id,
            dep_path: String::new(),
            is_parent: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_forest_keeps_row_order() {
        let rows = vec![row(1, None), row(2, Some(1)), row(3, None), row(4, Some(1))];
        let counts = HashMap::from([(2, 5)]);
        let forest = build_forest(rows, &counts);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].department.id, 1);
        assert_eq!(forest[1].department.id, 3);
        let kids: Vec<i64> = forest[0].children.iter().map(|c| c.department.id).collect();
        assert_eq!(kids, vec![2, 4]);
        assert_eq!(forest[0].children[0].employee_count, 5);
        assert_eq!(forest[0].employee_count, 0);
    }

    #[test]
    fn test_build_subtree() {
        let rows = vec![row(2, Some(1)), row(5, Some(2)), row(6, Some(5))];
        let tree = build_subtree(2, rows, &HashMap::new()).unwrap();
        assert_eq!(tree.ids(), vec![2, 5, 6]);

        assert!(build_subtree(9, vec![row(1, None)], &HashMap::new()).is_none());
    }

    #[test]
    fn test_expected_layout() {
        let rows = vec![row(1, None), row(2, Some(1)), row(3, Some(2))];
        let layout = expected_layout(&rows).unwrap();
        assert_eq!(layout[&1].dep_path, "/1/");
        assert!(layout[&1].is_parent);
        assert_eq!(layout[&3].dep_path, "/1/2/3/");
        assert!(!layout[&3].is_parent);
    }

    #[test]
    fn test_expected_layout_reports_cycles_and_orphans() {
        let rows = vec![row(1, None), row(2, Some(3)), row(3, Some(2)), row(4, Some(99))];
        let err = expected_layout(&rows).unwrap_err();
        assert_eq!(err, vec![2, 3, 4]);
    }
}
