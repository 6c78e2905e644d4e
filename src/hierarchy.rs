//! Parent/child projection of the flat task list.
//!
//! [`build_forest`] turns the ordered task list into a forest of
//! [`HierarchicalTask`] nodes; [`filter_by_completion`] narrows a forest to
//! the "Ongoing" or "Done" view while keeping every ancestor of a match so a
//! subtask is never shown without its context.
//!
//! Rules:
//! - sibling order is input order;
//! - a task whose parent is missing from the input is promoted to a root at
//!   its own input position (the store never holds such rows thanks to the
//!   cascading foreign key, but filtered inputs do);
//! - a cycle in `parent_id` fails with [`Error::CyclicHierarchy`] before any
//!   node is built;
//! - a task more than [`MAX_DEPTH`] levels below its root fails with
//!   [`Error::HierarchyTooDeep`], so assembly and rendering recurse a bounded
//!   number of frames.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::task::Task;

/// Deepest nesting level accepted; roots are level 0.
pub const MAX_DEPTH: usize = 256;

/// A task with its nested subtasks, rebuilt on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchicalTask {
    pub task: Task,
    pub sub_tasks: Vec<HierarchicalTask>,
}

impl HierarchicalTask {
    pub fn leaf(task: Task) -> Self {
        Self {
            task,
            sub_tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.task.id
    }

    /// Nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self
            .sub_tasks
            .iter()
            .map(HierarchicalTask::node_count)
            .sum::<usize>()
    }
}

/// Build the forest for `tasks`.
pub fn build_forest(tasks: &[Task]) -> Result<Vec<HierarchicalTask>> {
    depths(tasks)?;

    let present: HashSet<i64> = tasks.iter().map(|task| task.id).collect();
    let is_root = |task: &Task| match task.parent_id {
        Some(parent) => !present.contains(&parent),
        None => true,
    };

    let mut children_by_parent: HashMap<i64, Vec<&Task>> = HashMap::new();
    for task in tasks.iter().filter(|&task| !is_root(task)) {
        if let Some(parent) = task.parent_id {
            children_by_parent.entry(parent).or_default().push(task);
        }
    }

    fn attach(task: &Task, children_by_parent: &HashMap<i64, Vec<&Task>>) -> HierarchicalTask {
        let sub_tasks = children_by_parent
            .get(&task.id)
            .map(|children| {
                children
                    .iter()
                    .map(|child| attach(child, children_by_parent))
                    .collect()
            })
            .unwrap_or_default();
        HierarchicalTask {
            task: task.clone(),
            sub_tasks,
        }
    }

    Ok(tasks
        .iter()
        .filter(|&task| is_root(task))
        .map(|task| attach(task, &children_by_parent))
        .collect())
}

/// Ancestor-preserving status filter.
///
/// A node survives when its own completion flag equals `completed` or when
/// any of its children survives; survivors keep only surviving children.
pub fn filter_by_completion(forest: &[HierarchicalTask], completed: bool) -> Vec<HierarchicalTask> {
    forest
        .iter()
        .filter_map(|node| filter_node(node, completed))
        .collect()
}

fn filter_node(node: &HierarchicalTask, completed: bool) -> Option<HierarchicalTask> {
    let sub_tasks = filter_by_completion(&node.sub_tasks, completed);
    if node.task.is_completed == completed || !sub_tasks.is_empty() {
        Some(HierarchicalTask {
            task: node.task.clone(),
            sub_tasks,
        })
    } else {
        None
    }
}

/// Pre-order walk yielding each node with its depth (roots are depth 0).
pub fn flatten(forest: &[HierarchicalTask]) -> Vec<(&Task, usize)> {
    let mut out = Vec::new();
    let mut stack: Vec<(&HierarchicalTask, usize)> =
        forest.iter().rev().map(|node| (node, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        out.push((&node.task, depth));
        stack.extend(node.sub_tasks.iter().rev().map(|child| (child, depth + 1)));
    }
    out
}

/// Total nodes in a forest.
pub fn node_count(forest: &[HierarchicalTask]) -> usize {
    forest.iter().map(HierarchicalTask::node_count).sum()
}

/// Ids of every descendant of `id` (not including `id`).
pub fn descendant_ids(tasks: &[Task], id: i64) -> HashSet<i64> {
    let mut children_by_parent: HashMap<i64, Vec<i64>> = HashMap::new();
    for task in tasks {
        if let Some(parent) = task.parent_id {
            children_by_parent.entry(parent).or_default().push(task.id);
        }
    }

    let mut found = HashSet::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if let Some(children) = children_by_parent.get(&current) {
            for child in children {
                if *child != id && found.insert(*child) {
                    stack.push(*child);
                }
            }
        }
    }
    found
}

/// Level of every task below its root (roots are 0).
///
/// Walks up the parent links with an explicit path, reusing levels already
/// known. A task seen twice on one walk is a cycle; a level past
/// [`MAX_DEPTH`] is refused.
pub fn depths(tasks: &[Task]) -> Result<HashMap<i64, usize>> {
    let parent_of: HashMap<i64, Option<i64>> =
        tasks.iter().map(|task| (task.id, task.parent_id)).collect();
    let mut levels: HashMap<i64, usize> = HashMap::with_capacity(tasks.len());

    for task in tasks {
        let mut path: Vec<i64> = Vec::new();
        let mut on_path: HashSet<i64> = HashSet::new();
        let mut base = 0;
        let mut current = Some(task.id);
        while let Some(id) = current {
            if let Some(level) = levels.get(&id) {
                base = level + 1;
                break;
            }
            let Some(parent) = parent_of.get(&id) else {
                break;
            };
            if !on_path.insert(id) {
                return Err(Error::CyclicHierarchy { task_id: id });
            }
            path.push(id);
            current = *parent;
        }

        for (offset, id) in path.iter().rev().enumerate() {
            let level = base + offset;
            if level > MAX_DEPTH {
                return Err(Error::HierarchyTooDeep {
                    task_id: *id,
                    max_depth: MAX_DEPTH,
                });
            }
            levels.insert(*id, level);
        }
    }

    Ok(levels)
}
