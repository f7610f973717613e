// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle detection over the task dependency graph

use crate::id::TaskId;
use indexmap::IndexMap;

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Detect a cycle in a dependency adjacency map.
///
/// Depth-first search with an explicit recursion stack, O(V+E). Edges point
/// from a task to the tasks it depends on; ids referenced but not present as
/// keys are treated as leaves (dangling deps are rejected elsewhere).
///
/// Returns the offending path on the first back-edge found, as
/// `[a, b, .., a]` with the repeated node closing the cycle.
pub fn detect_cycle(adjacency: &IndexMap<TaskId, Vec<TaskId>>) -> Option<Vec<TaskId>> {
    let mut marks: IndexMap<&TaskId, Mark> =
        adjacency.keys().map(|id| (id, Mark::Unvisited)).collect();

    for root in adjacency.keys() {
        if marks.get(root) != Some(&Mark::Unvisited) {
            continue;
        }

        // Each frame is (node, index of the next edge to follow). The stack
        // doubles as the current path for cycle reconstruction.
        let mut stack: Vec<(&TaskId, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::InProgress);

        while let Some((node, edge)) = stack.last().copied() {
            let deps = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if edge >= deps.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            }

            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }

            let next = &deps[edge];
            match marks.get(next).copied() {
                Some(Mark::InProgress) => {
                    // Back-edge: slice the stack from the first occurrence of
                    // `next` and close the loop.
                    let start = stack
                        .iter()
                        .position(|(n, _)| *n == next)
                        .unwrap_or_default();
                    let mut path: Vec<TaskId> =
                        stack[start..].iter().map(|(n, _)| (*n).clone()).collect();
                    path.push(next.clone());
                    return Some(path);
                }
                Some(Mark::Unvisited) => {
                    marks.insert(next, Mark::InProgress);
                    stack.push((next, 0));
                }
                Some(Mark::Done) | None => {}
            }
        }
    }

    None
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
