// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Kahn's algorithm over a dependency map.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// The graph contains at least one cycle. `remaining` lists the nodes that
/// could not be ordered, in no particular order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError<T> {
    /// Nodes on, or downstream of, a cycle.
    pub remaining: Vec<T>,
}

/// Orders the nodes of a dependency map so that every node comes after all
/// of its dependencies.
///
/// `dependencies` maps a node to the nodes it depends on. Nodes that only
/// appear as dependencies are included in the output. A node listing
/// itself is a cycle.
pub fn dependency_order<T>(dependencies: &HashMap<T, Vec<T>>) -> Result<Vec<T>, CycleError<T>>
where
    T: Copy + Eq + Hash,
{
    let mut dependents: HashMap<T, Vec<T>> = HashMap::new();
    let mut in_degree: HashMap<T, usize> = HashMap::new();

    // 1. Count unresolved dependencies per node, registering leaf nodes too.
    for (&node, deps) in dependencies {
        *in_degree.entry(node).or_insert(0) += deps.len();
        for &dep in deps {
            in_degree.entry(dep).or_insert(0);
            dependents.entry(dep).or_default().push(node);
        }
    }

    // 2. Seed with every node that has nothing left to wait for.
    let mut queue: VecDeque<T> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&node, _)| node)
        .collect();

    // 3. Release dependents as their dependencies are ordered.
    let mut ordered = Vec::with_capacity(in_degree.len());
    while let Some(node) = queue.pop_front() {
        ordered.push(node);
        if let Some(children) = dependents.get(&node) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }
    }

    // 4. Anything never released sits on a cycle.
    if ordered.len() == in_degree.len() {
        Ok(ordered)
    } else {
        let remaining = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(node, _)| node)
            .collect();
        Err(CycleError { remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[u32], node: u32) -> usize {
        order.iter().position(|&n| n == node).unwrap()
    }

    #[test]
    fn test_empty_graph() {
        let graph: HashMap<u32, Vec<u32>> = HashMap::new();
        assert_eq!(dependency_order(&graph), Ok(Vec::new()));
    }

    #[test]
    fn test_dependencies_come_first() {
        // mesh(1) -> material(2) -> shader(3), mesh(1) -> shader(3)
        let graph = HashMap::from([(1, vec![2, 3]), (2, vec![3])]);
        let order = dependency_order(&graph).unwrap();

        assert_eq!(order.len(), 3);
        assert!(position(&order, 3) < position(&order, 2));
        assert!(position(&order, 2) < position(&order, 1));
    }

    #[test]
    fn test_cycle_is_reported() {
        let graph = HashMap::from([(1, vec![2]), (2, vec![3]), (3, vec![1]), (4, vec![])]);
        let err = dependency_order(&graph).unwrap_err();

        let mut remaining = err.remaining;
        remaining.sort_unstable();
        assert_eq!(remaining, vec![1, 2, 3]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let graph = HashMap::from([(5, vec![5])]);
        assert!(dependency_order(&graph).is_err());
    }
}
