//! Component ordering and failure propagation.
//!
//! Three edge families contribute to the graph:
//!
//! - `dependencies[x]` and `install_after[x]` add an edge `dep → x`;
//! - `install_before[x]` adds an edge `x → target`.
//!
//! References to ids outside the component list are ignored.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{Component, InstallState};

/// Outcome of [`resolve`]: the install order and whether a cycle forced the
/// fallback path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Every component id exactly once.
    pub order: Vec<String>,
    /// `true` when some components could not be ordered and were appended in
    /// input order. Such an order violates at least one edge.
    pub has_cycle: bool,
}

/// Adjacency lists indexed by component position.
struct Graph {
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl Graph {
    fn build(components: &[Component]) -> Self {
        let index: HashMap<&str, usize> = components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.as_str(), i))
            .collect();

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
        let mut edges: HashSet<(usize, usize)> = HashSet::new();

        for (i, c) in components.iter().enumerate() {
            let incoming = c.dependencies.iter().chain(&c.install_after);
            for id in incoming {
                if let Some(&from) = index.get(id.as_str()) {
                    edges.insert((from, i));
                }
            }
            for id in &c.install_before {
                if let Some(&to) = index.get(id.as_str()) {
                    edges.insert((i, to));
                }
            }
        }

        let mut in_degree = vec![0usize; components.len()];
        let mut sorted: Vec<(usize, usize)> = edges.into_iter().collect();
        sorted.sort_unstable();
        for (from, to) in sorted {
            if from == to {
                // A self edge can never be satisfied; leave it to the cycle path.
                if let Some(d) = in_degree.get_mut(to) {
                    *d += 1;
                }
                continue;
            }
            if let Some(s) = successors.get_mut(from) {
                s.push(to);
            }
            if let Some(d) = in_degree.get_mut(to) {
                *d += 1;
            }
        }

        Self {
            successors,
            in_degree,
        }
    }
}

/// Linearize `components` with Kahn's algorithm.
///
/// The ready queue is FIFO and seeded in input order, so independent
/// components keep their relative input order. Components left over because
/// of a cycle are appended in input order and a warning is logged.
#[must_use]
pub fn resolve(components: &[Component]) -> Resolution {
    let Graph {
        successors,
        mut in_degree,
    } = Graph::build(components);

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| (d == 0).then_some(i))
        .collect();
    let mut placed = vec![false; components.len()];
    let mut order = Vec::with_capacity(components.len());

    while let Some(idx) = queue.pop_front() {
        if let Some(p) = placed.get_mut(idx) {
            *p = true;
        }
        if let Some(c) = components.get(idx) {
            order.push(c.id.clone());
        }
        for &next in successors.get(idx).map_or(&[][..], Vec::as_slice) {
            if let Some(count) = in_degree.get_mut(next) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    let has_cycle = order.len() != components.len();
    if has_cycle {
        let residue: Vec<String> = components
            .iter()
            .zip(&placed)
            .filter(|&(_, &p)| !p)
            .map(|(c, _)| c.id.clone())
            .collect();
        tracing::warn!(
            "dependency cycle among [{}]; appending in input order, resulting order is not authoritative",
            residue.join(", ")
        );
        order.extend(residue);
    }

    Resolution { order, has_cycle }
}

/// Install order of `components` (see [`resolve`]).
#[must_use]
pub fn resolve_order(components: &[Component]) -> Vec<String> {
    resolve(components).order
}

/// Whether the component graph contains at least one cycle.
#[must_use]
pub fn has_cycle(components: &[Component]) -> bool {
    resolve(components).has_cycle
}

/// Flip every `Pending` component reachable from `failed_id` along the
/// dependents map to `Blocked`.
///
/// Components in any other state are traversed but left unchanged. Each
/// component is visited at most once. Returns the ids that were blocked, in
/// visit order.
pub fn mark_blocked_descendants(components: &mut [Component], failed_id: &str) -> Vec<String> {
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for c in components.iter() {
        for dep in c.dependencies.iter().chain(&c.install_after) {
            dependents.entry(dep.clone()).or_default().push(c.id.clone());
        }
        for target in &c.install_before {
            dependents
                .entry(c.id.clone())
                .or_default()
                .push(target.clone());
        }
    }

    let index: HashMap<String, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.clone(), i))
        .collect();

    let mut visited: HashSet<String> = HashSet::from([failed_id.to_string()]);
    let mut stack = vec![failed_id.to_string()];
    let mut blocked = Vec::new();

    while let Some(id) = stack.pop() {
        let Some(children) = dependents.get(&id) else {
            continue;
        };
        for child in children {
            if !visited.insert(child.clone()) {
                continue;
            }
            if let Some(component) = index.get(child).and_then(|&i| components.get_mut(i))
                && component.block() == Some(InstallState::Blocked)
            {
                blocked.push(child.clone());
            }
            stack.push(child.clone());
        }
    }

    blocked
}
