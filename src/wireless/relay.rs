//! End-to-end delivery probability over a relay mesh.
//!
//! Links are undirected and weighted with a delivery probability. Starting
//! from the root, every simple path ("branch") is enumerated with a
//! worklist; a node's end-to-end success is the complement of all its
//! branches failing together:
//!
//! ```text
//! success(n) = 1 - prod(1 - pdr(branch)) over branches ending at n
//! ```
//!
//! Branch probabilities are rounded to 4 decimals at every multiplicative
//! step. The solver caches the branch set keyed by the link set: an
//! identical link set is answered from cache without recomputation, and a
//! partially-changed set only enumerates the branches the changed links
//! introduce.

use super::frame::NodeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Undirected link key, normalized so the smaller id comes first.
#[inline]
pub fn link_key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[inline]
fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

type Branch = Vec<NodeId>;

/// Link PDRs quantized to 1e-4 units, the cache identity.
type LinkSet = BTreeMap<(NodeId, NodeId), i64>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SolverStats {
    pub solves: u64,
    pub cache_hits: u64,
    pub branches_reused: u64,
    pub branches_added: u64,
}

struct Cache {
    root: NodeId,
    links: LinkSet,
    branches: Vec<Branch>,
    success: HashMap<NodeId, f64>,
}

#[derive(Default)]
pub struct RelaySolver {
    cache: Option<Cache>,
    stats: SolverStats,
}

impl RelaySolver {
    pub fn new() -> Self {
        RelaySolver::default()
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    /// Per-node end-to-end success probability from `root` over `links`.
    /// Links with zero PDR are ignored. The root's own entry is 1.0.
    pub fn solve(
        &mut self,
        root: NodeId,
        links: &BTreeMap<(NodeId, NodeId), f64>,
    ) -> HashMap<NodeId, f64> {
        self.stats.solves += 1;

        let link_set: LinkSet = links
            .iter()
            .filter(|(_, &p)| p > 0.0)
            .map(|(&(a, b), &p)| (link_key(a, b), (p * 10000.0).round() as i64))
            .collect();

        if let Some(cache) = &self.cache {
            if cache.root == root && cache.links == link_set {
                self.stats.cache_hits += 1;
                return cache.success.clone();
            }
        }

        let adjacency = adjacency_of(&link_set);

        // Reuse branches whose every hop survived the link change, then
        // enumerate only the paths the worklist finds beyond them.
        let mut known: BTreeSet<Branch> = BTreeSet::new();
        match self.cache.take() {
            Some(cache) if cache.root == root => {
                for branch in cache.branches {
                    if branch_alive(&branch, &link_set) {
                        known.insert(branch);
                    }
                }
                self.stats.branches_reused += known.len() as u64;
            }
            _ => {}
        }

        let mut worklist: VecDeque<Branch> = VecDeque::new();
        worklist.push_back(vec![root]);
        for branch in &known {
            worklist.push_back(branch.clone());
        }
        while let Some(path) = worklist.pop_front() {
            let last = path[path.len() - 1];
            if let Some(neighbors) = adjacency.get(&last) {
                for &next in neighbors {
                    if path.contains(&next) {
                        continue;
                    }
                    let mut extended = path.clone();
                    extended.push(next);
                    if known.insert(extended.clone()) {
                        self.stats.branches_added += 1;
                        worklist.push_back(extended);
                    }
                }
            }
        }

        let branches: Vec<Branch> = known.into_iter().collect();
        let success = combine(root, &branches, &link_set);
        let result = success.clone();
        self.cache = Some(Cache {
            root,
            links: link_set,
            branches,
            success,
        });
        result
    }
}

fn adjacency_of(links: &LinkSet) -> HashMap<NodeId, Vec<NodeId>> {
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &(a, b) in links.keys() {
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }
    adjacency
}

fn branch_alive(branch: &[NodeId], links: &LinkSet) -> bool {
    branch
        .windows(2)
        .all(|hop| links.contains_key(&link_key(hop[0], hop[1])))
}

fn combine(root: NodeId, branches: &[Branch], links: &LinkSet) -> HashMap<NodeId, f64> {
    let mut failure: HashMap<NodeId, f64> = HashMap::new();
    for branch in branches {
        let mut pdr = 1.0;
        for hop in branch.windows(2) {
            let link = links.get(&link_key(hop[0], hop[1])).copied().unwrap_or(0) as f64 / 10000.0;
            pdr = round4(pdr * link);
        }
        let end = branch[branch.len() - 1];
        *failure.entry(end).or_insert(1.0) *= 1.0 - pdr;
    }
    let mut success: HashMap<NodeId, f64> = failure
        .into_iter()
        .map(|(n, f)| (n, (1.0 - f).clamp(0.0, 1.0)))
        .collect();
    success.insert(root, 1.0);
    success
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: NodeId = 0;
    const B: NodeId = 1;
    const C: NodeId = 2;
    const D: NodeId = 3;

    fn links(entries: &[((NodeId, NodeId), f64)]) -> BTreeMap<(NodeId, NodeId), f64> {
        entries
            .iter()
            .map(|&((a, b), p)| (link_key(a, b), p))
            .collect()
    }

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() < tolerance,
            "got {actual}, wanted {expected}"
        );
    }

    #[test]
    fn full_mesh_success() {
        let mut solver = RelaySolver::new();
        let result = solver.solve(
            A,
            &links(&[
                ((A, B), 0.90),
                ((A, C), 0.80),
                ((A, D), 0.30),
                ((B, C), 0.70),
                ((B, D), 0.60),
                ((C, D), 0.75),
            ]),
        );
        assert_eq!(result[&A], 1.0);
        assert_close(result[&B], 0.9805, 1e-4);
        assert_close(result[&C], 0.9702, 1e-4);
        assert_close(result[&D], 0.9549, 1e-4);
    }

    #[test]
    fn sparse_mesh_with_dead_links() {
        let mut solver = RelaySolver::new();
        let result = solver.solve(
            A,
            &links(&[
                ((A, B), 0.95),
                ((B, C), 0.30),
                ((B, D), 0.20),
                ((C, D), 0.95),
                ((A, C), 0.0),
                ((A, D), 0.0),
            ]),
        );
        assert_close(result[&B], 0.95, 1e-9);
        assert_close(result[&C], 0.4141, 1e-4);
        assert_close(result[&D], 0.4093, 1e-4);
    }

    #[test]
    fn two_relay_paths_combine() {
        let mut solver = RelaySolver::new();
        let result = solver.solve(
            A,
            &links(&[
                ((A, B), 0.6),
                ((A, C), 0.9),
                ((A, D), 0.2),
                ((B, D), 0.7),
                ((C, D), 0.8),
            ]),
        );
        // direct 0.2, via B 0.42, via C 0.72
        assert_close(result[&D], 0.87008, 1e-5);
    }

    #[test]
    fn identical_link_set_is_answered_from_cache() {
        let mut solver = RelaySolver::new();
        let set = links(&[((A, B), 0.5), ((B, C), 0.5)]);
        let first = solver.solve(A, &set);
        let second = solver.solve(A, &set);
        assert_eq!(first, second);
        assert_eq!(solver.stats().cache_hits, 1);
        assert_eq!(solver.stats().solves, 2);
    }

    #[test]
    fn incremental_matches_fresh_solve() {
        let before = links(&[((A, B), 0.9), ((A, C), 0.8), ((B, C), 0.7)]);
        let after = links(&[((A, B), 0.9), ((A, C), 0.8), ((B, C), 0.7), ((C, D), 0.5)]);

        let mut incremental = RelaySolver::new();
        incremental.solve(A, &before);
        let extended = incremental.solve(A, &after);

        let mut fresh = RelaySolver::new();
        let full = fresh.solve(A, &after);

        assert_eq!(extended, full);
        assert!(incremental.stats().branches_reused > 0);
    }

    #[test]
    fn removed_link_drops_its_branches() {
        let mut solver = RelaySolver::new();
        solver.solve(A, &links(&[((A, B), 0.9), ((B, C), 0.9)]));
        let result = solver.solve(A, &links(&[((A, B), 0.9)]));
        assert!(!result.contains_key(&C));
        assert_close(result[&B], 0.9, 1e-9);
    }

    #[test]
    fn success_stays_in_unit_interval() {
        let mut solver = RelaySolver::new();
        let result = solver.solve(
            A,
            &links(&[((A, B), 1.0), ((A, C), 1.0), ((B, C), 1.0), ((C, D), 1.0)]),
        );
        for p in result.values() {
            assert!((0.0..=1.0).contains(p));
        }
        assert_eq!(result[&D], 1.0);
    }
}
