//! Journey graph compilation: per-session walks, edge weights, per-step
//! pruning and the node registry.

use std::collections::{BTreeMap, HashMap, HashSet};
use waypoint_query::{normalize_path, HitKind, NormalizedHit};

use crate::types::{JourneyDirection, JourneyEdge, JourneyGraph, JourneyNode};

/// One page-to-page move at a relative step from the start page.
/// The source is always the page nearer the start page.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transition {
    pub step: usize,
    pub source: String,
    pub target: String,
}

impl Transition {
    pub fn new(step: usize, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            step,
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Walks a session's pageviews outward from the first visit to the start page
#[derive(Debug, Clone)]
pub struct JourneyWalker {
    start_page: String,
    direction: JourneyDirection,
    horizon: usize,
}

impl JourneyWalker {
    pub fn new(start_page: &str, direction: JourneyDirection, horizon: usize) -> Self {
        Self {
            start_page: normalize_path(start_page),
            direction,
            horizon,
        }
    }

    pub fn start_page(&self) -> &str {
        &self.start_page
    }

    pub fn direction(&self) -> JourneyDirection {
        self.direction
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn walk(&self, hits: &[NormalizedHit]) -> Vec<Transition> {
        let pages: Vec<&str> = hits
            .iter()
            .filter(|hit| hit.kind == HitKind::Pageview)
            .map(|hit| hit.path_or_name.as_str())
            .collect();

        let Some(anchor) = pages.iter().position(|page| *page == self.start_page) else {
            return Vec::new();
        };

        let mut transitions = Vec::new();
        for step in 0..self.horizon {
            let pair = match self.direction {
                JourneyDirection::Forward => pages
                    .get(anchor + step)
                    .zip(pages.get(anchor + step + 1)),
                JourneyDirection::Backward => anchor
                    .checked_sub(step + 1)
                    .and_then(|target| pages.get(target + 1).zip(pages.get(target))),
            };
            let Some((&source, &target)) = pair else {
                break;
            };

            if source == target {
                continue;
            }
            // The start page only ever appears as the step 0 source
            if step > 0 && (source == self.start_page || target == self.start_page) {
                continue;
            }
            transitions.push(Transition::new(step, source, target));
        }

        transitions
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedEdge {
    pub transition: Transition,
    pub weight: u64,
}

/// Session counts per transition. Partial weights from workers merge by
/// summation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeWeights {
    weights: BTreeMap<Transition, u64>,
}

impl EdgeWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one session's walk
    pub fn record(&mut self, transitions: impl IntoIterator<Item = Transition>) {
        for transition in transitions {
            *self.weights.entry(transition).or_insert(0) += 1;
        }
    }

    pub fn merge(&mut self, other: EdgeWeights) {
        for (transition, weight) in other.weights {
            *self.weights.entry(transition).or_insert(0) += weight;
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Keeps, step by step, the `limit` heaviest edges whose source was a
    /// retained target of the previous step. Ties go to the smaller source,
    /// then the smaller target.
    pub fn prune(&self, limit: usize) -> Vec<WeightedEdge> {
        let mut by_step: BTreeMap<usize, Vec<WeightedEdge>> = BTreeMap::new();
        for (transition, &weight) in &self.weights {
            by_step
                .entry(transition.step)
                .or_default()
                .push(WeightedEdge {
                    transition: transition.clone(),
                    weight,
                });
        }

        let last_step = match by_step.keys().next_back() {
            Some(&step) => step,
            None => return Vec::new(),
        };

        let mut retained = Vec::new();
        let mut reachable: HashSet<String> = HashSet::new();
        for step in 0..=last_step {
            let mut candidates = by_step.remove(&step).unwrap_or_default();
            if step > 0 {
                candidates.retain(|edge| reachable.contains(&edge.transition.source));
            }

            candidates.sort_by(|a, b| {
                b.weight
                    .cmp(&a.weight)
                    .then_with(|| a.transition.source.cmp(&b.transition.source))
                    .then_with(|| a.transition.target.cmp(&b.transition.target))
            });
            candidates.truncate(limit);

            reachable = candidates
                .iter()
                .map(|edge| edge.transition.target.clone())
                .collect();
            retained.extend(candidates);
        }

        retained
    }

    pub fn into_graph(self, limit: usize) -> JourneyGraph {
        let mut registry = NodeRegistry::default();
        let edges = self
            .prune(limit)
            .into_iter()
            .map(|edge| {
                let Transition {
                    step,
                    source,
                    target,
                } = edge.transition;
                JourneyEdge {
                    source_node_id: registry.id_for(step, source),
                    target_node_id: registry.id_for(step + 1, target),
                    weight: edge.weight,
                }
            })
            .collect();

        JourneyGraph {
            nodes: registry.nodes,
            edges,
        }
    }
}

/// Assigns ids to `(step, page)` pairs in order of first sight
#[derive(Debug, Default)]
struct NodeRegistry {
    ids: HashMap<(usize, String), usize>,
    nodes: Vec<JourneyNode>,
}

impl NodeRegistry {
    fn id_for(&mut self, step_index: usize, page_name: String) -> usize {
        let key = (step_index, page_name);
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }

        let id = self.nodes.len();
        self.nodes.push(JourneyNode {
            id,
            step_index,
            page_name: key.1.clone(),
        });
        self.ids.insert(key, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn session(pages: &[&str]) -> Vec<NormalizedHit> {
        pages
            .iter()
            .enumerate()
            .map(|(i, page)| NormalizedHit::pageview("s", at(i as i64), i as u64, page))
            .collect()
    }

    fn node(graph: &JourneyGraph, id: usize) -> &JourneyNode {
        graph.nodes.iter().find(|node| node.id == id).unwrap()
    }

    fn graph(
        sessions: &[&[&str]],
        start: &str,
        direction: JourneyDirection,
        horizon: usize,
        limit: usize,
    ) -> JourneyGraph {
        let walker = JourneyWalker::new(start, direction, horizon);
        let mut weights = EdgeWeights::new();
        for pages in sessions {
            weights.record(walker.walk(&session(pages)));
        }
        weights.into_graph(limit)
    }

    fn node_keys(graph: &JourneyGraph) -> Vec<(usize, &str)> {
        graph
            .nodes
            .iter()
            .map(|node| (node.step_index, node.page_name.as_str()))
            .collect()
    }

    #[test]
    fn test_split_after_second_page() {
        let sessions: [&[&str]; 4] = [
            &["/a", "/b", "/c"],
            &["/a", "/b", "/c"],
            &["/a", "/b"],
            &["/a", "/b"],
        ];
        let graph = graph(&sessions, "/a", JourneyDirection::Forward, 2, 5);

        assert_eq!(node_keys(&graph), vec![(0, "/a"), (1, "/b"), (2, "/c")]);
        assert_eq!(
            graph.edges,
            vec![
                JourneyEdge {
                    source_node_id: 0,
                    target_node_id: 1,
                    weight: 4,
                },
                JourneyEdge {
                    source_node_id: 1,
                    target_node_id: 2,
                    weight: 2,
                },
            ]
        );
    }

    #[test]
    fn test_walk_starts_at_first_visit() {
        let walker = JourneyWalker::new("/a", JourneyDirection::Forward, 3);
        let walk = walker.walk(&session(&["/x", "/a", "/b", "/a", "/c"]));

        // later moves through the start page are dropped
        assert_eq!(walk, vec![Transition::new(0, "/a", "/b")]);
    }

    #[test]
    fn test_horizon_bounds_walk() {
        let walker = JourneyWalker::new("/a", JourneyDirection::Forward, 2);
        let walk = walker.walk(&session(&["/a", "/b", "/c", "/d", "/e"]));
        assert_eq!(
            walk,
            vec![Transition::new(0, "/a", "/b"), Transition::new(1, "/b", "/c")]
        );
    }

    #[test]
    fn test_self_transitions_are_dropped() {
        let walker = JourneyWalker::new("/a", JourneyDirection::Forward, 4);
        let walk = walker.walk(&session(&["/a", "/a", "/b", "/b", "/c"]));
        assert_eq!(walk, vec![Transition::new(3, "/b", "/c")]);
    }

    #[test]
    fn test_backward_walk() {
        let sessions: [&[&str]; 3] = [
            &["/home", "/pricing", "/checkout"],
            &["/blog", "/pricing", "/checkout"],
            &["/home", "/docs", "/pricing", "/checkout"],
        ];
        let graph = graph(&sessions, "/checkout", JourneyDirection::Backward, 3, 10);

        assert_eq!(graph.nodes[0].page_name, "/checkout");
        assert_eq!(graph.nodes[0].step_index, 0);
        assert_eq!(graph.edges[0].weight, 3);
        assert_eq!(node(&graph, graph.edges[0].target_node_id).page_name, "/pricing");

        let step_two: Vec<&str> = graph
            .edges
            .iter()
            .map(|edge| node(&graph, edge.target_node_id))
            .filter(|node| node.step_index == 2)
            .map(|node| node.page_name.as_str())
            .collect();
        assert_eq!(step_two, vec!["/blog", "/docs", "/home"]);
    }

    #[test]
    fn test_backward_without_history_is_empty() {
        let walker = JourneyWalker::new("/a", JourneyDirection::Backward, 5);
        assert!(walker.walk(&session(&["/a", "/b"])).is_empty());
    }

    #[test]
    fn test_ignores_events_and_unvisited_start() {
        let walker = JourneyWalker::new("https://shop.example/a/", JourneyDirection::Forward, 2);
        assert_eq!(walker.start_page(), "/a");

        let hits = vec![
            NormalizedHit::pageview("s", at(0), 0, "/a"),
            NormalizedHit::event("s", at(1), 1, "click", "/a"),
            NormalizedHit::pageview("s", at(2), 2, "/b"),
        ];
        assert_eq!(walker.walk(&hits), vec![Transition::new(0, "/a", "/b")]);
        assert!(walker.walk(&session(&["/x", "/y"])).is_empty());
    }

    #[test]
    fn test_pruned_sources_do_not_continue() {
        let sessions: [&[&str]; 5] = [
            &["/a", "/b", "/d"],
            &["/a", "/b", "/d"],
            &["/a", "/c", "/e"],
            &["/a", "/b", "/f"],
            &["/a", "/b", "/f"],
        ];
        let graph = graph(&sessions, "/a", JourneyDirection::Forward, 2, 1);

        // /c loses at step 0, so /c -> /e is unreachable; ties at step 1 go to /d
        assert_eq!(node_keys(&graph), vec![(0, "/a"), (1, "/b"), (2, "/d")]);
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn test_ties_broken_by_source_then_target() {
        let mut weights = EdgeWeights::new();
        weights.record([Transition::new(0, "/a", "/z")]);
        weights.record([Transition::new(0, "/a", "/m")]);
        weights.record([Transition::new(0, "/a", "/b")]);

        let kept: Vec<String> = weights
            .prune(2)
            .into_iter()
            .map(|edge| edge.transition.target)
            .collect();
        assert_eq!(kept, vec!["/b", "/m"]);
    }

    #[test]
    fn test_merge_sums_weights() {
        let mut left = EdgeWeights::new();
        left.record([Transition::new(0, "/a", "/b")]);
        let mut right = EdgeWeights::new();
        right.record([Transition::new(0, "/a", "/b")]);
        right.record([Transition::new(1, "/b", "/c")]);

        left.merge(right);
        assert_eq!(left.len(), 2);
        let weights: Vec<(usize, u64)> = left
            .prune(10)
            .into_iter()
            .map(|edge| (edge.transition.step, edge.weight))
            .collect();
        assert_eq!(weights, vec![(0, 2), (1, 1)]);
    }

    #[test]
    fn test_random_graphs_respect_cap_and_reachability() {
        let mut rng = StdRng::seed_from_u64(11);
        let pages = ["/a", "/b", "/c", "/d", "/e", "/f"];

        for _ in 0..50 {
            let limit = rng.gen_range(1..4);
            let horizon = rng.gen_range(1..6);
            let walker = JourneyWalker::new("/a", JourneyDirection::Forward, horizon);
            let mut weights = EdgeWeights::new();
            for _ in 0..40 {
                let len = rng.gen_range(1..10);
                let visit: Vec<&str> = (0..len)
                    .map(|_| pages[rng.gen_range(0..pages.len())])
                    .collect();
                weights.record(walker.walk(&session(&visit)));
            }
            let graph = weights.into_graph(limit);

            let mut per_step: HashMap<usize, usize> = HashMap::new();
            for edge in &graph.edges {
                let source = node(&graph, edge.source_node_id);
                let target = node(&graph, edge.target_node_id);
                *per_step.entry(source.step_index).or_insert(0) += 1;

                assert_ne!(source.page_name, target.page_name);
                assert_eq!(target.step_index, source.step_index + 1);
                assert!(source.step_index < horizon);
                if source.step_index == 0 {
                    assert_eq!(source.page_name, "/a");
                } else {
                    assert_ne!(source.page_name, "/a");
                    assert!(graph.edges.iter().any(|e| e.target_node_id == source.id));
                }
                assert_ne!(target.page_name, "/a");
            }
            assert!(per_step.values().all(|&count| count <= limit));

            let keys: HashSet<(usize, &str)> = node_keys(&graph).into_iter().collect();
            assert_eq!(keys.len(), graph.nodes.len());
        }
    }
}
