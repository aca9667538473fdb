/// Story graph: node ownership, lookup, path search and cycle detection.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::schema::node::{NodeId, StoryNode};

/// Owns every [`StoryNode`]. Edges are the `target_node_id`s of each
/// node's choices; targets and predecessors may name nodes the graph
/// does not hold.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawGraph")]
pub struct StoryGraph {
    nodes: HashMap<NodeId, StoryNode>,
    /// Insertion order, for deterministic traversal and serialization.
    order: Vec<NodeId>,
    root_id: Option<NodeId>,
}

#[derive(Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: Vec<StoryNode>,
    #[serde(default)]
    root_id: Option<NodeId>,
}

impl From<RawGraph> for StoryGraph {
    fn from(raw: RawGraph) -> Self {
        let mut graph = StoryGraph::new();
        for node in raw.nodes {
            graph.add_node(node);
        }
        if raw.root_id.is_some() {
            graph.root_id = raw.root_id;
        }
        graph
    }
}

impl Serialize for StoryGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let nodes: Vec<&StoryNode> = self.iter().collect();
        let mut state = serializer.serialize_struct("StoryGraph", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("root_id", &self.root_id)?;
        state.end()
    }
}

impl StoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, replacing any node with the same id. The first node
    /// ever added becomes the root.
    pub fn add_node(&mut self, node: StoryNode) {
        let id = node.id;
        if self.root_id.is_none() {
            self.root_id = Some(id);
        }
        if self.nodes.insert(id, node).is_none() {
            self.order.push(id);
        }
    }

    pub fn get_node(&self, id: NodeId) -> Option<&StoryNode> {
        self.nodes.get(&id)
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut StoryNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Remove a node. Choices pointing at it are left dangling.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if self.nodes.remove(&id).is_some() {
            self.order.retain(|n| *n != id);
            true
        } else {
            false
        }
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StoryNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn get_nodes_by_location(&self, location: &str) -> Vec<&StoryNode> {
        self.iter().filter(|n| n.location == location).collect()
    }

    pub fn get_nodes_by_tag(&self, tag: &str) -> Vec<&StoryNode> {
        self.iter().filter(|n| n.has_tag(tag)).collect()
    }

    fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(&id)
            .into_iter()
            .flat_map(|node| node.choices.iter().filter_map(|c| c.target_node_id))
    }

    /// Shortest path by edge count, breadth-first.
    pub fn find_path(&self, start: NodeId, end: NodeId) -> Option<Vec<NodeId>> {
        if !self.contains(start) || !self.contains(end) {
            return None;
        }
        if start == end {
            return Some(vec![start]);
        }

        let mut visited = HashSet::new();
        visited.insert(start);
        let mut queue = VecDeque::new();
        queue.push_back(vec![start]);

        while let Some(path) = queue.pop_front() {
            let Some(&last) = path.last() else { continue };
            for next in self.successors(last) {
                if next == end {
                    let mut found = path.clone();
                    found.push(next);
                    return Some(found);
                }
                if visited.insert(next) {
                    let mut extended = path.clone();
                    extended.push(next);
                    queue.push_back(extended);
                }
            }
        }
        None
    }

    /// Every cycle found by depth-first search from each unvisited node.
    ///
    /// Each cycle lists the path from the re-entered node through the
    /// back-edge, closing on itself. Overlapping cycles are all reported.
    pub fn detect_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut cycles = Vec::new();
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut path: Vec<NodeId> = Vec::new();
        // Explicit DFS stack of (node, its successors, next successor index).
        let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

        for &root in &self.order {
            if visited.contains(&root) {
                continue;
            }
            visited.insert(root);
            on_stack.insert(root);
            path.push(root);
            stack.push((root, self.successors(root).collect(), 0));

            while let Some((id, successors, cursor)) = stack.last_mut() {
                let Some(&next) = successors.get(*cursor) else {
                    on_stack.remove(id);
                    path.pop();
                    stack.pop();
                    continue;
                };
                *cursor += 1;

                if !visited.contains(&next) {
                    if self.contains(next) {
                        visited.insert(next);
                        on_stack.insert(next);
                        path.push(next);
                        stack.push((next, self.successors(next).collect(), 0));
                    }
                } else if on_stack.contains(&next) {
                    if let Some(start) = path.iter().position(|n| *n == next) {
                        let mut cycle = path[start..].to_vec();
                        cycle.push(next);
                        cycles.push(cycle);
                    }
                }
            }
        }
        cycles
    }
}
