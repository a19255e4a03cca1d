//! Producer → consumer dependency graph over cell keys.
//!
//! The edge `a → b` means "b reads a": invalidating `a` schedules `b`.
//! Nodes live in an arena of stable integer indices with both adjacency
//! directions, so neighbourhood queries are O(degree) and no ownership
//! cycles exist. Nodes are created on first edge and garbage-collected when
//! their last edge goes.

use crate::store::CellKey;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

type NodeIdx = u32;
type EdgeList = SmallVec<[NodeIdx; 4]>;

#[derive(Debug)]
struct NodeRecord {
    key: CellKey,
    /// Consumers of this node.
    out: EdgeList,
    /// Producers of this node.
    inn: EdgeList,
}

#[derive(Debug, Default)]
pub struct DepGraph {
    nodes: Vec<Option<NodeRecord>>,
    free: Vec<NodeIdx>,
    index: FxHashMap<CellKey, NodeIdx>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, idx: NodeIdx) -> &NodeRecord {
        self.nodes[idx as usize].as_ref().expect("live node")
    }

    fn node_mut(&mut self, idx: NodeIdx) -> &mut NodeRecord {
        self.nodes[idx as usize].as_mut().expect("live node")
    }

    fn lookup(&self, key: CellKey) -> Option<NodeIdx> {
        self.index.get(&key).copied()
    }

    fn ensure(&mut self, key: CellKey) -> NodeIdx {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let record = NodeRecord {
            key,
            out: EdgeList::new(),
            inn: EdgeList::new(),
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = Some(record);
                idx
            }
            None => {
                self.nodes.push(Some(record));
                (self.nodes.len() - 1) as NodeIdx
            }
        };
        self.index.insert(key, idx);
        idx
    }

    /// Free a node once nothing points at it in either direction.
    fn collect(&mut self, idx: NodeIdx) {
        let record = self.node(idx);
        if record.out.is_empty() && record.inn.is_empty() {
            let key = record.key.clone();
            self.index.remove(&key);
            self.nodes[idx as usize] = None;
            self.free.push(idx);
        }
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn add_edge(&mut self, from: CellKey, to: CellKey) {
        let from_idx = self.ensure(from);
        let to_idx = self.ensure(to);
        let out = &mut self.node_mut(from_idx).out;
        if !out.contains(&to_idx) {
            out.push(to_idx);
            self.node_mut(to_idx).inn.push(from_idx);
        }
    }

    pub fn remove_edge(&mut self, from: CellKey, to: CellKey) {
        let (Some(from_idx), Some(to_idx)) = (self.lookup(from), self.lookup(to)) else {
            return;
        };
        self.node_mut(from_idx).out.retain(|&mut i| i != to_idx);
        self.node_mut(to_idx).inn.retain(|&mut i| i != from_idx);
        self.collect(from_idx);
        self.collect(to_idx);
    }

    pub fn has_edge(&self, from: CellKey, to: CellKey) -> bool {
        match (self.lookup(from), self.lookup(to)) {
            (Some(f), Some(t)) => self.node(f).out.contains(&t),
            _ => false,
        }
    }

    /// Atomically replace every inbound edge of `node` with edges from
    /// `producers`. No observable intermediate state: callers see the old
    /// producer set or the new one, never a mixture.
    pub fn replace_all_inbound(&mut self, node: CellKey, producers: &[CellKey]) {
        let node_idx = self.ensure(node);
        let old: EdgeList = std::mem::take(&mut self.node_mut(node_idx).inn);
        for p_idx in &old {
            self.node_mut(*p_idx).out.retain(|&mut i| i != node_idx);
        }
        for &producer in producers {
            let p_idx = self.ensure(producer);
            let inn = &mut self.node_mut(node_idx).inn;
            if !inn.contains(&p_idx) {
                inn.push(p_idx);
                self.node_mut(p_idx).out.push(node_idx);
            }
        }
        for p_idx in old {
            self.collect(p_idx);
        }
        self.collect(node_idx);
    }

    /// Retract every edge touching `node`.
    pub fn remove_all(&mut self, node: CellKey) {
        let Some(idx) = self.lookup(node) else {
            return;
        };
        let record = self.nodes[idx as usize].take().expect("live node");
        self.index.remove(&node);
        self.free.push(idx);
        for c_idx in record.out {
            if c_idx != idx {
                self.node_mut(c_idx).inn.retain(|&mut i| i != idx);
                self.collect(c_idx);
            }
        }
        for p_idx in record.inn {
            if p_idx != idx {
                self.node_mut(p_idx).out.retain(|&mut i| i != idx);
                self.collect(p_idx);
            }
        }
    }

    pub fn dependencies_of(&self, node: CellKey) -> Vec<CellKey> {
        self.lookup(node)
            .map(|idx| {
                self.node(idx)
                    .inn
                    .iter()
                    .map(|&i| self.node(i).key)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, node: CellKey) -> Vec<CellKey> {
        self.lookup(node)
            .map(|idx| {
                self.node(idx)
                    .out
                    .iter()
                    .map(|&i| self.node(i).key)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forward transitive closure of `changed` over consumer edges, the
    /// inputs themselves included. BFS, O(V+E) over the closure.
    pub fn affected_from(&self, changed: &FxHashSet<CellKey>) -> FxHashSet<CellKey> {
        let mut affected: FxHashSet<CellKey> = changed.iter().copied().collect();
        let mut queue: Vec<NodeIdx> = changed.iter().filter_map(|&k| self.lookup(k)).collect();
        let mut seen: FxHashSet<NodeIdx> = queue.iter().copied().collect();
        while let Some(idx) = queue.pop() {
            for &c_idx in &self.node(idx).out {
                if seen.insert(c_idx) {
                    affected.insert(self.node(c_idx).key);
                    queue.push(c_idx);
                }
            }
        }
        affected
    }

    /// Would adding `from → to` close a loop? True iff a path `to ⇒* from`
    /// already exists (or the edge is a self-reference).
    pub fn would_create_cycle(&self, from: CellKey, to: CellKey) -> bool {
        if from == to {
            return true;
        }
        let Some(target) = self.lookup(from) else {
            return false;
        };
        let Some(start) = self.lookup(to) else {
            return false;
        };
        let mut stack = vec![start];
        let mut seen: FxHashSet<NodeIdx> = FxHashSet::default();
        seen.insert(start);
        while let Some(idx) = stack.pop() {
            if idx == target {
                return true;
            }
            for &c_idx in &self.node(idx).out {
                if seen.insert(c_idx) {
                    stack.push(c_idx);
                }
            }
        }
        false
    }

    /// Keys of `subset` that sit on a cycle whose edges stay inside
    /// `subset`. Strongly connected components of size > 1, plus
    /// self-loops.
    pub fn cycle_members(&self, subset: &FxHashSet<CellKey>) -> FxHashSet<CellKey> {
        // Tarjan, iterative, restricted to the subset.
        #[derive(Clone, Copy)]
        struct State {
            index: u32,
            lowlink: u32,
            on_stack: bool,
        }

        let mut members = FxHashSet::default();
        let mut states: FxHashMap<NodeIdx, State> = FxHashMap::default();
        let mut stack: Vec<NodeIdx> = Vec::new();
        let mut next_index = 0u32;

        let mut roots: Vec<NodeIdx> = subset.iter().filter_map(|&k| self.lookup(k)).collect();
        roots.sort_unstable();

        for root in roots {
            if states.contains_key(&root) {
                continue;
            }
            // Frame: (node, next out-edge offset).
            let mut frames: Vec<(NodeIdx, usize)> = vec![(root, 0)];
            while let Some(&mut (v, ref mut edge)) = frames.last_mut() {
                if *edge == 0 {
                    states.insert(
                        v,
                        State {
                            index: next_index,
                            lowlink: next_index,
                            on_stack: true,
                        },
                    );
                    next_index += 1;
                    stack.push(v);
                }
                let succ = self.node(v).out.get(*edge).copied();
                *edge += 1;
                match succ {
                    Some(w) if subset.contains(&self.node(w).key) => {
                        match states.get(&w).copied() {
                            None => frames.push((w, 0)),
                            Some(ws) if ws.on_stack => {
                                let vs = states.get_mut(&v).unwrap();
                                vs.lowlink = vs.lowlink.min(ws.index);
                            }
                            Some(_) => {}
                        }
                    }
                    Some(_) => {}
                    None => {
                        // All successors done: close the frame.
                        let vs = *states.get(&v).unwrap();
                        frames.pop();
                        if let Some(&mut (parent, _)) = frames.last_mut() {
                            let ps = states.get_mut(&parent).unwrap();
                            ps.lowlink = ps.lowlink.min(vs.lowlink);
                        }
                        if vs.lowlink == vs.index {
                            let mut component = Vec::new();
                            loop {
                                let w = stack.pop().expect("tarjan stack");
                                states.get_mut(&w).unwrap().on_stack = false;
                                component.push(w);
                                if w == v {
                                    break;
                                }
                            }
                            let self_loop = component.len() == 1
                                && self.node(component[0]).out.contains(&component[0]);
                            if component.len() > 1 || self_loop {
                                for w in component {
                                    members.insert(self.node(w).key);
                                }
                            }
                        }
                    }
                }
            }
        }
        members
    }

    /// Topological order over `subset`: producers before consumers, edges
    /// escaping the subset treated as absent. Cycles are broken by skipping
    /// nodes already on the DFS stack; no ordering guarantee exists among
    /// members of a cycle. Keys with no graph node come out first.
    pub fn topo_order(&self, subset: &FxHashSet<CellKey>) -> Vec<CellKey> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let mut order: Vec<CellKey> = Vec::with_capacity(subset.len());
        let mut colors: FxHashMap<NodeIdx, u8> = FxHashMap::default();
        let mut post: Vec<CellKey> = Vec::new();

        let mut roots: Vec<(NodeIdx, CellKey)> = Vec::new();
        for &key in subset {
            match self.lookup(key) {
                Some(idx) => roots.push((idx, key)),
                // Isolated keys have no ordering constraints.
                None => order.push(key),
            }
        }
        order.sort_unstable();
        roots.sort_unstable();

        for (root, _) in roots {
            if *colors.get(&root).unwrap_or(&WHITE) != WHITE {
                continue;
            }
            let mut frames: Vec<(NodeIdx, usize)> = vec![(root, 0)];
            colors.insert(root, GRAY);
            while let Some(&mut (v, ref mut edge)) = frames.last_mut() {
                let succ = self.node(v).out.get(*edge).copied();
                *edge += 1;
                match succ {
                    Some(w) if subset.contains(&self.node(w).key) => {
                        if *colors.get(&w).unwrap_or(&WHITE) == WHITE {
                            colors.insert(w, GRAY);
                            frames.push((w, 0));
                        }
                        // Gray (on-stack) and black successors are skipped.
                    }
                    Some(_) => {}
                    None => {
                        colors.insert(v, BLACK);
                        post.push(self.node(v).key);
                        frames.pop();
                    }
                }
            }
        }
        // Post-order lists consumers before their producers; reverse it.
        order.extend(post.into_iter().rev());
        order
    }
}
