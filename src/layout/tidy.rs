//! Tidy tree positioning (Buchheim, Jünger and Leipert's linear-time
//! refinement of Walker's algorithm) over an index arena.

use std::collections::VecDeque;

use anyhow::anyhow;

use crate::error::{LibError, Result};

#[derive(Debug, Clone)]
pub(crate) struct HierarchyNode {
    /// Index into the data the hierarchy was built from.
    pub datum: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub depth: usize,
    pub x: f64,
    pub y: f64,
}

/// Rooted hierarchy stored in breadth-first order; `nodes[0]` is the root.
#[derive(Debug, Clone)]
pub(crate) struct Hierarchy {
    pub nodes: Vec<HierarchyNode>,
}

impl Hierarchy {
    /// Expands `root` breadth-first through `children_of`, stopping at
    /// `max_depth` generations when one is given.
    pub fn build<F>(root: usize, max_depth: Option<usize>, mut children_of: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<Vec<usize>>,
    {
        let mut nodes = vec![HierarchyNode {
            datum: root,
            parent: None,
            children: Vec::new(),
            depth: 0,
            x: 0.0,
            y: 0.0,
        }];
        let mut queue = VecDeque::from([0usize]);

        while let Some(index) = queue.pop_front() {
            let depth = nodes[index].depth;
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for datum in children_of(nodes[index].datum)? {
                if Self::on_path(&nodes, index, datum) {
                    return Err(LibError::invariant_with_code(
                        "family_ancestry_cycle",
                        "A person cannot be their own ancestor",
                        anyhow!("datum {} repeats on its own hierarchy path", datum),
                    ));
                }
                let child = nodes.len();
                nodes.push(HierarchyNode {
                    datum,
                    parent: Some(index),
                    children: Vec::new(),
                    depth: depth + 1,
                    x: 0.0,
                    y: 0.0,
                });
                nodes[index].children.push(child);
                queue.push_back(child);
            }
        }

        Ok(Self { nodes })
    }

    fn on_path(nodes: &[HierarchyNode], mut index: usize, datum: usize) -> bool {
        loop {
            if nodes[index].datum == datum {
                return true;
            }
            match nodes[index].parent {
                Some(parent) => index = parent,
                None => return false,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Assigns `x` (in multiples of `dx`) and `y = depth * dy`; the root lands
    /// on `x = 0`. `separation` gives the gap between two neighbouring nodes in
    /// units of `dx`.
    pub fn layout<S>(&mut self, dx: f64, dy: f64, separation: S)
    where
        S: Fn(&HierarchyNode, &HierarchyNode) -> f64,
    {
        let mut walker = Walker::new(self, separation);
        for v in walker.post_order() {
            walker.first_walk(v);
        }
        let root_prelim = walker.nodes[0].prelim;
        walker.nodes[walker.virtual_root].modifier = -root_prelim;

        let mut xs = vec![0.0; self.nodes.len()];
        for v in 0..self.nodes.len() {
            // breadth-first order visits parents first
            let parent = walker.nodes[v].parent;
            let parent_mod = walker.nodes[parent].modifier;
            xs[v] = walker.nodes[v].prelim + parent_mod;
            walker.nodes[v].modifier += parent_mod;
        }

        for (node, x) in self.nodes.iter_mut().zip(xs) {
            node.x = x * dx;
            node.y = node.depth as f64 * dy;
        }
    }
}

#[derive(Debug, Clone)]
struct WalkNode {
    parent: usize,
    children: Vec<usize>,
    number: usize,
    ancestor: usize,
    default_ancestor: Option<usize>,
    prelim: f64,
    modifier: f64,
    change: f64,
    shift: f64,
    thread: Option<usize>,
}

struct Walker<'h, S> {
    hierarchy: &'h Hierarchy,
    separation: S,
    nodes: Vec<WalkNode>,
    virtual_root: usize,
}

impl<'h, S> Walker<'h, S>
where
    S: Fn(&HierarchyNode, &HierarchyNode) -> f64,
{
    fn new(hierarchy: &'h Hierarchy, separation: S) -> Self {
        let virtual_root = hierarchy.nodes.len();
        let mut nodes: Vec<WalkNode> = hierarchy
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| WalkNode {
                parent: node.parent.unwrap_or(virtual_root),
                children: node.children.clone(),
                number: 0,
                ancestor: index,
                default_ancestor: None,
                prelim: 0.0,
                modifier: 0.0,
                change: 0.0,
                shift: 0.0,
                thread: None,
            })
            .collect();
        nodes.push(WalkNode {
            parent: virtual_root,
            children: vec![0],
            number: 0,
            ancestor: virtual_root,
            default_ancestor: None,
            prelim: 0.0,
            modifier: 0.0,
            change: 0.0,
            shift: 0.0,
            thread: None,
        });
        for node in &hierarchy.nodes {
            for (number, child) in node.children.iter().enumerate() {
                nodes[*child].number = number;
            }
        }
        Self {
            hierarchy,
            separation,
            nodes,
            virtual_root,
        }
    }

    fn separation(&self, a: usize, b: usize) -> f64 {
        (self.separation)(&self.hierarchy.nodes[a], &self.hierarchy.nodes[b])
    }

    /// Left-to-right post-order over the real nodes.
    fn post_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.virtual_root);
        let mut stack = vec![(0usize, false)];
        while let Some((v, expanded)) = stack.pop() {
            if expanded {
                order.push(v);
                continue;
            }
            stack.push((v, true));
            for child in self.nodes[v].children.iter().rev() {
                stack.push((*child, false));
            }
        }
        order
    }

    fn next_left(&self, v: usize) -> Option<usize> {
        self.nodes[v].children.first().copied().or(self.nodes[v].thread)
    }

    fn next_right(&self, v: usize) -> Option<usize> {
        self.nodes[v].children.last().copied().or(self.nodes[v].thread)
    }

    fn left_sibling(&self, v: usize) -> Option<usize> {
        let number = self.nodes[v].number;
        if number == 0 {
            return None;
        }
        Some(self.nodes[self.nodes[v].parent].children[number - 1])
    }

    fn first_walk(&mut self, v: usize) {
        let left = self.left_sibling(v);
        let outer_children = self.nodes[v]
            .children
            .first()
            .copied()
            .zip(self.nodes[v].children.last().copied());
        if let Some((first, last)) = outer_children {
            self.execute_shifts(v);
            let midpoint = (self.nodes[first].prelim + self.nodes[last].prelim) / 2.0;
            match left {
                Some(w) => {
                    self.nodes[v].prelim = self.nodes[w].prelim + self.separation(v, w);
                    self.nodes[v].modifier = self.nodes[v].prelim - midpoint;
                }
                None => self.nodes[v].prelim = midpoint,
            }
        } else if let Some(w) = left {
            self.nodes[v].prelim = self.nodes[w].prelim + self.separation(v, w);
        }

        let parent = self.nodes[v].parent;
        let first_sibling = self.nodes[parent].children[0];
        let default_ancestor = self.nodes[parent].default_ancestor.unwrap_or(first_sibling);
        let ancestor = self.apportion(v, left, default_ancestor);
        self.nodes[parent].default_ancestor = Some(ancestor);
    }

    fn apportion(&mut self, v: usize, left: Option<usize>, mut ancestor: usize) -> usize {
        let Some(w) = left else {
            return ancestor;
        };
        let mut vip = v;
        let mut vop = v;
        let mut vim = w;
        let mut vom = self.nodes[self.nodes[vip].parent].children[0];
        let mut sip = self.nodes[vip].modifier;
        let mut sop = self.nodes[vop].modifier;
        let mut sim = self.nodes[vim].modifier;
        let mut som = self.nodes[vom].modifier;

        let (inner_right, inner_left) = loop {
            let (next_vim, next_vip) = (self.next_right(vim), self.next_left(vip));
            let (Some(right), Some(left)) = (next_vim, next_vip) else {
                break (next_vim, next_vip);
            };
            vim = right;
            vip = left;
            vom = self.next_left(vom).unwrap_or(vom);
            vop = self.next_right(vop).unwrap_or(vop);
            self.nodes[vop].ancestor = v;
            let shift = self.nodes[vim].prelim + sim - self.nodes[vip].prelim - sip
                + self.separation(vim, vip);
            if shift > 0.0 {
                let from = self.next_ancestor(vim, v, ancestor);
                self.move_subtree(from, v, shift);
                sip += shift;
                sop += shift;
            }
            sim += self.nodes[vim].modifier;
            sip += self.nodes[vip].modifier;
            som += self.nodes[vom].modifier;
            sop += self.nodes[vop].modifier;
        };

        if let Some(vim) = inner_right.filter(|_| self.next_right(vop).is_none()) {
            self.nodes[vop].thread = Some(vim);
            self.nodes[vop].modifier += sim - sop;
        }
        if let Some(vip) = inner_left.filter(|_| self.next_left(vom).is_none()) {
            self.nodes[vom].thread = Some(vip);
            self.nodes[vom].modifier += sip - som;
            ancestor = v;
        }
        ancestor
    }

    fn next_ancestor(&self, vim: usize, v: usize, ancestor: usize) -> usize {
        let candidate = self.nodes[vim].ancestor;
        if self.nodes[candidate].parent == self.nodes[v].parent {
            candidate
        } else {
            ancestor
        }
    }

    fn move_subtree(&mut self, wm: usize, wp: usize, shift: f64) {
        let subtrees = self.nodes[wp].number as f64 - self.nodes[wm].number as f64;
        let change = shift / subtrees;
        self.nodes[wp].change -= change;
        self.nodes[wp].shift += shift;
        self.nodes[wm].change += change;
        self.nodes[wp].prelim += shift;
        self.nodes[wp].modifier += shift;
    }

    fn execute_shifts(&mut self, v: usize) {
        let mut shift = 0.0;
        let mut change = 0.0;
        for index in (0..self.nodes[v].children.len()).rev() {
            let w = self.nodes[v].children[index];
            self.nodes[w].prelim += shift;
            self.nodes[w].modifier += shift;
            change += self.nodes[w].change;
            shift += self.nodes[w].shift + change;
        }
    }
}
