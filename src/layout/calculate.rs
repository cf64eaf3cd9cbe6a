use std::collections::{HashMap, HashSet};

use anyhow::anyhow;

use super::handlers::{setup_siblings, sort_add_new_children, sort_children_with_spouses};
use super::tidy::{Hierarchy, HierarchyNode};
use super::{CalculatedTree, LayoutOptions, TreeDatum, TreeDim};
use crate::error::{LibError, Result};
use crate::models::{Datum, Gender, PersonId};
use crate::privacy::handle_private_cards;

/// Lays out the family around the focal person.
///
/// The graph is copied first; `to_add` cards created for single-parent
/// children only exist in the returned `data_stash`.
pub fn calculate_tree(data: &[Datum], options: &LayoutOptions<'_>) -> Result<CalculatedTree> {
    if data.is_empty() {
        return Err(LibError::invalid(
            "Family data is empty",
            anyhow!("cannot lay out a family without people"),
        ));
    }
    let config = options.config;
    let (mut node_separation, mut level_separation) =
        (config.node_separation, config.level_separation);
    if config.is_horizontal {
        std::mem::swap(&mut node_separation, &mut level_separation);
    }

    let mut stash = data.to_vec();
    if config.single_parent_empty_card {
        create_rels_to_add(&mut stash)?;
    }
    let main_index = options
        .main_id
        .and_then(|id| stash.iter().position(|d| &d.id == id))
        .unwrap_or(0);
    for (index, datum) in stash.iter_mut().enumerate() {
        datum.main = index == main_index;
    }
    let main_id = stash[main_index].id.clone();

    let mut tree = {
        let lookup = StashLookup::new(&stash);
        let depth_limit = |depth: Option<usize>| {
            if options.one_level_rels { Some(1) } else { depth }
        };

        let mut progeny = Hierarchy::build(main_index, depth_limit(config.progeny_depth), |index| {
            lookup.children_of(index, options)
        })?;
        progeny.layout(node_separation, level_separation, |a, b| {
            progeny_separation(&stash, a, b, options.one_level_rels)
        });

        let mut ancestry = Hierarchy::build(main_index, depth_limit(config.ancestry_depth), |index| {
            lookup.parents_of(index)
        })?;
        ancestry.layout(node_separation, level_separation, |_, _| 1.0);

        merge_sides(&stash, &progeny, &ancestry)
    };

    setup_children_and_parents(&mut tree);
    setup_spouses(&mut tree, &stash, node_separation)?;
    if config.show_siblings_of_main && !options.one_level_rels && config.ancestry_depth != Some(0) {
        setup_siblings(
            &mut tree,
            &stash,
            node_separation,
            options.hooks.sort_children.as_deref(),
        )?;
    }
    setup_progeny_parents_pos(&mut tree, config.is_horizontal);
    node_positioning(&mut tree, config.is_horizontal);
    setup_all_rels_displayed(&mut tree);
    setup_tid(&mut tree);
    let dim = calculate_tree_dim(&tree, config.node_separation, config.level_separation);

    if let Some(predicate) = &options.hooks.private_cards {
        handle_private_cards(&mut tree, &stash, predicate.as_ref())?;
    }

    tracing::trace!(main_id = %main_id, nodes = tree.len(), "tree layout calculated");
    Ok(CalculatedTree {
        data: tree,
        data_stash: stash,
        dim,
        main_id,
        is_horizontal: config.is_horizontal,
    })
}

/// Gives every person whose children list them as the only parent one
/// synthetic `to_add` spouse that becomes those children's second parent.
pub fn create_rels_to_add(data: &mut Vec<Datum>) -> Result<()> {
    let mut to_add: Vec<Datum> = Vec::new();

    for index in 0..data.len() {
        let parent_id = data[index].id.clone();
        let children = data[index].rels.children.clone();
        let mut spouse_slot: Option<usize> = None;

        for child_id in &children {
            let child_index = data.iter().position(|d| &d.id == child_id).ok_or_else(|| {
                LibError::invariant("Child not found", anyhow!("child {} missing", child_id))
            })?;
            if data[child_index].rels.parents.as_slice() != std::slice::from_ref(&parent_id) {
                continue;
            }
            let slot = match spouse_slot {
                Some(slot) => slot,
                None => {
                    let mut spouse = Datum::new(PersonId::generate(), data[index].gender().opposite());
                    spouse.to_add = true;
                    spouse.rels.spouses.push(parent_id.clone());
                    data[index].rels.spouses.push(spouse.id.clone());
                    to_add.push(spouse);
                    spouse_slot = Some(to_add.len() - 1);
                    to_add.len() - 1
                }
            };
            to_add[slot].rels.children.push(child_id.clone());
            let spouse_id = to_add[slot].id.clone();
            data[child_index].rels.parents.push(spouse_id);
        }
    }

    data.extend(to_add);
    Ok(())
}

struct StashLookup<'a> {
    data: &'a [Datum],
    by_id: HashMap<&'a PersonId, usize>,
}

impl<'a> StashLookup<'a> {
    fn new(data: &'a [Datum]) -> Self {
        let mut by_id = HashMap::with_capacity(data.len());
        for (index, datum) in data.iter().enumerate() {
            by_id.entry(&datum.id).or_insert(index);
        }
        Self { data, by_id }
    }

    fn index_of(&self, id: &PersonId, public: &'static str) -> Result<usize> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| LibError::invariant(public, anyhow!("person {} missing from layout data", id)))
    }

    fn children_of(&self, index: usize, options: &LayoutOptions<'_>) -> Result<Vec<usize>> {
        let datum = &self.data[index];
        let mut children = datum
            .rels
            .children
            .iter()
            .map(|id| self.index_of(id, "Child not found").map(|i| &self.data[i]))
            .collect::<Result<Vec<&Datum>>>()?;

        if let Some(compare) = &options.hooks.sort_children {
            children.sort_by(|a, b| compare(a, b));
        }
        sort_add_new_children(&mut children);
        if options.config.sort_children_with_spouses {
            sort_children_with_spouses(&mut children, datum, self.data);
        }

        children
            .into_iter()
            .map(|child| self.index_of(&child.id, "Child not found"))
            .collect()
    }

    fn parents_of(&self, index: usize) -> Result<Vec<usize>> {
        self.data[index]
            .rels
            .parents
            .iter()
            .map(|id| self.index_of(id, "Parent not found"))
            .collect()
    }
}

fn progeny_separation(data: &[Datum], a: &HierarchyNode, b: &HierarchyNode, one_level_rels: bool) -> f64 {
    let (da, db) = (&data[a.datum], &data[b.datum]);
    let same_parent = a.parent == b.parent;
    let mut offset = 1.0;
    if !same_parent {
        offset += 0.25;
    }
    if !one_level_rels && (!da.rels.spouses.is_empty() || !db.rels.spouses.is_empty()) {
        offset += (da.rels.spouses.len() + db.rels.spouses.len()) as f64 * 0.5;
    }
    if same_parent && !same_parents(da, db) {
        offset += 0.125;
    }
    offset
}

fn same_parents(a: &Datum, b: &Datum) -> bool {
    let mut pa: Vec<&PersonId> = a.rels.parents.iter().collect();
    let mut pb: Vec<&PersonId> = b.rels.parents.iter().collect();
    pa.sort();
    pb.sort();
    pa == pb
}

/// Joins the descendant tree with the ancestor tree, whose root is the same
/// focal person and is dropped.
fn merge_sides(data: &[Datum], progeny: &Hierarchy, ancestry: &Hierarchy) -> Vec<TreeDatum> {
    let mid_diff = (ancestry.nodes[0].x - progeny.nodes[0].x) / 2.0;
    let mut tree = Vec::with_capacity(progeny.len() + ancestry.len());

    for node in &progeny.nodes {
        let mut datum = TreeDatum::new(data[node.datum].clone(), node.x + mid_diff, node.y, node.depth as i32);
        datum.parent = node.parent;
        tree.push(datum);
    }

    let offset = progeny.len();
    for node in ancestry.nodes.iter().skip(1) {
        let mut datum = TreeDatum::new(data[node.datum].clone(), node.x - mid_diff, node.y, node.depth as i32);
        datum.is_ancestry = true;
        datum.parent = node.parent.map(|parent| if parent == 0 { 0 } else { offset + parent - 1 });
        tree.push(datum);
    }
    tree
}

fn setup_children_and_parents(tree: &mut [TreeDatum]) {
    for index in 0..tree.len() {
        let Some(parent) = tree[index].parent else {
            continue;
        };
        if tree[index].is_ancestry {
            tree[parent].parents.push(index);
        } else {
            tree[parent].children.push(index);
        }
    }
}

/// Places spouse cards beside every descendant-side person and centres each
/// pair of parents around their midpoint.
fn setup_spouses(tree: &mut Vec<TreeDatum>, data: &[Datum], node_separation: f64) -> Result<()> {
    for index in (0..tree.len()).rev() {
        if !tree[index].is_ancestry && !tree[index].data.rels.spouses.is_empty() {
            let spouse_ids = tree[index].data.rels.spouses.clone();
            let side = if tree[index].data.gender() == Gender::Male { -1.0 } else { 1.0 };
            tree[index].x += spouse_ids.len() as f64 / 2.0 * node_separation * side;
            let (x, y, depth) = (tree[index].x, tree[index].y, tree[index].depth);

            for (i, spouse_id) in spouse_ids.iter().enumerate() {
                let spouse = data.iter().find(|d| &d.id == spouse_id).ok_or_else(|| {
                    LibError::invariant("Spouse not found", anyhow!("spouse {} missing", spouse_id))
                })?;
                let spouse_x = x - node_separation * (i + 1) as f64 * side;
                let mut node = TreeDatum::new(spouse.clone(), spouse_x, y, depth);
                node.added = true;
                node.spouse = Some(index);
                if i > 0 {
                    node.sx = Some(spouse_x);
                    node.sy = Some(y);
                } else {
                    node.sx = Some(spouse_x + node_separation / 2.0 * side);
                    node.sy = Some(y + node_separation / 2.0 * side);
                }
                let spouse_index = tree.len();
                tree.push(node);
                tree[index].spouses.push(spouse_index);
            }
        }

        if let [p1, p2] = tree[index].parents[..] {
            let midpoint = tree[p1].x - (tree[p1].x - tree[p2].x) / 2.0;
            let beside = |from: f64, to: f64| midpoint + node_separation / 2.0 * if from < to { 1.0 } else { -1.0 };
            tree[p2].x = beside(tree[p1].x, tree[p2].x);
            tree[p1].x = beside(tree[p2].x, tree[p1].x);
        }
    }
    Ok(())
}

/// Records where each descendant's connecting line starts: the midpoint
/// marker of the parents' union, or the single parent.
fn setup_progeny_parents_pos(tree: &mut [TreeDatum], is_horizontal: bool) {
    for index in 0..tree.len() {
        let node = &tree[index];
        if node.is_ancestry || node.depth == 0 || node.added || node.sibling {
            continue;
        }
        let Some(p1) = node.parent else {
            continue;
        };
        let other_parent = tree[p1]
            .spouses
            .iter()
            .copied()
            .find(|&spouse| node.data.rels.parents.contains(&tree[spouse].data.id));

        let source = match other_parent {
            Some(p2) => {
                if tree[p1].added { p1 } else { p2 }
            }
            None => {
                tree[p1].sx = Some(tree[p1].x);
                tree[p1].sy = Some(tree[p1].y);
                p1
            }
        };
        let sx = tree[source].sx.unwrap_or(tree[source].x);
        let sy = tree[source].y;
        let (psx, psy) = if is_horizontal { (sy, sx) } else { (sx, sy) };
        tree[index].psx = Some(psx);
        tree[index].psy = Some(psy);
    }
}

fn node_positioning(tree: &mut [TreeDatum], is_horizontal: bool) {
    for node in tree.iter_mut() {
        if node.is_ancestry {
            node.y = -node.y;
        }
        if is_horizontal {
            std::mem::swap(&mut node.x, &mut node.y);
        }
    }
}

fn setup_all_rels_displayed(tree: &mut [TreeDatum]) {
    let shown: HashSet<PersonId> = tree.iter().map(|d| d.data.id.clone()).collect();
    for node in tree.iter_mut() {
        node.all_rels_displayed = node.data.relative_ids().all(|id| shown.contains(id));
    }
}

/// Gives every node a tree id; a person drawn more than once gets
/// `{id}--x{n}` on each copy.
fn setup_tid(tree: &mut [TreeDatum]) {
    let mut seen: HashSet<PersonId> = HashSet::new();
    for index in 0..tree.len() {
        let id = tree[index].data.id.clone();
        if seen.insert(id.clone()) {
            tree[index].tid = id.to_string();
            continue;
        }
        let copies: Vec<usize> = (0..tree.len()).filter(|&i| tree[i].data.id == id).collect();
        if copies.len() > 1 {
            for (n, copy) in copies.iter().enumerate() {
                tree[*copy].tid = format!("{}--x{}", id, n + 1);
                tree[*copy].duplicate = Some(copies.len());
            }
        }
    }
}

fn calculate_tree_dim(tree: &[TreeDatum], node_separation: f64, level_separation: f64) -> TreeDim {
    let extent = |value: fn(&TreeDatum) -> f64| {
        tree.iter().map(value).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
    };
    let (min_x, max_x) = extent(|d| d.x);
    let (min_y, max_y) = extent(|d| d.y);
    TreeDim {
        width: max_x - min_x + node_separation,
        height: max_y - min_y + level_separation,
        x_off: -min_x + node_separation / 2.0,
        y_off: -min_y + level_separation / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChartConfig;
    use crate::layout::LayoutHooks;

    fn link(data: &mut [Datum], parent: &str, child: &str) {
        for d in data.iter_mut() {
            if d.id.as_str() == parent {
                d.rels.children.push(child.into());
            }
            if d.id.as_str() == child {
                d.rels.parents.push(parent.into());
            }
        }
    }

    fn marry(data: &mut [Datum], a: &str, b: &str) {
        for d in data.iter_mut() {
            if d.id.as_str() == a {
                d.rels.spouses.push(b.into());
            }
            if d.id.as_str() == b {
                d.rels.spouses.push(a.into());
            }
        }
    }

    fn family() -> Vec<Datum> {
        let mut data = vec![
            Datum::new("me", Gender::Male),
            Datum::new("dad", Gender::Male),
            Datum::new("mom", Gender::Female),
            Datum::new("wife", Gender::Female),
            Datum::new("kid", Gender::Female),
        ];
        link(&mut data, "dad", "me");
        link(&mut data, "mom", "me");
        marry(&mut data, "dad", "mom");
        marry(&mut data, "me", "wife");
        link(&mut data, "me", "kid");
        link(&mut data, "wife", "kid");
        data
    }

    fn layout(data: &[Datum], config: &ChartConfig) -> CalculatedTree {
        let hooks = LayoutHooks::default();
        let options = LayoutOptions {
            config,
            main_id: None,
            one_level_rels: false,
            hooks: &hooks,
        };
        calculate_tree(data, &options).expect("layout should succeed")
    }

    #[test]
    fn caller_comparator_orders_children() {
        let mut data = family();
        for id in ["a", "b"] {
            data.push(Datum::new(id, Gender::Male));
            link(&mut data, "me", id);
            link(&mut data, "wife", id);
        }
        let config = ChartConfig::default();
        let hooks = LayoutHooks {
            sort_children: Some(std::sync::Arc::new(|a: &Datum, b: &Datum| b.id.cmp(&a.id))),
            private_cards: None,
        };
        let options = LayoutOptions {
            config: &config,
            main_id: None,
            one_level_rels: false,
            hooks: &hooks,
        };
        let tree = calculate_tree(&data, &options).expect("layout should succeed");

        let x = |id: &str| tree.find_by_id(&id.into()).expect("child card").x;
        assert!(x("kid") < x("b"), "reverse id order puts kid first");
        assert!(x("b") < x("a"));

        let plain = layout(&data, &config);
        let plain_x = |id: &str| plain.find_by_id(&id.into()).expect("child card").x;
        assert!(plain_x("kid") < plain_x("a") && plain_x("a") < plain_x("b"), "insertion order without a comparator");
    }

    #[test]
    fn focal_family_is_positioned_around_main() {
        let config = ChartConfig::default();
        let tree = layout(&family(), &config);

        let me = tree.find_by_id(&"me".into()).expect("me");
        let wife = tree.find_by_id(&"wife".into()).expect("wife");
        let dad = tree.find_by_id(&"dad".into()).expect("dad");
        let mom = tree.find_by_id(&"mom".into()).expect("mom");
        let kid = tree.find_by_id(&"kid".into()).expect("kid");

        assert!(me.data.main);
        // a male main moves left to make room for his wife on the right
        assert_eq!(me.x, -125.0);
        assert_eq!(wife.x, 125.0);
        assert!(wife.added);
        assert_eq!(dad.y, -150.0);
        assert_eq!((dad.x, mom.x), (-125.0, 125.0));
        assert_eq!(kid.y, 150.0);
        assert_eq!(kid.psx, wife.sx);
        assert!(tree.data.iter().all(|d| d.all_rels_displayed));
    }

    #[test]
    fn horizontal_layout_swaps_axes() {
        let config = ChartConfig {
            is_horizontal: true,
            ..ChartConfig::default()
        };
        let tree = layout(&family(), &config);
        let dad = tree.find_by_id(&"dad".into()).expect("dad");
        let kid = tree.find_by_id(&"kid".into()).expect("kid");
        assert_eq!(dad.x, -250.0);
        assert_eq!(kid.x, 250.0);
        assert!(tree.is_horizontal);
    }

    #[test]
    fn depth_limits_trim_generations() {
        let config = ChartConfig {
            ancestry_depth: Some(0),
            progeny_depth: Some(0),
            ..ChartConfig::default()
        };
        let tree = layout(&family(), &config);
        let ids: Vec<&str> = tree.data.iter().map(|d| d.data.id.as_str()).collect();
        assert_eq!(ids, vec!["me", "wife"]);
        assert!(!tree.data[0].all_rels_displayed);
    }

    #[test]
    fn single_parent_children_get_a_to_add_card() {
        let mut data = vec![Datum::new("mom", Gender::Female), Datum::new("kid", Gender::Male)];
        link(&mut data, "mom", "kid");
        let tree = layout(&data, &ChartConfig::default());

        let card = tree.data_stash.iter().find(|d| d.to_add).expect("to_add card");
        assert_eq!(card.gender(), Gender::Male);
        assert_eq!(card.rels.children, vec![PersonId::from("kid")]);
        let kid = tree.data_stash.iter().find(|d| d.id.as_str() == "kid").expect("kid");
        assert_eq!(kid.rels.parents.len(), 2);
        // the source graph is untouched
        assert_eq!(data[1].rels.parents.len(), 1);
    }

    #[test]
    fn repeated_people_get_distinct_tids() {
        let mut tree = vec![
            TreeDatum::new(Datum::new("a", Gender::Male), 0.0, 0.0, 0),
            TreeDatum::new(Datum::new("b", Gender::Male), 0.0, 0.0, 0),
            TreeDatum::new(Datum::new("a", Gender::Male), 0.0, 0.0, 0),
        ];
        setup_tid(&mut tree);
        let tids: Vec<&str> = tree.iter().map(|d| d.tid.as_str()).collect();
        assert_eq!(tids, vec!["a--x1", "b", "a--x2"]);
        assert_eq!(tree[0].duplicate, Some(2));
    }

    #[test]
    fn empty_data_is_rejected() {
        let config = ChartConfig::default();
        let hooks = LayoutHooks::default();
        let options = LayoutOptions {
            config: &config,
            main_id: None,
            one_level_rels: false,
            hooks: &hooks,
        };
        let err = calculate_tree(&[], &options).expect_err("empty data should fail");
        assert_eq!(err.code, "invalid_input");
    }
}
