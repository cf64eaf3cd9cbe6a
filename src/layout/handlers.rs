use std::cmp::Ordering;
use std::collections::HashSet;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use super::{ChildComparator, TreeDatum};
use crate::algorithms::{Direction, find, tree_height};
use crate::error::{LibError, Result};
use crate::models::{Datum, Gender, PersonId};

/// Distance an exiting card travels away from the centre.
pub const EXIT_OFFSET: f64 = 400.0;

fn other_parent<'a>(child: &Datum, parent: &Datum, data: &'a [Datum]) -> Option<&'a Datum> {
    data.iter()
        .find(|d| d.id != parent.id && child.rels.parents.contains(&d.id))
}

/// Groups children by the spouse they were had with, in the parent's spouse
/// order; reversed for anyone but a male parent so each spouse's children
/// stay on that spouse's side.
pub fn sort_children_with_spouses(children: &mut [&Datum], parent: &Datum, data: &[Datum]) {
    let spouse_index = |child: &Datum| -> isize {
        other_parent(child, parent, data)
            .and_then(|other| parent.rels.spouses.iter().position(|id| id == &other.id))
            .map_or(-1, |index| index as isize)
    };
    children.sort_by(|a, b| {
        let (a_index, b_index) = (spouse_index(a), spouse_index(b));
        if parent.gender() == Gender::Male {
            a_index.cmp(&b_index)
        } else {
            b_index.cmp(&a_index)
        }
    });
}

/// Placeholder children go after committed ones.
pub fn sort_add_new_children(children: &mut [&Datum]) {
    children.sort_by_key(|child| child.is_placeholder());
}

/// Appends the focal person's siblings beside them.
///
/// Siblings share at least one parent with the main person. Ordering asks the
/// caller's comparator first; ties fall back to: no second parent first, no
/// first parent last.
pub fn setup_siblings(
    tree: &mut Vec<TreeDatum>,
    data_stash: &[Datum],
    node_separation: f64,
    compare: Option<&ChildComparator>,
) -> Result<()> {
    let main = tree
        .iter()
        .position(|d| d.data.main && !d.added && !d.sibling)
        .ok_or_else(|| LibError::invariant("Main person not found", anyhow!("no main node in tree")))?;
    let main_id = tree[main].data.id.clone();
    let shared: Vec<PersonId> = tree[main].data.rels.parents.iter().take(2).cloned().collect();

    let siblings: Vec<&Datum> = data_stash
        .iter()
        .filter(|d| d.id != main_id && shared.iter().any(|p| d.rels.parents.contains(p)))
        .collect();
    if siblings.is_empty() {
        return Ok(());
    }
    if tree[main].parents.is_empty() {
        return Err(LibError::invariant(
            "Main person has no parents in tree",
            anyhow!("siblings of {} found without laid-out parents", main_id),
        ));
    }

    let main_parents = tree[main].parents.clone();
    let (main_y, main_depth) = (tree[main].y, tree[main].depth);
    let mut added = Vec::with_capacity(siblings.len());
    for sibling in siblings {
        let mut node = TreeDatum::new(sibling.clone(), 0.0, main_y, main_depth - 1);
        node.sibling = true;
        for parent_id in sibling.rels.parents.iter().take(2) {
            if let Some(&parent) = main_parents.iter().find(|&&p| &tree[p].data.id == parent_id) {
                node.parents.push(parent);
            }
        }
        added.push(tree.len());
        tree.push(node);
    }

    let has_parent_slot = |index: usize, slot: usize| {
        tree[index]
            .data
            .rels
            .parents
            .get(slot)
            .is_some_and(|id| main_parents.iter().any(|&p| &tree[p].data.id == id))
    };
    let default_order = |a: usize, b: usize| match (has_parent_slot(a, 1), has_parent_slot(b, 1)) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => match (has_parent_slot(a, 0), has_parent_slot(b, 0)) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            _ => Ordering::Equal,
        },
    };

    let mut sorted = Vec::with_capacity(added.len() + 1);
    sorted.push(main);
    sorted.extend(added.iter().copied());
    sorted.sort_by(|&a, &b| {
        compare
            .map_or(Ordering::Equal, |compare| compare(&tree[a].data, &tree[b].data))
            .then_with(|| default_order(a, b))
    });

    let (min_x, max_x) = tree[main]
        .spouses
        .iter()
        .map(|&spouse| tree[spouse].x)
        .fold((tree[main].x, tree[main].x), |(lo, hi), x| (lo.min(x), hi.max(x)));
    let main_slot = sorted.iter().position(|&index| index == main).unwrap_or(0);
    for (slot, &index) in sorted.iter().enumerate() {
        if slot < main_slot {
            tree[index].x = min_x - node_separation * (main_slot - slot) as f64;
        } else if slot > main_slot {
            tree[index].x = max_x + node_separation * (slot - main_slot) as f64;
        }
    }
    Ok(())
}

/// Sets `_x/_y` for a card appearing in or leaving the chart.
///
/// Entering cards start from the card they grow out of; exiting cards fly
/// [`EXIT_OFFSET`] outward within their quadrant.
pub fn calculate_enter_and_exit_positions(
    tree: &mut [TreeDatum],
    index: usize,
    entering: bool,
    exiting: bool,
) -> Result<()> {
    let node = &tree[index];
    let position = if entering {
        if node.depth == 0 && node.spouse.is_none() {
            Some((node.x, node.y))
        } else if let Some(spouse) = node.spouse {
            Some((tree[spouse].x, tree[spouse].y))
        } else if node.is_ancestry {
            let parent = node.parent.ok_or_else(|| {
                LibError::invariant(
                    "Ancestry node has no parent",
                    anyhow!("ancestry node {} is detached", node.tid),
                )
            })?;
            Some((tree[parent].x, tree[parent].y))
        } else {
            Some((node.psx.unwrap_or(node.x), node.psy.unwrap_or(node.y)))
        }
    } else if exiting {
        let outward = |value: f64| if value > 0.0 { 1.0 } else { -1.0 };
        Some((
            node.x + EXIT_OFFSET * outward(node.x),
            node.y + EXIT_OFFSET * outward(node.y),
        ))
    } else {
        None
    };

    let node = &mut tree[index];
    node.exiting = exiting;
    if let Some((x, y)) = position {
        node.transition_x = Some(x);
        node.transition_y = Some(y);
    }
    Ok(())
}

/// Marks cards that are new since `previous` as entering and appends the
/// cards that disappeared as exiting, keyed by `tid`.
pub fn apply_transitions(previous: Option<&[TreeDatum]>, tree: &mut Vec<TreeDatum>) -> Result<()> {
    let previous = previous.unwrap_or_default();
    let previous_tids: HashSet<&str> = previous
        .iter()
        .filter(|d| !d.exiting)
        .map(|d| d.tid.as_str())
        .collect();
    let current_tids: HashSet<String> = tree.iter().map(|d| d.tid.clone()).collect();

    for index in 0..tree.len() {
        let entering = !previous_tids.contains(tree[index].tid.as_str());
        calculate_enter_and_exit_positions(tree, index, entering, false)?;
    }

    for old in previous
        .iter()
        .filter(|d| !d.exiting && !current_tids.contains(&d.tid))
    {
        let mut node = old.clone();
        node.detach();
        tree.push(node);
        let index = tree.len() - 1;
        calculate_enter_and_exit_positions(tree, index, false, true)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxDepth {
    pub ancestry: usize,
    pub progeny: usize,
}

/// How many committed generations exist above and below `id`.
///
/// The layout never clamps with this; callers use it to bound the
/// `ancestry_depth` and `progeny_depth` they offer for a chart.
pub fn get_max_depth(id: &PersonId, data: &[Datum]) -> Result<MaxDepth> {
    let datum = find(data, id).ok_or_else(|| {
        LibError::not_found("Person not found", anyhow!("cannot measure depth of missing person {}", id))
    })?;
    Ok(MaxDepth {
        ancestry: tree_height(data, datum, Direction::Ancestry)?,
        progeny: tree_height(data, datum, Direction::Progeny)?,
    })
}
