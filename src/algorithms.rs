use std::collections::{HashMap, HashSet};

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{Datum, PersonId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ancestry,
    Progeny,
}

impl Direction {
    fn edges(self, datum: &Datum) -> &[PersonId] {
        match self {
            Direction::Ancestry => &datum.rels.parents,
            Direction::Progeny => &datum.rels.children,
        }
    }

    const fn missing_message(self) -> &'static str {
        match self {
            Direction::Ancestry => "Parent not found",
            Direction::Progeny => "Child not found",
        }
    }
}

pub fn find<'a>(data: &'a [Datum], id: &PersonId) -> Option<&'a Datum> {
    data.iter().find(|d| &d.id == id)
}

fn require<'a>(data: &'a [Datum], id: &PersonId, direction: Direction) -> Result<&'a Datum> {
    find(data, id).ok_or_else(|| {
        LibError::invariant(
            direction.missing_message(),
            anyhow!("person {} referenced but missing", id),
        )
    })
}

/// Every person reachable from `start` by repeatedly following parents.
/// Placeholders are neither collected nor walked through.
pub fn ancestry_ids(data: &[Datum], start: &Datum) -> Result<Vec<PersonId>> {
    closure(data, start, Direction::Ancestry)
}

/// Every person reachable from `start` by repeatedly following children.
pub fn progeny_ids(data: &[Datum], start: &Datum) -> Result<Vec<PersonId>> {
    closure(data, start, Direction::Progeny)
}

fn closure(data: &[Datum], start: &Datum, direction: Direction) -> Result<Vec<PersonId>> {
    let mut visited: HashSet<&PersonId> = HashSet::new();
    let mut collected = Vec::new();
    let mut stack: Vec<&PersonId> = direction.edges(start).iter().rev().collect();

    while let Some(id) = stack.pop() {
        if id == &start.id || !visited.insert(id) {
            continue;
        }
        let datum = require(data, id, direction)?;
        if datum.is_placeholder() {
            continue;
        }
        collected.push(id.clone());
        stack.extend(direction.edges(datum).iter().rev());
    }

    Ok(collected)
}

fn committed_neighbours<'a>(
    data: &'a [Datum],
    datum: &'a Datum,
    direction: Direction,
) -> Result<Vec<&'a Datum>> {
    let mut out = Vec::with_capacity(direction.edges(datum).len());
    for id in direction.edges(datum) {
        let next = require(data, id, direction)?;
        if next.is_committed() {
            out.push(next);
        }
    }
    Ok(out)
}

/// Height of the hierarchy rooted at `start` when only committed people are
/// walked: 0 for a leaf, 1 + the tallest branch otherwise.
pub fn tree_height(data: &[Datum], start: &Datum, direction: Direction) -> Result<usize> {
    let mut heights: HashMap<&PersonId, usize> = HashMap::new();
    let mut on_path: HashSet<&PersonId> = HashSet::new();
    let mut stack: Vec<(&Datum, bool)> = vec![(start, false)];

    while let Some((datum, expanded)) = stack.pop() {
        if expanded {
            on_path.remove(&datum.id);
            let mut height = 0;
            for next in committed_neighbours(data, datum, direction)? {
                height = height.max(heights.get(&next.id).copied().unwrap_or(0) + 1);
            }
            heights.insert(&datum.id, height);
            continue;
        }
        if heights.contains_key(&datum.id) {
            continue;
        }
        if !on_path.insert(&datum.id) {
            return Err(cycle_error(&datum.id));
        }
        stack.push((datum, true));
        for next in committed_neighbours(data, datum, direction)? {
            if heights.contains_key(&next.id) {
                continue;
            }
            if on_path.contains(&next.id) {
                return Err(cycle_error(&next.id));
            }
            stack.push((next, false));
        }
    }

    Ok(heights.get(&start.id).copied().unwrap_or(0))
}

fn cycle_error(id: &PersonId) -> LibError {
    LibError::invariant_with_code(
        "family_ancestry_cycle",
        "A person cannot be their own ancestor",
        anyhow!("cycle detected through person {}", id),
    )
}
