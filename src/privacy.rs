use std::collections::{HashMap, HashSet};

use anyhow::anyhow;

use crate::algorithms::find;
use crate::error::{LibError, Result};
use crate::layout::TreeDatum;
use crate::models::{Datum, PersonId};

pub type PrivacyPredicate = dyn Fn(&Datum) -> bool + Send + Sync;

/// Memoized privacy lookups for one pass over a family graph.
///
/// A person is private when the predicate matches them or anyone reachable
/// through parents and spouses. Placeholders neither match nor propagate.
pub struct PrivacyResolver<'a> {
    data: &'a [Datum],
    predicate: &'a PrivacyPredicate,
    resolved: HashMap<PersonId, bool>,
}

impl<'a> PrivacyResolver<'a> {
    pub fn new(data: &'a [Datum], predicate: &'a PrivacyPredicate) -> Self {
        Self {
            data,
            predicate,
            resolved: HashMap::new(),
        }
    }

    pub fn is_private(&mut self, id: &PersonId) -> Result<bool> {
        if let Some(&known) = self.resolved.get(id) {
            return Ok(known);
        }

        let mut visited: HashSet<&PersonId> = HashSet::from([id]);
        let mut stack: Vec<&PersonId> = vec![id];
        let mut private = false;
        while let Some(current) = stack.pop() {
            match self.resolved.get(current) {
                Some(true) => {
                    private = true;
                    break;
                }
                // everything reachable from a resolved public person is public too
                Some(false) => continue,
                None => {}
            }
            let datum = find(self.data, current).ok_or_else(|| {
                LibError::invariant(
                    "Person not found",
                    anyhow!("privacy walk reached missing person {}", current),
                )
            })?;
            if datum.is_placeholder() {
                continue;
            }
            if (self.predicate)(datum) {
                private = true;
                break;
            }
            for next in datum.rels.parents.iter().chain(datum.rels.spouses.iter()).rev() {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }

        self.resolved.insert(id.clone(), private);
        Ok(private)
    }
}

/// Flags every committed card whose person resolves as private.
pub fn handle_private_cards(
    tree: &mut [TreeDatum],
    data_stash: &[Datum],
    predicate: &PrivacyPredicate,
) -> Result<()> {
    let mut resolver = PrivacyResolver::new(data_stash, predicate);
    for node in tree.iter_mut() {
        if node.data.is_placeholder() {
            continue;
        }
        if resolver.is_private(&node.data.id)? {
            node.is_private = true;
        }
    }
    Ok(())
}
