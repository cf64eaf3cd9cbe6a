use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::{LibError, Result};
use crate::models::{Datum, PersonId};

pub const MAX_PARENTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Parent,
    Spouse,
    Child,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FamilyInvariantViolation {
    DuplicatePerson {
        person_id: PersonId,
    },
    UnknownReference {
        person_id: PersonId,
        edge: EdgeKind,
        missing_id: PersonId,
    },
    SelfReference {
        person_id: PersonId,
        edge: EdgeKind,
    },
    DuplicateEdge {
        person_id: PersonId,
        edge: EdgeKind,
        related_id: PersonId,
    },
    TooManyParents {
        person_id: PersonId,
        parent_count: usize,
    },
    AsymmetricParentChild {
        parent_id: PersonId,
        child_id: PersonId,
    },
    AsymmetricSpouse {
        person_id: PersonId,
        spouse_id: PersonId,
    },
    AncestryCycle {
        person_ids: Vec<PersonId>,
    },
}

impl FamilyInvariantViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            FamilyInvariantViolation::DuplicatePerson { .. } => "family_duplicate_person",
            FamilyInvariantViolation::UnknownReference { .. } => "family_unknown_reference",
            FamilyInvariantViolation::SelfReference { .. } => "family_self_reference",
            FamilyInvariantViolation::DuplicateEdge { .. } => "family_duplicate_edge",
            FamilyInvariantViolation::TooManyParents { .. } => "family_too_many_parents",
            FamilyInvariantViolation::AsymmetricParentChild { .. } => {
                "family_asymmetric_parent_child"
            }
            FamilyInvariantViolation::AsymmetricSpouse { .. } => "family_asymmetric_spouse",
            FamilyInvariantViolation::AncestryCycle { .. } => "family_ancestry_cycle",
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            FamilyInvariantViolation::DuplicatePerson { .. } => "Person IDs must be unique",
            FamilyInvariantViolation::UnknownReference { .. } => {
                "Relationship references a person that does not exist"
            }
            FamilyInvariantViolation::SelfReference { .. } => {
                "A person cannot be their own relative"
            }
            FamilyInvariantViolation::DuplicateEdge { .. } => {
                "Relationship lists must not repeat a person"
            }
            FamilyInvariantViolation::TooManyParents { .. } => {
                "A person cannot have more than two parents"
            }
            FamilyInvariantViolation::AsymmetricParentChild { .. } => {
                "Parent and child relationships must mirror each other"
            }
            FamilyInvariantViolation::AsymmetricSpouse { .. } => {
                "Spouse relationships must mirror each other"
            }
            FamilyInvariantViolation::AncestryCycle { .. } => {
                "A person cannot be their own ancestor"
            }
        }
    }
}

/// Every structural problem in `data`, in a stable order.
pub fn family_invariant_violations(data: &[Datum]) -> Vec<FamilyInvariantViolation> {
    let mut violations = Vec::new();
    let mut by_id: HashMap<&PersonId, &Datum> = HashMap::with_capacity(data.len());
    for datum in data {
        if by_id.insert(&datum.id, datum).is_some() {
            violations.push(FamilyInvariantViolation::DuplicatePerson {
                person_id: datum.id.clone(),
            });
        }
    }

    for datum in data {
        if datum.rels.parents.len() > MAX_PARENTS {
            violations.push(FamilyInvariantViolation::TooManyParents {
                person_id: datum.id.clone(),
                parent_count: datum.rels.parents.len(),
            });
        }

        let edge_lists = [
            (EdgeKind::Parent, &datum.rels.parents),
            (EdgeKind::Spouse, &datum.rels.spouses),
            (EdgeKind::Child, &datum.rels.children),
        ];
        for (edge, ids) in edge_lists {
            let mut seen = HashSet::with_capacity(ids.len());
            for related_id in ids {
                if !seen.insert(related_id) {
                    violations.push(FamilyInvariantViolation::DuplicateEdge {
                        person_id: datum.id.clone(),
                        edge,
                        related_id: related_id.clone(),
                    });
                    continue;
                }
                if related_id == &datum.id {
                    violations.push(FamilyInvariantViolation::SelfReference {
                        person_id: datum.id.clone(),
                        edge,
                    });
                    continue;
                }
                let Some(related) = by_id.get(related_id) else {
                    violations.push(FamilyInvariantViolation::UnknownReference {
                        person_id: datum.id.clone(),
                        edge,
                        missing_id: related_id.clone(),
                    });
                    continue;
                };

                match edge {
                    EdgeKind::Child if !related.rels.parents.contains(&datum.id) => {
                        violations.push(FamilyInvariantViolation::AsymmetricParentChild {
                            parent_id: datum.id.clone(),
                            child_id: related_id.clone(),
                        });
                    }
                    EdgeKind::Parent if !related.rels.children.contains(&datum.id) => {
                        violations.push(FamilyInvariantViolation::AsymmetricParentChild {
                            parent_id: related_id.clone(),
                            child_id: datum.id.clone(),
                        });
                    }
                    EdgeKind::Spouse if !related.rels.spouses.contains(&datum.id) => {
                        violations.push(FamilyInvariantViolation::AsymmetricSpouse {
                            person_id: datum.id.clone(),
                            spouse_id: related_id.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
    }

    let cyclic = nodes_on_ancestry_cycles(data, &by_id);
    if !cyclic.is_empty() {
        violations.push(FamilyInvariantViolation::AncestryCycle { person_ids: cyclic });
    }

    violations
}

pub fn ensure_family_invariants(data: &[Datum]) -> Result<()> {
    let violations = family_invariant_violations(data);
    if let Some(first) = violations.first() {
        return Err(LibError::invariant_with_code(
            first.error_code(),
            first.public_message(),
            anyhow!("family invariant validation failed: {:?}", violations),
        ));
    }

    Ok(())
}

/// Kahn's algorithm over parent -> child edges; whatever never reaches
/// in-degree zero sits on or behind a cycle.
fn nodes_on_ancestry_cycles(data: &[Datum], by_id: &HashMap<&PersonId, &Datum>) -> Vec<PersonId> {
    let mut indegree: HashMap<&PersonId, usize> = HashMap::with_capacity(data.len());
    for datum in data {
        indegree.entry(&datum.id).or_insert(0);
    }
    for datum in data {
        for child_id in datum.rels.children.iter().filter(|id| by_id.contains_key(id)) {
            *indegree.entry(child_id).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&PersonId> = indegree
        .iter()
        .filter_map(|(id, degree)| if *degree == 0 { Some(*id) } else { None })
        .collect();
    let mut resolved: HashSet<&PersonId> = HashSet::with_capacity(data.len());
    while let Some(id) = queue.pop_front() {
        resolved.insert(id);
        let Some(datum) = by_id.get(id) else {
            continue;
        };
        for child_id in &datum.rels.children {
            if let Some(degree) = indegree.get_mut(child_id) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child_id);
                }
            }
        }
    }

    let mut cyclic = data
        .iter()
        .filter(|d| !resolved.contains(&d.id))
        .map(|d| d.id.clone())
        .collect::<Vec<_>>();
    cyclic.sort();
    cyclic.dedup();
    cyclic
}
