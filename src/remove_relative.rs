use std::fmt;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::layout::TreeDatum;
use crate::models::{Datum, PersonId};
use crate::store::FamilyStore;

pub type CancelCallback = Box<dyn FnMut(&Datum) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Parent,
    Spouse,
    Children,
}

/// Which former partner keeps the shared children when a union is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyChoice {
    AssignToCurrent,
    AssignToSpouse,
}

/// A spouse removal waiting for a custody decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRemoval {
    pub token: Uuid,
    pub datum_id: PersonId,
    pub spouse_id: PersonId,
    pub shared_children: Vec<PersonId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemovalOutcome {
    Removed { kind: RelationKind },
    DecisionRequired { pending: PendingRemoval },
    /// The selected card is not a direct relative of the active person.
    Ignored,
}

/// Remove-relative interaction: `activate`, then either `on_change` (and
/// `resolve` when a decision is required) or `cancel`.
#[derive(Default)]
pub struct RemoveRelative {
    datum_id: Option<PersonId>,
    pending: Option<PendingRemoval>,
    cancel_callback: Option<CancelCallback>,
}

impl fmt::Debug for RemoveRelative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveRelative")
            .field("datum_id", &self.datum_id)
            .field("pending", &self.pending)
            .field("cancel_callback", &self.cancel_callback.is_some())
            .finish()
    }
}

impl RemoveRelative {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_callback(callback: CancelCallback) -> Self {
        Self {
            cancel_callback: Some(callback),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.datum_id.is_some()
    }

    pub fn datum_id(&self) -> Option<&PersonId> {
        self.datum_id.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingRemoval> {
        self.pending.as_ref()
    }

    /// Arms removal for `datum_id` and switches the store to one-level display.
    pub fn activate(&mut self, store: &mut FamilyStore, datum_id: &PersonId) -> Result<()> {
        if !store.contains(datum_id) {
            return Err(LibError::not_found(
                "Person not found",
                anyhow!("cannot remove relatives of missing person {}", datum_id),
            ));
        }
        if self.is_active() {
            self.cancel(store);
        }
        store.state_mut().one_level_rels = true;
        self.datum_id = Some(datum_id.clone());
        tracing::debug!(person_id = %datum_id, "remove relative activated");
        Ok(())
    }

    /// Handles the card the user picked. Parent and child edges are cut at
    /// once; a spouse with shared children yields a pending decision.
    pub fn on_change(&mut self, store: &mut FamilyStore, selected: &TreeDatum) -> Result<RemovalOutcome> {
        let datum_id = self.active_datum_id()?;
        if self.pending.is_some() {
            return Err(LibError::invalid(
                "A removal decision is still pending",
                anyhow!("removal for {} awaits a custody choice", datum_id),
            ));
        }
        let datum = store.require(&datum_id, "Datum not found")?;
        let Some(kind) = find_rel_type(datum, selected) else {
            return Ok(RemovalOutcome::Ignored);
        };
        let rel_id = selected.data.id.clone();

        match kind {
            RelationKind::Parent => {
                store.require(&rel_id, "Parent not found")?;
                store.remove_parent_child(&rel_id, &datum_id);
            }
            RelationKind::Children => {
                store.require(&rel_id, "Child not found")?;
                store.remove_parent_child(&datum_id, &rel_id);
            }
            RelationKind::Spouse => {
                let shared_children = shared_children(store, &datum_id, &rel_id)?;
                if !shared_children.is_empty() {
                    let pending = PendingRemoval {
                        token: Uuid::new_v4(),
                        datum_id: datum_id.clone(),
                        spouse_id: rel_id,
                        shared_children,
                    };
                    tracing::debug!(person_id = %datum_id, token = %pending.token, "spouse removal needs a custody decision");
                    self.pending = Some(pending.clone());
                    return Ok(RemovalOutcome::DecisionRequired { pending });
                }
                remove_spouse(store, &datum_id, &rel_id, CustodyChoice::AssignToCurrent)?;
            }
        }

        tracing::debug!(person_id = %datum_id, relative_id = %selected.data.id, ?kind, "relative removed");
        self.cancel(store);
        Ok(RemovalOutcome::Removed { kind })
    }

    /// Completes a pending spouse removal.
    pub fn resolve(&mut self, store: &mut FamilyStore, token: Uuid, choice: CustodyChoice) -> Result<RelationKind> {
        let pending = match self.pending.take() {
            Some(pending) if pending.token == token => pending,
            other => {
                self.pending = other;
                return Err(LibError::invalid(
                    "Unknown removal decision",
                    anyhow!("no pending removal with token {}", token),
                ));
            }
        };
        remove_spouse(store, &pending.datum_id, &pending.spouse_id, choice)?;
        tracing::debug!(person_id = %pending.datum_id, spouse_id = %pending.spouse_id, ?choice, "spouse removed");
        self.cancel(store);
        Ok(RelationKind::Spouse)
    }

    /// Leaves remove mode; returns the person it was active for.
    pub fn cancel(&mut self, store: &mut FamilyStore) -> Option<PersonId> {
        let datum_id = self.datum_id.take()?;
        self.pending = None;
        store.state_mut().one_level_rels = false;
        if let (Some(callback), Some(datum)) = (self.cancel_callback.as_mut(), store.get_datum(&datum_id)) {
            callback(datum);
        }
        Some(datum_id)
    }

    fn active_datum_id(&self) -> Result<PersonId> {
        self.datum_id.clone().ok_or_else(|| {
            LibError::invalid(
                "Remove relative is not active",
                anyhow!("relative selected outside remove mode"),
            )
        })
    }
}

fn find_rel_type(datum: &Datum, selected: &TreeDatum) -> Option<RelationKind> {
    let rel_id = &selected.data.id;
    if selected.is_ancestry {
        datum.rels.parents.contains(rel_id).then_some(RelationKind::Parent)
    } else if selected.spouse.is_some() {
        datum.rels.spouses.contains(rel_id).then_some(RelationKind::Spouse)
    } else {
        datum.rels.children.contains(rel_id).then_some(RelationKind::Children)
    }
}

/// Children of the spouse whose parents include both partners.
fn shared_children(store: &FamilyStore, datum_id: &PersonId, spouse_id: &PersonId) -> Result<Vec<PersonId>> {
    let spouse = store.require(spouse_id, "Spouse not found")?;
    let mut shared = Vec::new();
    for child_id in &spouse.rels.children {
        let child = store.require(child_id, "Child not found")?;
        if child.rels.parents.contains(spouse_id) && child.rels.parents.contains(datum_id) {
            shared.push(child_id.clone());
        }
    }
    Ok(shared)
}

/// Cuts the union and detaches the shared children from the partner who
/// does not keep them.
fn remove_spouse(
    store: &mut FamilyStore,
    datum_id: &PersonId,
    spouse_id: &PersonId,
    choice: CustodyChoice,
) -> Result<()> {
    let shared = shared_children(store, datum_id, spouse_id)?;
    store.remove_spouses(datum_id, spouse_id);
    let other_parent = match choice {
        CustodyChoice::AssignToCurrent => spouse_id,
        CustodyChoice::AssignToSpouse => datum_id,
    };
    for child_id in &shared {
        store.remove_parent_child(other_parent, child_id);
    }
    Ok(())
}
