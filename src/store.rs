use anyhow::anyhow;

use crate::config::ChartConfig;
use crate::error::{LibError, Result};
use crate::layout::{self, CalculatedTree, LayoutHooks, LayoutOptions};
use crate::models::{Datum, PersonId};

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub main_id: Option<PersonId>,
    /// Set while remove-relative mode shows only direct relatives of the main person.
    pub one_level_rels: bool,
    pub tree: Option<CalculatedTree>,
}

/// The mutable family graph loaded for one editing session.
///
/// Lookups are linear; trees hold tens to low hundreds of people. Every edge
/// helper writes both directions so callers never have to.
#[derive(Debug, Clone, Default)]
pub struct FamilyStore {
    data: Vec<Datum>,
    state: StoreState,
}

impl FamilyStore {
    pub fn new(data: Vec<Datum>) -> Self {
        Self {
            data,
            state: StoreState::default(),
        }
    }

    pub fn data(&self) -> &[Datum] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<Datum> {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<Datum> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StoreState {
        &mut self.state
    }

    pub fn position(&self, id: &PersonId) -> Option<usize> {
        self.data.iter().position(|d| &d.id == id)
    }

    pub fn contains(&self, id: &PersonId) -> bool {
        self.position(id).is_some()
    }

    pub fn get_datum(&self, id: &PersonId) -> Option<&Datum> {
        self.data.iter().find(|d| &d.id == id)
    }

    pub fn get_datum_mut(&mut self, id: &PersonId) -> Option<&mut Datum> {
        self.data.iter_mut().find(|d| &d.id == id)
    }

    /// Lookup for ids that an edge list promised would exist.
    pub fn require(&self, id: &PersonId, public: &'static str) -> Result<&Datum> {
        self.get_datum(id)
            .ok_or_else(|| LibError::invariant(public, anyhow!("person {} missing from store", id)))
    }

    pub fn require_mut(&mut self, id: &PersonId, public: &'static str) -> Result<&mut Datum> {
        self.get_datum_mut(id)
            .ok_or_else(|| LibError::invariant(public, anyhow!("person {} missing from store", id)))
    }

    pub fn push(&mut self, datum: Datum) {
        self.data.push(datum);
    }

    pub fn remove_datum(&mut self, id: &PersonId) -> Option<Datum> {
        let index = self.position(id)?;
        Some(self.data.remove(index))
    }

    pub fn main_id(&self) -> Option<&PersonId> {
        self.state
            .main_id
            .as_ref()
            .filter(|id| self.contains(id))
            .or_else(|| self.data.first().map(|d| &d.id))
    }

    pub fn main_datum(&self) -> Option<&Datum> {
        self.main_id().and_then(|id| self.get_datum(id))
    }

    pub fn update_main_id(&mut self, id: &PersonId) -> Result<()> {
        if !self.contains(id) {
            return Err(LibError::not_found(
                "Person not found",
                anyhow!("cannot focus missing person {}", id),
            ));
        }
        self.state.main_id = Some(id.clone());
        Ok(())
    }

    pub fn add_parent_child(&mut self, parent_id: &PersonId, child_id: &PersonId) -> Result<()> {
        let parent = self.require_mut(parent_id, "Parent not found")?;
        push_unique(&mut parent.rels.children, child_id);
        let child = self.require_mut(child_id, "Child not found")?;
        push_unique(&mut child.rels.parents, parent_id);
        Ok(())
    }

    pub fn remove_parent_child(&mut self, parent_id: &PersonId, child_id: &PersonId) {
        if let Some(parent) = self.get_datum_mut(parent_id) {
            parent.rels.children.retain(|id| id != child_id);
        }
        if let Some(child) = self.get_datum_mut(child_id) {
            child.rels.parents.retain(|id| id != parent_id);
        }
    }

    pub fn add_spouses(&mut self, a: &PersonId, b: &PersonId) -> Result<()> {
        let first = self.require_mut(a, "Spouse not found")?;
        push_unique(&mut first.rels.spouses, b);
        let second = self.require_mut(b, "Spouse not found")?;
        push_unique(&mut second.rels.spouses, a);
        Ok(())
    }

    pub fn remove_spouses(&mut self, a: &PersonId, b: &PersonId) {
        if let Some(first) = self.get_datum_mut(a) {
            first.rels.spouses.retain(|id| id != b);
        }
        if let Some(second) = self.get_datum_mut(b) {
            second.rels.spouses.retain(|id| id != a);
        }
    }

    /// Recomputes the laid-out tree from the current graph and keeps it as the
    /// baseline for the next pass's enter/exit transitions.
    pub fn update_tree(&mut self, config: &ChartConfig, hooks: &LayoutHooks) -> Result<&CalculatedTree> {
        let options = LayoutOptions {
            config,
            main_id: self.main_id(),
            one_level_rels: self.state.one_level_rels,
            hooks,
        };
        let mut tree = layout::calculate_tree(&self.data, &options)?;
        let previous = self.state.tree.as_ref().map(|tree| tree.data.as_slice());
        layout::apply_transitions(previous, &mut tree.data)?;
        tracing::debug!(
            main_id = %tree.main_id,
            nodes = tree.data.len(),
            "family tree recalculated"
        );
        Ok(self.state.tree.insert(tree))
    }
}

pub(crate) fn push_unique(list: &mut Vec<PersonId>, id: &PersonId) {
    if !list.contains(id) {
        list.push(id.clone());
    }
}
