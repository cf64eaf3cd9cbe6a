use std::fmt;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::add_relative::AddRelative;
use crate::config::ChartConfig;
use crate::error::{LibError, Result};
use crate::invariants::ensure_family_invariants;
use crate::layout::{CalculatedTree, LayoutHooks, MaxDepth, get_max_depth};
use crate::link_relative::{get_link_rel_options, handle_link_rel};
use crate::loader::build_family_data;
use crate::models::{CanAdd, Datum, PersonData, PersonId, TreeRows};
use crate::remove_relative::{
    CancelCallback, CustodyChoice, RelationKind, RemovalOutcome, RemoveRelative,
};
use crate::store::FamilyStore;

/// High-level editing commands for one loaded family tree.
///
/// Mutations do not re-run the layout; issue `update_tree` once the caller
/// wants fresh positions.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum FamilyOperation {
    ChangeMain {
        person_id: PersonId,
    },
    AddRelatives {
        person_id: PersonId,
        #[serde(default)]
        can_add: CanAdd,
    },
    CancelAddRelatives,
    CommitPlaceholder {
        placeholder_id: PersonId,
        data: PersonData,
    },
    /// Edits a committed person's attributes, gender included.
    UpdatePersonData {
        person_id: PersonId,
        data: PersonData,
    },
    LinkOptions {
        placeholder_id: PersonId,
    },
    LinkExisting {
        placeholder_id: PersonId,
        person_id: PersonId,
    },
    ActivateRemove {
        person_id: PersonId,
    },
    /// Picks a card of the last laid-out tree by its tree id.
    SelectRelative {
        tid: String,
    },
    ResolveRemoval {
        token: Uuid,
        choice: CustodyChoice,
    },
    CancelRemove,
    /// Committed generations above and below a person.
    MaxDepth {
        person_id: PersonId,
    },
    UpdateTree,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FamilyOperationResult {
    MainChanged { main_id: PersonId },
    PlaceholdersAdded { placeholder_ids: Vec<PersonId> },
    Cancelled { person_id: Option<PersonId> },
    Committed { person_id: PersonId },
    LinkOptions { options: Vec<Datum> },
    Linked { person_id: PersonId },
    RemoveActivated { person_id: PersonId },
    Removal { outcome: RemovalOutcome },
    RemovalResolved { kind: RelationKind },
    Tree { tree: CalculatedTree },
    MaxDepth { depth: MaxDepth },
    Updated,
}

/// An editing session: the store plus the add and remove interactions
/// that run against it.
pub struct FamilyOperations {
    store: FamilyStore,
    config: ChartConfig,
    hooks: LayoutHooks,
    add_relative: AddRelative,
    remove_relative: RemoveRelative,
}

impl fmt::Debug for FamilyOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyOperations")
            .field("people", &self.store.len())
            .field("main_id", &self.store.main_id())
            .field("add_relative", &self.add_relative)
            .field("remove_relative", &self.remove_relative)
            .finish()
    }
}

impl FamilyOperations {
    pub fn from_data(data: Vec<Datum>, config: ChartConfig) -> Result<Self> {
        if data.is_empty() {
            return Err(LibError::invalid(
                "A family tree needs at least one person",
                anyhow!("editing session opened on empty data"),
            ));
        }
        ensure_family_invariants(&data)?;
        let config = config.normalize();
        let mut store = FamilyStore::new(data);
        if let Some(main_id) = config.main_id.as_ref() {
            store.update_main_id(main_id)?;
        }
        Ok(Self {
            store,
            add_relative: AddRelative::new(config.labels.clone()),
            remove_relative: RemoveRelative::new(),
            hooks: LayoutHooks::default(),
            config,
        })
    }

    pub fn from_rows(rows: &TreeRows, config: ChartConfig) -> Result<Self> {
        let data = build_family_data(rows)?;
        Self::from_data(data, config)
    }

    #[cfg(feature = "sqlx")]
    pub async fn load(
        pool: &sqlx::PgPool,
        tree_id: crate::models::TreeId,
        config: ChartConfig,
    ) -> Result<Self> {
        let rows = crate::db::load_tree_rows(pool, tree_id).await?;
        Self::from_rows(&rows, config)
    }

    pub fn with_hooks(mut self, hooks: LayoutHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Called with the active person whenever remove mode ends.
    pub fn with_cancel_callback(mut self, callback: CancelCallback) -> Self {
        self.remove_relative = RemoveRelative::with_cancel_callback(callback);
        self
    }

    pub fn store(&self) -> &FamilyStore {
        &self.store
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn add_relative(&self) -> &AddRelative {
        &self.add_relative
    }

    pub fn remove_relative(&self) -> &RemoveRelative {
        &self.remove_relative
    }

    pub fn into_store(self) -> FamilyStore {
        self.store
    }

    pub fn execute(&mut self, operation: FamilyOperation) -> Result<FamilyOperationResult> {
        match operation {
            FamilyOperation::ChangeMain { person_id } => {
                self.change_main(&person_id)?;
                Ok(FamilyOperationResult::MainChanged { main_id: person_id })
            }
            FamilyOperation::AddRelatives { person_id, can_add } => {
                let placeholder_ids = self.add_relatives(&person_id, can_add)?;
                Ok(FamilyOperationResult::PlaceholdersAdded { placeholder_ids })
            }
            FamilyOperation::CancelAddRelatives => {
                let person_id = self.add_relative.cancel(&mut self.store);
                Ok(FamilyOperationResult::Cancelled { person_id })
            }
            FamilyOperation::CommitPlaceholder {
                placeholder_id,
                data,
            } => {
                self.add_relative
                    .commit(&mut self.store, &placeholder_id, data)?;
                Ok(FamilyOperationResult::Committed {
                    person_id: placeholder_id,
                })
            }
            FamilyOperation::UpdatePersonData { person_id, data } => {
                self.add_relative
                    .update_person_data(&mut self.store, &person_id, data)?;
                Ok(FamilyOperationResult::Updated)
            }
            FamilyOperation::LinkOptions { placeholder_id } => {
                let options = get_link_rel_options(&self.store, &placeholder_id)?
                    .into_iter()
                    .cloned()
                    .collect();
                Ok(FamilyOperationResult::LinkOptions { options })
            }
            FamilyOperation::LinkExisting {
                placeholder_id,
                person_id,
            } => {
                self.link_existing(&placeholder_id, &person_id)?;
                Ok(FamilyOperationResult::Linked { person_id })
            }
            FamilyOperation::ActivateRemove { person_id } => {
                self.add_relative.cancel(&mut self.store);
                self.remove_relative.activate(&mut self.store, &person_id)?;
                Ok(FamilyOperationResult::RemoveActivated { person_id })
            }
            FamilyOperation::SelectRelative { tid } => {
                let outcome = self.select_relative(&tid)?;
                Ok(FamilyOperationResult::Removal { outcome })
            }
            FamilyOperation::ResolveRemoval { token, choice } => {
                let kind = self.remove_relative.resolve(&mut self.store, token, choice)?;
                Ok(FamilyOperationResult::RemovalResolved { kind })
            }
            FamilyOperation::CancelRemove => {
                let person_id = self.remove_relative.cancel(&mut self.store);
                Ok(FamilyOperationResult::Cancelled { person_id })
            }
            FamilyOperation::MaxDepth { person_id } => {
                let depth = get_max_depth(&person_id, self.store.data())?;
                Ok(FamilyOperationResult::MaxDepth { depth })
            }
            FamilyOperation::UpdateTree => {
                let tree = self.update_tree()?.clone();
                Ok(FamilyOperationResult::Tree { tree })
            }
        }
    }

    pub fn change_main(&mut self, person_id: &PersonId) -> Result<()> {
        self.add_relative.cancel(&mut self.store);
        self.remove_relative.cancel(&mut self.store);
        self.store.update_main_id(person_id)?;
        tracing::debug!(person_id = %person_id, "main person changed");
        Ok(())
    }

    pub fn add_relatives(&mut self, person_id: &PersonId, can_add: CanAdd) -> Result<Vec<PersonId>> {
        self.remove_relative.cancel(&mut self.store);
        self.add_relative.activate(&mut self.store, person_id, can_add)
    }

    /// Links a pending placeholder to an existing person and closes the
    /// add-relative interaction.
    ///
    /// Only people offered by `get_link_rel_options` are accepted. The graph
    /// is restored if the merge still breaks an invariant.
    pub fn link_existing(&mut self, placeholder_id: &PersonId, person_id: &PersonId) -> Result<()> {
        if self.store.contains(placeholder_id) {
            let eligible = get_link_rel_options(&self.store, placeholder_id)?
                .iter()
                .any(|option| &option.id == person_id);
            if !eligible {
                return Err(LibError::invalid_with_code(
                    "family_link_not_allowed",
                    "This person cannot be linked here",
                    anyhow!("{} is not a link option for {}", person_id, placeholder_id),
                ));
            }
        }

        let snapshot = self.store.data().to_vec();
        let linked = handle_link_rel(&mut self.store, placeholder_id, person_id)
            .and_then(|()| ensure_family_invariants(self.store.data()));
        if let Err(err) = linked {
            *self.store.data_mut() = snapshot;
            tracing::warn!(placeholder_id = %placeholder_id, person_id = %person_id, code = err.code, "link rolled back");
            return Err(err);
        }
        self.add_relative.cancel(&mut self.store);
        Ok(())
    }

    pub fn select_relative(&mut self, tid: &str) -> Result<RemovalOutcome> {
        let tree = self.store.state().tree.as_ref().ok_or_else(|| {
            LibError::invalid(
                "The tree has not been laid out yet",
                anyhow!("relative {} selected before update_tree", tid),
            )
        })?;
        let selected = tree.find_by_tid(tid).cloned().ok_or_else(|| {
            LibError::not_found(
                "Card not found",
                anyhow!("no card with tree id {}", tid),
            )
        })?;
        let outcome = self.remove_relative.on_change(&mut self.store, &selected)?;
        ensure_family_invariants(self.store.data())?;
        Ok(outcome)
    }

    pub fn update_tree(&mut self) -> Result<&CalculatedTree> {
        self.store.update_tree(&self.config, &self.hooks)
    }
}
