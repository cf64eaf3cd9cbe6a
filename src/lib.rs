pub mod add_relative;
pub mod algorithms;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod format;
pub mod invariants;
pub mod layout;
pub mod link_relative;
pub mod loader;
pub mod models;
pub mod operations;
pub mod privacy;
pub mod remove_relative;
pub mod store;

pub mod prelude {
    pub use crate::add_relative::{AddRelative, add_datum_rels_placeholders, clean_up};
    pub use crate::algorithms::{Direction, ancestry_ids, progeny_ids, tree_height};
    pub use crate::config::ChartConfig;
    #[cfg(feature = "sqlx")]
    pub use crate::db::{
        create_family_tables, find_parent_child_by_tree_id, find_persons_by_tree_id,
        find_unions_by_tree_id, load_tree_rows,
    };
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::format::{LegacyDatum, format_data, format_data_for_export};
    pub use crate::invariants::{
        FamilyInvariantViolation, ensure_family_invariants, family_invariant_violations,
    };
    pub use crate::layout::{
        CalculatedTree, LayoutHooks, LayoutOptions, TreeDatum, TreeDim, apply_transitions,
        calculate_tree, get_max_depth,
    };
    pub use crate::link_relative::{get_link_rel_options, handle_link_rel};
    pub use crate::loader::build_family_data;
    pub use crate::models::{
        AddRelLabels, CanAdd, Datum, Gender, NewRelData, PersonData, PersonId, RelType, Rels,
        TreeId, TreeRows,
    };
    pub use crate::operations::{FamilyOperation, FamilyOperationResult, FamilyOperations};
    pub use crate::privacy::{PrivacyResolver, handle_private_cards};
    pub use crate::remove_relative::{
        CustodyChoice, PendingRemoval, RelationKind, RemovalOutcome, RemoveRelative,
    };
    pub use crate::store::{FamilyStore, StoreState};
}
