//! Tree-layout engine.
//!
//! [`calculate_tree`] turns the flat family graph into positioned
//! [`TreeDatum`]s around one focal person: ancestors above, descendants
//! below, spouses beside the person they married into and siblings of the
//! focal person on either side. Indices stored on a [`TreeDatum`] point into
//! the `data` vector of the [`CalculatedTree`] that produced it.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ChartConfig;
use crate::models::{Datum, PersonId};
use crate::privacy::PrivacyPredicate;

mod calculate;
mod handlers;
mod tidy;

pub use calculate::{calculate_tree, create_rels_to_add};
pub use handlers::{
    EXIT_OFFSET, MaxDepth, apply_transitions, calculate_enter_and_exit_positions, get_max_depth,
    setup_siblings, sort_add_new_children, sort_children_with_spouses,
};

pub type ChildComparator = dyn Fn(&Datum, &Datum) -> Ordering + Send + Sync;

/// Caller-supplied behaviour that cannot live in [`ChartConfig`].
#[derive(Clone, Default)]
pub struct LayoutHooks {
    /// Orders children and siblings before the built-in rules apply.
    pub sort_children: Option<Arc<ChildComparator>>,
    /// Marks people whose cards should render as private.
    pub private_cards: Option<Arc<PrivacyPredicate>>,
}

impl fmt::Debug for LayoutHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutHooks")
            .field("sort_children", &self.sort_children.is_some())
            .field("private_cards", &self.private_cards.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutOptions<'a> {
    pub config: &'a ChartConfig,
    pub main_id: Option<&'a PersonId>,
    pub one_level_rels: bool,
    pub hooks: &'a LayoutHooks,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeDim {
    pub width: f64,
    pub height: f64,
    pub x_off: f64,
    pub y_off: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDatum {
    pub data: Datum,
    pub x: f64,
    pub y: f64,
    pub depth: i32,
    pub tid: String,
    #[serde(default)]
    pub is_ancestry: bool,
    /// Spouse card placed next to the person it married into.
    #[serde(default)]
    pub added: bool,
    #[serde(default)]
    pub sibling: bool,
    #[serde(default)]
    pub exiting: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub all_rels_displayed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<usize>,
    /// Hierarchy parent: the child for ancestry nodes, the parent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    /// For an added spouse, the person it is drawn beside.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spouse: Option<usize>,
    #[serde(default)]
    pub parents: Vec<usize>,
    #[serde(default)]
    pub spouses: Vec<usize>,
    #[serde(default)]
    pub children: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psy: Option<f64>,
    #[serde(rename = "_x", default, skip_serializing_if = "Option::is_none")]
    pub transition_x: Option<f64>,
    #[serde(rename = "_y", default, skip_serializing_if = "Option::is_none")]
    pub transition_y: Option<f64>,
}

impl TreeDatum {
    pub(crate) fn new(data: Datum, x: f64, y: f64, depth: i32) -> Self {
        let tid = data.id.to_string();
        Self {
            data,
            x,
            y,
            depth,
            tid,
            is_ancestry: false,
            added: false,
            sibling: false,
            exiting: false,
            is_private: false,
            all_rels_displayed: false,
            duplicate: None,
            parent: None,
            spouse: None,
            parents: Vec::new(),
            spouses: Vec::new(),
            children: Vec::new(),
            sx: None,
            sy: None,
            psx: None,
            psy: None,
            transition_x: None,
            transition_y: None,
        }
    }

    pub fn id(&self) -> &PersonId {
        &self.data.id
    }

    /// Drops index links, used once the node no longer belongs to the tree
    /// those indices point into.
    pub(crate) fn detach(&mut self) {
        self.parent = None;
        self.spouse = None;
        self.parents.clear();
        self.spouses.clear();
        self.children.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedTree {
    pub data: Vec<TreeDatum>,
    /// The graph the layout worked on, including synthetic `to_add` cards.
    pub data_stash: Vec<Datum>,
    pub dim: TreeDim,
    pub main_id: PersonId,
    pub is_horizontal: bool,
}

impl CalculatedTree {
    pub fn main(&self) -> Option<&TreeDatum> {
        self.data.iter().find(|d| d.data.main && !d.added && !d.sibling)
    }

    pub fn find_by_tid(&self, tid: &str) -> Option<&TreeDatum> {
        self.data.iter().find(|d| d.tid == tid)
    }

    pub fn find_by_id(&self, id: &PersonId) -> Option<&TreeDatum> {
        self.data.iter().find(|d| &d.data.id == id)
    }
}
