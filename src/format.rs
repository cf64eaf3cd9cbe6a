//! Conversion between the legacy father/mother edge shape and `Rels`.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::algorithms::find;
use crate::error::{LibError, Result};
use crate::models::{Datum, Gender, NewRelData, PersonData, PersonId, Rels};
use crate::store::push_unique;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father: Option<PersonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother: Option<PersonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<PersonId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spouses: Option<Vec<PersonId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<PersonId>>,
}

/// A person as stored by older charts, or as exported for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDatum {
    pub id: PersonId,
    #[serde(default)]
    pub data: PersonData,
    #[serde(default)]
    pub rels: LegacyRels,
    #[serde(
        rename = "_new_rel_data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub new_rel_data: Option<NewRelData>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub to_add: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unknown: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub main: bool,
}

/// Normalizes loaded people: `father` then `mother` are appended to
/// `parents`, and every edge list exists afterwards.
pub fn format_data(data: Vec<LegacyDatum>) -> Vec<Datum> {
    data.into_iter()
        .map(|legacy| {
            let LegacyRels {
                father,
                mother,
                parents,
                spouses,
                children,
            } = legacy.rels;
            let mut parents = parents.unwrap_or_default();
            for parent in father.iter().chain(mother.iter()) {
                push_unique(&mut parents, parent);
            }
            Datum {
                id: legacy.id,
                data: legacy.data,
                rels: Rels {
                    parents,
                    spouses: spouses.unwrap_or_default(),
                    children: children.unwrap_or_default(),
                },
                new_rel_data: legacy.new_rel_data,
                to_add: legacy.to_add,
                unknown: legacy.unknown,
                main: legacy.main,
            }
        })
        .collect()
}

fn non_empty(ids: &[PersonId]) -> Option<Vec<PersonId>> {
    if ids.is_empty() { None } else { Some(ids.to_vec()) }
}

/// Prepares people for export, dropping empty edge lists.
///
/// With `legacy_format`, `parents` is replaced by one `father` (first male
/// parent) and one `mother` (first female parent); further parents cannot be
/// expressed in that shape and are left out.
pub fn format_data_for_export(data: &[Datum], legacy_format: bool) -> Result<Vec<LegacyDatum>> {
    data.iter()
        .map(|datum| {
            let mut rels = LegacyRels {
                father: None,
                mother: None,
                parents: non_empty(&datum.rels.parents),
                spouses: non_empty(&datum.rels.spouses),
                children: non_empty(&datum.rels.children),
            };

            if legacy_format {
                rels.parents = None;
                for parent_id in &datum.rels.parents {
                    let parent = find(data, parent_id).ok_or_else(|| {
                        LibError::invariant(
                            "Parent not found",
                            anyhow!("parent {} of {} missing during export", parent_id, datum.id),
                        )
                    })?;
                    let slot = match parent.gender() {
                        Gender::Male => &mut rels.father,
                        Gender::Female => &mut rels.mother,
                        Gender::Other => {
                            tracing::warn!(person_id = %datum.id, parent_id = %parent_id, "parent without gender left out of legacy export");
                            continue;
                        }
                    };
                    if slot.is_some() {
                        tracing::warn!(person_id = %datum.id, parent_id = %parent_id, "extra same-gender parent left out of legacy export");
                        continue;
                    }
                    *slot = Some(parent_id.clone());
                }
            }

            Ok(LegacyDatum {
                id: datum.id.clone(),
                data: datum.data.clone(),
                rels,
                new_rel_data: datum.new_rel_data.clone(),
                to_add: datum.to_add,
                unknown: datum.unknown,
                main: datum.main,
            })
        })
        .collect()
}
