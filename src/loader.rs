use std::collections::HashMap;

use anyhow::anyhow;
use serde_json::{Map, Value};

use crate::error::{LibError, Result};
use crate::invariants::ensure_family_invariants;
use crate::models::{Datum, Gender, PersonData, PersonId, PersonRow, TreeRows};
use crate::store::push_unique;

fn person_data(row: &PersonRow) -> PersonData {
    let mut fields = Map::new();
    fields.insert("first_name".to_string(), Value::String(row.first_name.clone()));
    let optional = [
        ("last_name", row.last_name.clone()),
        ("maiden_name", row.maiden_name.clone()),
        ("date_of_birth", row.date_of_birth.map(|d| d.to_string())),
        ("date_of_death", row.date_of_death.map(|d| d.to_string())),
        ("notes", row.notes.clone()),
        ("avatar_url", row.avatar_url.clone()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            fields.insert(key.to_string(), Value::String(value));
        }
    }
    fields.insert("is_living".to_string(), Value::Bool(row.is_living));

    let gender = Gender::from_db_code(&row.gender).unwrap_or_else(|| {
        tracing::warn!(person_id = row.id, code = %row.gender, "unknown gender code");
        Gender::Other
    });
    PersonData { gender, fields }
}

fn dangling(kind: &'static str, row_id: i64, person_id: i64) -> LibError {
    LibError::invalid_with_code(
        "family_dangling_row",
        "Relationship row references a person outside the tree",
        anyhow!("{} row {} references unknown person {}", kind, row_id, person_id),
    )
}

/// Joins the three persisted row sets of one tree into the in-memory graph.
pub fn build_family_data(rows: &TreeRows) -> Result<Vec<Datum>> {
    let mut data: Vec<Datum> = Vec::with_capacity(rows.persons.len());
    let mut positions: HashMap<i64, usize> = HashMap::with_capacity(rows.persons.len());
    for row in &rows.persons {
        if positions.insert(row.id, data.len()).is_some() {
            return Err(LibError::invalid(
                "Person rows must be unique",
                anyhow!("person {} loaded twice", row.id),
            ));
        }
        let mut datum = Datum::new(PersonId::from(row.id), Gender::Other);
        datum.data = person_data(row);
        data.push(datum);
    }

    for union in &rows.unions {
        let first = *positions
            .get(&union.partner1_id)
            .ok_or_else(|| dangling("union", union.id, union.partner1_id))?;
        let Some(partner2_id) = union.partner2_id else {
            continue;
        };
        let second = *positions
            .get(&partner2_id)
            .ok_or_else(|| dangling("union", union.id, partner2_id))?;
        let (first_id, second_id) = (data[first].id.clone(), data[second].id.clone());
        push_unique(&mut data[first].rels.spouses, &second_id);
        push_unique(&mut data[second].rels.spouses, &first_id);
    }

    for link in &rows.links {
        let parent = *positions
            .get(&link.parent_id)
            .ok_or_else(|| dangling("parent_child", link.id, link.parent_id))?;
        let child = *positions
            .get(&link.child_id)
            .ok_or_else(|| dangling("parent_child", link.id, link.child_id))?;
        let (parent_id, child_id) = (data[parent].id.clone(), data[child].id.clone());
        push_unique(&mut data[parent].rels.children, &child_id);
        push_unique(&mut data[child].rels.parents, &parent_id);
    }

    ensure_family_invariants(&data)?;
    tracing::debug!(
        persons = data.len(),
        unions = rows.unions.len(),
        links = rows.links.len(),
        "family data built from rows"
    );
    Ok(data)
}
