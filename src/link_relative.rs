use std::collections::HashSet;

use anyhow::anyhow;

use crate::algorithms::{ancestry_ids, progeny_ids};
use crate::error::{LibError, Result};
use crate::invariants::MAX_PARENTS;
use crate::models::{Datum, Gender, PersonId};
use crate::store::{FamilyStore, push_unique};

/// Replaces placeholder `new_rel_id` with the existing person `link_rel_id`,
/// folding the placeholder's edges into the linked person.
///
/// A placeholder that no longer exists (already linked or cleaned up) makes
/// this a no-op. A father or mother supplied by the placeholder overwrites a
/// different one already recorded on the linked person; the conflict is
/// logged and the displaced parent loses the child edge.
pub fn handle_link_rel(
    store: &mut FamilyStore,
    new_rel_id: &PersonId,
    link_rel_id: &PersonId,
) -> Result<()> {
    let Some(new_rel) = store.get_datum(new_rel_id).cloned() else {
        tracing::debug!(placeholder_id = %new_rel_id, "placeholder already linked");
        return Ok(());
    };
    if new_rel_id == link_rel_id {
        return Err(LibError::invalid(
            "A placeholder cannot be linked to itself",
            anyhow!("self link for {}", new_rel_id),
        ));
    }
    store.require(link_rel_id, "Link rel not found")?;

    rewrite_references(store, new_rel_id, link_rel_id);

    let link_rel = store.require_mut(link_rel_id, "Link rel not found")?;
    for child_id in new_rel.rels.children.iter().filter(|id| *id != link_rel_id) {
        push_unique(&mut link_rel.rels.children, child_id);
    }
    for spouse_id in new_rel.rels.spouses.iter().filter(|id| *id != link_rel_id) {
        push_unique(&mut link_rel.rels.spouses, spouse_id);
    }

    merge_parents(store, &new_rel, link_rel_id)?;

    store.remove_datum(new_rel_id);
    tracing::debug!(placeholder_id = %new_rel_id, person_id = %link_rel_id, "placeholder linked to existing person");
    Ok(())
}

fn rewrite_references(store: &mut FamilyStore, from: &PersonId, to: &PersonId) {
    for datum in store.data_mut() {
        if &datum.id == to {
            datum.rels.parents.retain(|id| id != from);
            datum.rels.spouses.retain(|id| id != from);
            datum.rels.children.retain(|id| id != from);
            continue;
        }

        if let Some(slot) = datum.rels.parents.iter().position(|id| id == from) {
            if datum.rels.parents.contains(to) {
                datum.rels.parents.remove(slot);
            } else {
                datum.rels.parents[slot] = to.clone();
            }
        }
        for list in [&mut datum.rels.spouses, &mut datum.rels.children] {
            if list.contains(from) {
                list.retain(|id| id != from);
                push_unique(list, to);
            }
        }
    }
}

fn parent_of(store: &FamilyStore, parents: &[PersonId], gender: Gender) -> Option<PersonId> {
    parents
        .iter()
        .find(|id| store.get_datum(id).is_some_and(|d| d.gender() == gender))
        .cloned()
}

fn merge_parents(store: &mut FamilyStore, new_rel: &Datum, link_rel_id: &PersonId) -> Result<()> {
    let offered: Vec<PersonId> = new_rel
        .rels
        .parents
        .iter()
        .filter(|id| *id != link_rel_id)
        .cloned()
        .collect();
    let current = store.require(link_rel_id, "Link rel not found")?.rels.parents.clone();
    let mut merged = current.clone();
    let mut displaced = Vec::new();

    if current.is_empty() {
        merged = offered.clone();
    } else {
        for (gender, slot) in [(Gender::Male, "father"), (Gender::Female, "mother")] {
            let Some(incoming) = parent_of(store, &offered, gender) else {
                continue;
            };
            match parent_of(store, &current, gender) {
                Some(existing) if existing == incoming => {}
                Some(existing) => {
                    tracing::warn!(
                        person_id = %link_rel_id,
                        slot,
                        existing = %existing,
                        incoming = %incoming,
                        "linked person already has a {slot}; overwriting"
                    );
                    if let Some(position) = merged.iter().position(|id| id == &existing) {
                        merged[position] = incoming;
                    }
                    displaced.push(existing);
                }
                None if merged.len() < MAX_PARENTS => push_unique(&mut merged, &incoming),
                None => {
                    tracing::warn!(
                        person_id = %link_rel_id,
                        slot,
                        incoming = %incoming,
                        "linked person already has two parents; dropping offered {slot}"
                    );
                }
            }
        }
        let genderless = offered
            .iter()
            .filter(|id| store.get_datum(id).is_some_and(|d| d.gender() == Gender::Other));
        for incoming in genderless {
            tracing::warn!(
                person_id = %link_rel_id,
                incoming = %incoming,
                "offered parent has no father or mother slot; dropping"
            );
        }
    }
    merged.dedup();

    let kept: HashSet<&PersonId> = merged.iter().collect();
    let detach: Vec<PersonId> = offered
        .iter()
        .chain(displaced.iter())
        .filter(|id| !kept.contains(id))
        .cloned()
        .collect();

    store.require_mut(link_rel_id, "Link rel not found")?.rels.parents = merged.clone();
    for parent_id in &detach {
        if let Some(parent) = store.get_datum_mut(parent_id) {
            parent.rels.children.retain(|id| id != link_rel_id);
        }
    }
    for parent_id in &merged {
        store.add_parent_child(parent_id, link_rel_id)?;
    }
    Ok(())
}

/// Existing people that may replace the placeholder (or person) `datum_id`
/// without creating a cycle or a repeated spouse edge.
pub fn get_link_rel_options<'a>(store: &'a FamilyStore, datum_id: &PersonId) -> Result<Vec<&'a Datum>> {
    let data = store.data();
    let datum = store.get_datum(datum_id).ok_or_else(|| {
        LibError::not_found(
            "Person not found",
            anyhow!("cannot list link options for missing person {}", datum_id),
        )
    })?;

    let rel_datum = match &datum.new_rel_data {
        Some(rel) if rel.rel_type.is_child() => {
            Some(store.require(&rel.rel_id, "Rel datum not found")?)
        }
        Some(rel) => store.get_datum(&rel.rel_id),
        None => None,
    };

    let mut excluded: HashSet<PersonId> = ancestry_ids(data, datum)?.into_iter().collect();
    excluded.extend(progeny_ids(data, datum)?);
    if let Some(rel_datum) = rel_datum.filter(|_| datum.rel_type().is_some_and(|t| t.is_child())) {
        excluded.extend(progeny_ids(data, rel_datum)?);
    }

    Ok(data
        .iter()
        .filter(|d| d.id != datum.id)
        .filter(|d| rel_datum.is_none_or(|rel| rel.id != d.id))
        .filter(|d| !d.is_placeholder() && !d.to_add && !d.unknown)
        .filter(|d| !excluded.contains(&d.id))
        .filter(|d| !d.rels.spouses.contains(&datum.id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::add_relative::add_datum_rels_placeholders;
    use crate::invariants::family_invariant_violations;
    use crate::models::{AddRelLabels, CanAdd, NewRelData, RelType};

    fn parent_child(data: &mut [Datum], parent: &str, child: &str) {
        for d in data.iter_mut() {
            if d.id.as_str() == parent {
                d.rels.children.push(child.into());
            }
            if d.id.as_str() == child {
                d.rels.parents.push(parent.into());
            }
        }
    }

    fn placeholder_of(store: &FamilyStore, rel_type: RelType) -> PersonId {
        store
            .data()
            .iter()
            .find(|d| d.rel_type() == Some(rel_type))
            .map(|d| d.id.clone())
            .expect("placeholder should exist")
    }

    #[test]
    fn linking_a_father_placeholder_reuses_existing_person() {
        let mut store = FamilyStore::new(vec![
            Datum::new("x", Gender::Male),
            Datum::new("old", Gender::Male),
        ]);
        let can_add = CanAdd {
            parent: true,
            spouse: false,
            child: false,
        };
        add_datum_rels_placeholders(&mut store, &"x".into(), &AddRelLabels::default(), can_add)
            .expect("parents should be added");
        let father = placeholder_of(&store, RelType::Father);
        let mother = placeholder_of(&store, RelType::Mother);

        handle_link_rel(&mut store, &father, &"old".into()).expect("link should succeed");

        assert!(store.get_datum(&father).is_none());
        let x = store.get_datum(&"x".into()).expect("x");
        assert_eq!(x.rels.parents, vec![PersonId::from("old"), mother.clone()]);
        let old = store.get_datum(&"old".into()).expect("old");
        assert_eq!(old.rels.children, vec![PersonId::from("x")]);
        assert_eq!(old.rels.spouses, vec![mother.clone()]);
        assert!(family_invariant_violations(store.data()).is_empty());

        handle_link_rel(&mut store, &father, &"old".into()).expect("second link is a no-op");
        let old = store.get_datum(&"old".into()).expect("old");
        assert_eq!(old.rels.children.len(), 1);
        assert_eq!(old.rels.spouses.len(), 1);
    }

    #[test]
    fn genderless_offered_parent_is_dropped_when_slots_are_taken() {
        let mut data = vec![
            Datum::new("x", Gender::Male),
            Datum::new("o", Gender::Other),
            Datum::new("y", Gender::Female),
            Datum::new("pm", Gender::Male),
            Datum::new("pf", Gender::Female),
        ];
        let mut son = Datum::new("s", Gender::Male);
        son.new_rel_data = Some(NewRelData {
            rel_type: RelType::Son,
            label: "Add son".to_string(),
            rel_id: "x".into(),
            other_parent_id: Some("o".into()),
        });
        data.push(son);
        data[0].rels.spouses = vec!["o".into()];
        data[1].rels.spouses = vec!["x".into()];
        parent_child(&mut data, "pm", "y");
        parent_child(&mut data, "pf", "y");
        parent_child(&mut data, "x", "s");
        parent_child(&mut data, "o", "s");
        let mut store = FamilyStore::new(data);

        handle_link_rel(&mut store, &"s".into(), &"y".into()).expect("link should succeed");

        let y = store.get_datum(&"y".into()).expect("y");
        assert_eq!(y.rels.parents, vec![PersonId::from("x"), PersonId::from("pf")]);
        assert!(store.get_datum(&"o".into()).expect("o").rels.children.is_empty());
        assert!(store.get_datum(&"pm".into()).expect("pm").rels.children.is_empty());
        assert!(family_invariant_violations(store.data()).is_empty());
    }

    #[test]
    fn conflicting_father_is_overwritten_and_detached() {
        let mut data = vec![
            Datum::new("x", Gender::Male),
            Datum::new("y", Gender::Male),
            Datum::new("dad", Gender::Male),
        ];
        parent_child(&mut data, "dad", "y");
        let mut store = FamilyStore::new(data);
        // y is linked as a son of x: the placeholder carries x as father.
        add_datum_rels_placeholders(&mut store, &"x".into(), &AddRelLabels::default(), CanAdd {
            parent: false,
            spouse: true,
            child: true,
        })
        .expect("placeholders should be added");
        let son = placeholder_of(&store, RelType::Son);

        handle_link_rel(&mut store, &son, &"y".into()).expect("link should succeed");

        let y = store.get_datum(&"y".into()).expect("y");
        assert_eq!(y.rels.parents[0], PersonId::from("x"));
        assert_eq!(y.rels.parents.len(), 2);
        let dad = store.get_datum(&"dad".into()).expect("dad");
        assert!(dad.rels.children.is_empty());
        assert!(family_invariant_violations(store.data()).is_empty());
    }

    #[test]
    fn link_options_exclude_relatives_and_placeholders() {
        let mut data = vec![
            Datum::new("g", Gender::Male),
            Datum::new("x", Gender::Male),
            Datum::new("c", Gender::Female),
            Datum::new("w", Gender::Female),
            Datum::new("free", Gender::Female),
        ];
        parent_child(&mut data, "g", "x");
        parent_child(&mut data, "x", "c");
        parent_child(&mut data, "w", "c");
        data[1].rels.spouses.push("w".into());
        data[3].rels.spouses.push("x".into());
        let mut store = FamilyStore::new(data);
        add_datum_rels_placeholders(&mut store, &"x".into(), &AddRelLabels::default(), CanAdd::default())
            .expect("placeholders should be added");

        let spouse_placeholder = store
            .data()
            .iter()
            .find(|d| d.rel_type() == Some(RelType::Spouse))
            .map(|d| d.id.clone())
            .expect("spouse placeholder");
        let options = get_link_rel_options(&store, &spouse_placeholder).expect("options");
        let ids: Vec<&str> = options.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["g", "c", "w", "free"]);

        let x_options = get_link_rel_options(&store, &"x".into()).expect("options");
        let ids: Vec<&str> = x_options.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["free"]);

        let son = placeholder_of(&store, RelType::Son);
        let son_options = get_link_rel_options(&store, &son).expect("options");
        let ids: Vec<&str> = son_options.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["free"]);
    }
}
