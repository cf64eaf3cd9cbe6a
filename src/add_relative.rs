use std::collections::HashSet;

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{
    AddRelLabels, CanAdd, Datum, Gender, NewRelData, PersonData, PersonId, RelType,
};
use crate::store::FamilyStore;

fn placeholder(
    gender: Gender,
    rel_type: RelType,
    labels: &AddRelLabels,
    rel_id: &PersonId,
    other_parent_id: Option<&PersonId>,
) -> Datum {
    let mut datum = Datum::new(PersonId::generate(), gender);
    datum.new_rel_data = Some(NewRelData {
        rel_type,
        label: labels.label(rel_type).to_string(),
        rel_id: rel_id.clone(),
        other_parent_id: other_parent_id.cloned(),
    });
    datum
}

/// Attaches "add relative" placeholders around `datum_id` and returns their ids
/// in creation order.
pub fn add_datum_rels_placeholders(
    store: &mut FamilyStore,
    datum_id: &PersonId,
    labels: &AddRelLabels,
    can_add: CanAdd,
) -> Result<Vec<PersonId>> {
    store.require(datum_id, "Person not found")?;

    let mut created = Vec::new();
    if can_add.parent {
        add_parents(store, datum_id, labels, &mut created)?;
    }
    if can_add.spouse {
        add_spouse_for_single_parent_children(store, datum_id, labels, &mut created)?;
        add_spouse(store, datum_id, labels, &mut created)?;
    }
    if can_add.child {
        add_children(store, datum_id, labels, &mut created)?;
    }

    tracing::debug!(person_id = %datum_id, placeholders = created.len(), "added relative placeholders");
    Ok(created)
}

fn add_parents(
    store: &mut FamilyStore,
    datum_id: &PersonId,
    labels: &AddRelLabels,
    created: &mut Vec<PersonId>,
) -> Result<()> {
    let parents = store.require(datum_id, "Person not found")?.rels.parents.clone();
    let has_parent_of = |gender: Gender| {
        parents
            .iter()
            .any(|id| store.get_datum(id).is_some_and(|p| p.gender() == gender))
    };
    let has_father = has_parent_of(Gender::Male);
    let has_mother = has_parent_of(Gender::Female);

    let mut parent_count = parents.len();
    let existing_count = parent_count;
    for (missing, gender, rel_type) in [
        (!has_father, Gender::Male, RelType::Father),
        (!has_mother, Gender::Female, RelType::Mother),
    ] {
        if parent_count >= 2 || !missing {
            continue;
        }
        let parent = placeholder(gender, rel_type, labels, datum_id, None);
        let parent_id = parent.id.clone();
        store.push(parent);
        store.add_parent_child(&parent_id, datum_id)?;
        created.push(parent_id);
        parent_count += 1;
    }

    // no placeholder parent was added, so existing parents keep their union as is
    if parent_count == existing_count {
        return Ok(());
    }
    let parents = store.require(datum_id, "Person not found")?.rels.parents.clone();
    if let [p1, p2, ..] = parents.as_slice() {
        store.add_spouses(p1, p2)?;
        store.add_parent_child(p1, datum_id)?;
        store.add_parent_child(p2, datum_id)?;
    }
    Ok(())
}

/// Gives every child that has only one recorded parent a shared placeholder
/// second parent, so only one "new spouse" slot is offered afterwards.
fn add_spouse_for_single_parent_children(
    store: &mut FamilyStore,
    datum_id: &PersonId,
    labels: &AddRelLabels,
    created: &mut Vec<PersonId>,
) -> Result<()> {
    let children = store.require(datum_id, "Person not found")?.rels.children.clone();
    let mut new_spouse_id: Option<PersonId> = None;

    for child_id in &children {
        let child = store.require(child_id, "Child not found")?;
        let [only_parent] = child.rels.parents.as_slice() else {
            continue;
        };
        let spouse_gender = store
            .require(only_parent, "Parent not found")?
            .gender()
            .opposite();

        let spouse_id = match &new_spouse_id {
            Some(id) => id.clone(),
            None => {
                let spouse = placeholder(spouse_gender, RelType::Spouse, labels, datum_id, None);
                let id = spouse.id.clone();
                store.push(spouse);
                store.add_spouses(datum_id, &id)?;
                created.push(id.clone());
                new_spouse_id = Some(id.clone());
                id
            }
        };
        store.add_parent_child(&spouse_id, child_id)?;
    }
    Ok(())
}

fn add_spouse(
    store: &mut FamilyStore,
    datum_id: &PersonId,
    labels: &AddRelLabels,
    created: &mut Vec<PersonId>,
) -> Result<()> {
    let gender = store.require(datum_id, "Person not found")?.gender().opposite();
    let spouse = placeholder(gender, RelType::Spouse, labels, datum_id, None);
    let spouse_id = spouse.id.clone();
    store.push(spouse);
    store.add_spouses(datum_id, &spouse_id)?;
    created.push(spouse_id);
    Ok(())
}

fn add_children(
    store: &mut FamilyStore,
    datum_id: &PersonId,
    labels: &AddRelLabels,
    created: &mut Vec<PersonId>,
) -> Result<()> {
    let spouses = store.require(datum_id, "Person not found")?.rels.spouses.clone();
    for spouse_id in &spouses {
        store.require(spouse_id, "Spouse not found")?;
        for (gender, rel_type) in [(Gender::Male, RelType::Son), (Gender::Female, RelType::Daughter)]
        {
            let child = placeholder(gender, rel_type, labels, datum_id, Some(spouse_id));
            let child_id = child.id.clone();
            store.push(child);
            store.add_parent_child(datum_id, &child_id)?;
            store.add_parent_child(spouse_id, &child_id)?;
            created.push(child_id);
        }
    }
    Ok(())
}

/// Flips the gender of every pending spouse placeholder; called when the
/// person they were generated for changes gender.
fn update_genders_for_new_relatives(store: &mut FamilyStore) {
    for datum in store.data_mut() {
        if datum.rel_type() == Some(RelType::Spouse) {
            datum.data.gender = datum.data.gender.opposite();
        }
    }
}

/// Removes every placeholder and every edge that points at one.
pub fn clean_up(store: &mut FamilyStore) -> usize {
    let placeholder_ids: HashSet<PersonId> = store
        .data()
        .iter()
        .filter(|d| d.is_placeholder())
        .map(|d| d.id.clone())
        .collect();
    if placeholder_ids.is_empty() {
        return 0;
    }

    let data = store.data_mut();
    data.retain(|d| !placeholder_ids.contains(&d.id));
    for datum in data.iter_mut() {
        datum.rels.parents.retain(|id| !placeholder_ids.contains(id));
        datum.rels.spouses.retain(|id| !placeholder_ids.contains(id));
        datum.rels.children.retain(|id| !placeholder_ids.contains(id));
    }
    placeholder_ids.len()
}

/// Session state for one add-relative interaction.
#[derive(Debug, Clone, Default)]
pub struct AddRelative {
    labels: AddRelLabels,
    datum_id: Option<PersonId>,
}

impl AddRelative {
    pub fn new(labels: AddRelLabels) -> Self {
        Self {
            labels,
            datum_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.datum_id.is_some()
    }

    pub fn datum_id(&self) -> Option<&PersonId> {
        self.datum_id.as_ref()
    }

    pub fn activate(
        &mut self,
        store: &mut FamilyStore,
        datum_id: &PersonId,
        can_add: CanAdd,
    ) -> Result<Vec<PersonId>> {
        if self.is_active() {
            self.cancel(store);
        }
        let created = add_datum_rels_placeholders(store, datum_id, &self.labels, can_add)?;
        self.datum_id = Some(datum_id.clone());
        Ok(created)
    }

    /// Drops every pending placeholder. Returns the person the interaction was
    /// opened for, if one was active.
    pub fn cancel(&mut self, store: &mut FamilyStore) -> Option<PersonId> {
        let datum_id = self.datum_id.take()?;
        let removed = clean_up(store);
        tracing::debug!(person_id = %datum_id, removed, "add relative cancelled");
        Some(datum_id)
    }

    /// Applies edited attributes to a committed person. Pending spouse
    /// placeholders swap gender when the person this session is open for
    /// changes theirs.
    pub fn update_person_data(
        &self,
        store: &mut FamilyStore,
        person_id: &PersonId,
        data: PersonData,
    ) -> Result<()> {
        let datum = store.get_datum_mut(person_id).ok_or_else(|| {
            LibError::not_found(
                "Person not found",
                anyhow!("cannot edit missing person {}", person_id),
            )
        })?;
        if datum.is_placeholder() {
            return Err(LibError::invalid(
                "Placeholder relatives are edited by committing them",
                anyhow!("person {} is a placeholder", person_id),
            ));
        }
        let gender_changed = datum.data.gender != data.gender;
        datum.data = data;
        if gender_changed && self.datum_id.as_ref() == Some(person_id) {
            update_genders_for_new_relatives(store);
        }
        tracing::debug!(person_id = %person_id, gender_changed, "person data updated");
        Ok(())
    }

    /// Turns a placeholder into a real person, then discards the others.
    pub fn commit(
        &mut self,
        store: &mut FamilyStore,
        placeholder_id: &PersonId,
        data: PersonData,
    ) -> Result<()> {
        let datum = store.get_datum_mut(placeholder_id).ok_or_else(|| {
            LibError::not_found(
                "Placeholder not found",
                anyhow!("placeholder {} missing from store", placeholder_id),
            )
        })?;
        if !datum.is_placeholder() {
            return Err(LibError::invalid(
                "Only placeholder relatives can be committed",
                anyhow!("person {} is not a placeholder", placeholder_id),
            ));
        }
        datum.new_rel_data = None;
        datum.data = data;
        tracing::debug!(person_id = %placeholder_id, "placeholder committed");
        self.cancel(store);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invariants::family_invariant_violations;

    fn store_with(data: Vec<Datum>) -> FamilyStore {
        FamilyStore::new(data)
    }

    fn rel_types(store: &FamilyStore) -> Vec<RelType> {
        store.data().iter().filter_map(|d| d.rel_type()).collect()
    }

    #[test]
    fn lone_person_gets_parents_spouse_and_children() {
        let mut store = store_with(vec![Datum::new("x", Gender::Male)]);
        let x = PersonId::from("x");
        let created = add_datum_rels_placeholders(&mut store, &x, &AddRelLabels::default(), CanAdd::default())
            .expect("placeholders should be added");

        assert_eq!(created.len(), 5);
        assert_eq!(
            rel_types(&store),
            vec![RelType::Father, RelType::Mother, RelType::Spouse, RelType::Son, RelType::Daughter]
        );
        let datum = store.get_datum(&x).expect("x");
        assert_eq!(datum.rels.parents.len(), 2);
        assert_eq!(datum.rels.spouses.len(), 1);
        assert_eq!(datum.rels.children.len(), 2);

        let spouse = store.get_datum(&datum.rels.spouses[0]).expect("spouse");
        assert_eq!(spouse.gender(), Gender::Female);
        assert!(family_invariant_violations(store.data()).is_empty());
    }

    #[test]
    fn placeholder_parents_are_mutual_spouses() {
        let mut store = store_with(vec![Datum::new("x", Gender::Female)]);
        let x = PersonId::from("x");
        let can_add = CanAdd {
            parent: true,
            spouse: false,
            child: false,
        };
        add_datum_rels_placeholders(&mut store, &x, &AddRelLabels::default(), can_add)
            .expect("parents should be added");

        let parents = store.get_datum(&x).expect("x").rels.parents.clone();
        assert_eq!(parents.len(), 2);
        let father = store.get_datum(&parents[0]).expect("father");
        let mother = store.get_datum(&parents[1]).expect("mother");
        assert_eq!(father.rels.children, vec![x.clone()]);
        assert_eq!(mother.rels.children, vec![x.clone()]);
        assert_eq!(father.rels.spouses, vec![mother.id.clone()]);
        assert_eq!(mother.rels.spouses, vec![father.id.clone()]);
        assert_eq!(father.new_rel_data.as_ref().map(|r| r.label.as_str()), Some("Add father"));
    }

    #[test]
    fn existing_father_only_adds_mother() {
        let mut dad = Datum::new("dad", Gender::Male);
        let mut x = Datum::new("x", Gender::Male);
        dad.rels.children = vec!["x".into()];
        x.rels.parents = vec!["dad".into()];
        let mut store = store_with(vec![dad, x]);
        let can_add = CanAdd {
            parent: true,
            spouse: false,
            child: false,
        };
        add_datum_rels_placeholders(&mut store, &"x".into(), &AddRelLabels::default(), can_add)
            .expect("mother should be added");

        assert_eq!(rel_types(&store), vec![RelType::Mother]);
        let dad = store.get_datum(&"dad".into()).expect("dad");
        assert_eq!(dad.rels.spouses.len(), 1);
    }

    #[test]
    fn single_parent_children_share_one_placeholder_parent() {
        let mut x = Datum::new("x", Gender::Female);
        let mut c1 = Datum::new("c1", Gender::Male);
        let mut c2 = Datum::new("c2", Gender::Female);
        x.rels.children = vec!["c1".into(), "c2".into()];
        c1.rels.parents = vec!["x".into()];
        c2.rels.parents = vec!["x".into()];
        let mut store = store_with(vec![x, c1, c2]);
        let can_add = CanAdd {
            parent: false,
            spouse: true,
            child: false,
        };
        add_datum_rels_placeholders(&mut store, &"x".into(), &AddRelLabels::default(), can_add)
            .expect("spouses should be added");

        let x = store.get_datum(&"x".into()).expect("x");
        assert_eq!(x.rels.spouses.len(), 2, "repair spouse plus one new spouse");
        let repair = store.get_datum(&x.rels.spouses[0]).expect("repair spouse");
        assert_eq!(repair.gender(), Gender::Male);
        assert_eq!(repair.rels.children, vec![PersonId::from("c1"), PersonId::from("c2")]);
        for child in ["c1", "c2"] {
            let child = store.get_datum(&child.into()).expect("child");
            assert_eq!(child.rels.parents, vec![PersonId::from("x"), repair.id.clone()]);
        }
        assert!(family_invariant_violations(store.data()).is_empty());
    }

    #[test]
    fn clean_up_removes_placeholders_and_their_edges() {
        let mut store = store_with(vec![Datum::new("x", Gender::Male)]);
        let x = PersonId::from("x");
        let mut session = AddRelative::new(AddRelLabels::default());
        session
            .activate(&mut store, &x, CanAdd::default())
            .expect("activation should succeed");
        assert!(session.is_active());

        assert_eq!(session.cancel(&mut store), Some(x.clone()));
        assert_eq!(store.len(), 1);
        let datum = store.get_datum(&x).expect("x");
        assert!(datum.relative_ids().next().is_none());
        assert_eq!(session.cancel(&mut store), None);
    }

    #[test]
    fn cancel_leaves_unmarried_parents_unmarried() {
        let mut dad = Datum::new("dad", Gender::Male);
        let mut mom = Datum::new("mom", Gender::Female);
        let mut x = Datum::new("x", Gender::Male);
        dad.rels.children = vec!["x".into()];
        mom.rels.children = vec!["x".into()];
        x.rels.parents = vec!["dad".into(), "mom".into()];
        let mut store = store_with(vec![x, dad, mom]);
        let before = store.data().to_vec();

        let mut session = AddRelative::new(AddRelLabels::default());
        session
            .activate(&mut store, &"x".into(), CanAdd::default())
            .expect("activation should succeed");
        assert!(store.get_datum(&"dad".into()).expect("dad").rels.spouses.is_empty());

        session.cancel(&mut store);
        assert_eq!(store.data(), before.as_slice());
    }

    #[test]
    fn gender_edit_only_flips_spouse_placeholders() {
        let mut store = store_with(vec![Datum::new("x", Gender::Male)]);
        let mut session = AddRelative::new(AddRelLabels::default());
        session
            .activate(&mut store, &"x".into(), CanAdd::default())
            .expect("activation should succeed");

        session
            .update_person_data(&mut store, &"x".into(), PersonData::with_gender(Gender::Female))
            .expect("x should be editable");

        for datum in store.data() {
            match datum.rel_type() {
                Some(RelType::Spouse) | Some(RelType::Father) | Some(RelType::Son) => {
                    assert_eq!(datum.gender(), Gender::Male)
                }
                Some(RelType::Mother) | Some(RelType::Daughter) => {
                    assert_eq!(datum.gender(), Gender::Female)
                }
                None => {}
            }
        }
    }

    #[test]
    fn unchanged_gender_or_other_person_leaves_placeholders_alone() {
        let mut y = Datum::new("y", Gender::Female);
        let mut x = Datum::new("x", Gender::Male);
        x.rels.spouses = vec!["y".into()];
        y.rels.spouses = vec!["x".into()];
        let mut store = store_with(vec![x, y]);
        let mut session = AddRelative::new(AddRelLabels::default());
        let can_add = CanAdd {
            parent: false,
            spouse: true,
            child: false,
        };
        session
            .activate(&mut store, &"x".into(), can_add)
            .expect("activation should succeed");
        let spouse_gender = |store: &FamilyStore| {
            store
                .data()
                .iter()
                .find(|d| d.rel_type() == Some(RelType::Spouse))
                .map(|d| d.gender())
                .expect("spouse placeholder")
        };

        let mut renamed = PersonData::with_gender(Gender::Male);
        renamed.fields.insert("first_name".to_string(), serde_json::json!("Ned"));
        session
            .update_person_data(&mut store, &"x".into(), renamed)
            .expect("rename");
        assert_eq!(spouse_gender(&store), Gender::Female);

        session
            .update_person_data(&mut store, &"y".into(), PersonData::with_gender(Gender::Male))
            .expect("edit spouse");
        assert_eq!(spouse_gender(&store), Gender::Female);

        let placeholder = store
            .data()
            .iter()
            .find(|d| d.is_placeholder())
            .map(|d| d.id.clone())
            .expect("placeholder");
        let err = session
            .update_person_data(&mut store, &placeholder, PersonData::default())
            .expect_err("placeholders are committed, not edited");
        assert_eq!(err.code, "invalid_input");
    }

    #[test]
    fn committed_placeholder_survives_clean_up() {
        let mut store = store_with(vec![Datum::new("x", Gender::Male)]);
        let x = PersonId::from("x");
        let mut session = AddRelative::new(AddRelLabels::default());
        let created = session
            .activate(&mut store, &x, CanAdd::default())
            .expect("activation should succeed");
        let father_id = created[0].clone();

        session
            .commit(&mut store, &father_id, PersonData::with_gender(Gender::Male))
            .expect("father should commit");

        assert!(!session.is_active());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_datum(&x).expect("x").rels.parents, vec![father_id.clone()]);
        let father = store.get_datum(&father_id).expect("father");
        assert!(!father.is_placeholder());
        assert!(father.rels.spouses.is_empty());
        assert!(family_invariant_violations(store.data()).is_empty());
    }

    #[test]
    fn committing_a_real_person_is_rejected() {
        let mut store = store_with(vec![Datum::new("x", Gender::Male)]);
        let mut session = AddRelative::new(AddRelLabels::default());
        let err = session
            .commit(&mut store, &"x".into(), PersonData::default())
            .expect_err("real people are not placeholders");
        assert_eq!(err.code, "invalid_input");
    }
}
