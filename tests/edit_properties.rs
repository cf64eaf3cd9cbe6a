use proptest::prelude::*;

use subseq_family::config::ChartConfig;
use subseq_family::invariants::family_invariant_violations;
use subseq_family::models::{CanAdd, Datum, Gender, PersonData, PersonId};
use subseq_family::operations::{FamilyOperation, FamilyOperationResult, FamilyOperations};
use subseq_family::remove_relative::{CustodyChoice, RemovalOutcome};

#[derive(Debug, Clone)]
enum Step {
    Add { person: usize, can_add: CanAdd },
    Link { placeholder: usize, option: usize },
    Commit { placeholder: usize },
    CancelAdd,
    EditGender { person: usize },
    Remove { person: usize, card: usize, keep_with_current: bool },
    CancelRemove,
    Layout,
}

fn family() -> Vec<Datum> {
    let people = [
        ("me", Gender::Male),
        ("gpa", Gender::Male),
        ("gma", Gender::Female),
        ("dad", Gender::Male),
        ("mom", Gender::Female),
        ("wife", Gender::Female),
        ("kid", Gender::Female),
        ("sis", Gender::Female),
        ("aunt", Gender::Female),
        ("stranger", Gender::Other),
    ];
    let mut data: Vec<Datum> = people
        .iter()
        .map(|(id, gender)| Datum::new(*id, *gender))
        .collect();
    let mut link = |parent: &str, child: &str| {
        for datum in data.iter_mut() {
            if datum.id.as_str() == parent {
                datum.rels.children.push(child.into());
            }
            if datum.id.as_str() == child {
                datum.rels.parents.push(parent.into());
            }
        }
    };
    link("gpa", "dad");
    link("gma", "dad");
    link("dad", "me");
    link("mom", "me");
    link("dad", "sis");
    // sis's parents never married
    link("aunt", "sis");
    link("me", "kid");
    link("wife", "kid");
    for (a, b) in [("gpa", "gma"), ("dad", "mom"), ("me", "wife")] {
        for datum in data.iter_mut() {
            if datum.id.as_str() == a {
                datum.rels.spouses.push(b.into());
            }
            if datum.id.as_str() == b {
                datum.rels.spouses.push(a.into());
            }
        }
    }
    data
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0usize..32, any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(person, parent, spouse, child)| Step::Add {
                person,
                can_add: CanAdd { parent, spouse, child },
            }
        ),
        3 => (0usize..8, 0usize..32)
            .prop_map(|(placeholder, option)| Step::Link { placeholder, option }),
        1 => (0usize..8).prop_map(|placeholder| Step::Commit { placeholder }),
        1 => Just(Step::CancelAdd),
        1 => (0usize..32).prop_map(|person| Step::EditGender { person }),
        3 => (0usize..32, 0usize..32, any::<bool>()).prop_map(
            |(person, card, keep_with_current)| Step::Remove {
                person,
                card,
                keep_with_current,
            }
        ),
        1 => Just(Step::CancelRemove),
        1 => Just(Step::Layout),
    ]
}

fn committed_ids(ops: &FamilyOperations) -> Vec<PersonId> {
    ops.store()
        .data()
        .iter()
        .filter(|d| !d.is_placeholder())
        .map(|d| d.id.clone())
        .collect()
}

fn placeholder_ids(ops: &FamilyOperations) -> Vec<PersonId> {
    ops.store()
        .data()
        .iter()
        .filter(|d| d.is_placeholder())
        .map(|d| d.id.clone())
        .collect()
}

/// Runs one step; an `Err` from the session is acceptable as long as it is
/// not an invariant failure.
fn apply(ops: &mut FamilyOperations, step: &Step) -> Result<(), String> {
    let outcome = match step {
        Step::Add { person, can_add } => {
            let ids = committed_ids(ops);
            let person_id = ids[person % ids.len()].clone();
            ops.execute(FamilyOperation::AddRelatives {
                person_id,
                can_add: *can_add,
            })
            .map(|_| ())
        }
        Step::Link { placeholder, option } => {
            let placeholders = placeholder_ids(ops);
            if placeholders.is_empty() {
                return Ok(());
            }
            let placeholder_id = placeholders[placeholder % placeholders.len()].clone();
            let options = match ops.execute(FamilyOperation::LinkOptions {
                placeholder_id: placeholder_id.clone(),
            }) {
                Ok(FamilyOperationResult::LinkOptions { options }) => options,
                Ok(other) => return Err(format!("unexpected result {other:?}")),
                Err(err) if err.is_invariant() => return Err(err.to_string()),
                Err(_) => return Ok(()),
            };
            if options.is_empty() {
                return Ok(());
            }
            let person_id = options[option % options.len()].id.clone();
            ops.execute(FamilyOperation::LinkExisting {
                placeholder_id,
                person_id,
            })
            .map(|_| ())
        }
        Step::Commit { placeholder } => {
            let placeholders = placeholder_ids(ops);
            if placeholders.is_empty() {
                return Ok(());
            }
            let placeholder_id = placeholders[placeholder % placeholders.len()].clone();
            let gender = ops
                .store()
                .get_datum(&placeholder_id)
                .map(|d| d.gender())
                .unwrap_or_default();
            ops.execute(FamilyOperation::CommitPlaceholder {
                placeholder_id,
                data: PersonData::with_gender(gender),
            })
            .map(|_| ())
        }
        Step::CancelAdd => ops.execute(FamilyOperation::CancelAddRelatives).map(|_| ()),
        Step::EditGender { person } => {
            let ids = committed_ids(ops);
            let person_id = ids[person % ids.len()].clone();
            let gender = ops
                .store()
                .get_datum(&person_id)
                .map(|d| d.gender().opposite())
                .unwrap_or_default();
            ops.execute(FamilyOperation::UpdatePersonData {
                person_id,
                data: PersonData::with_gender(gender),
            })
            .map(|_| ())
        }
        Step::Remove {
            person,
            card,
            keep_with_current,
        } => {
            let ids = committed_ids(ops);
            let person_id = ids[person % ids.len()].clone();
            ops.execute(FamilyOperation::ChangeMain {
                person_id: person_id.clone(),
            })
            .map_err(|err| err.to_string())?;
            ops.execute(FamilyOperation::ActivateRemove { person_id })
                .map_err(|err| err.to_string())?;
            let tree = match ops.execute(FamilyOperation::UpdateTree) {
                Ok(FamilyOperationResult::Tree { tree }) => tree,
                Ok(other) => return Err(format!("unexpected result {other:?}")),
                Err(err) if err.is_invariant() => return Err(err.to_string()),
                Err(_) => return Ok(()),
            };
            let tid = tree.data[card % tree.data.len()].tid.clone();
            match ops.execute(FamilyOperation::SelectRelative { tid }) {
                Ok(FamilyOperationResult::Removal {
                    outcome: RemovalOutcome::DecisionRequired { pending },
                }) => {
                    let choice = if *keep_with_current {
                        CustodyChoice::AssignToCurrent
                    } else {
                        CustodyChoice::AssignToSpouse
                    };
                    ops.execute(FamilyOperation::ResolveRemoval {
                        token: pending.token,
                        choice,
                    })
                    .map(|_| ())
                }
                other => other.map(|_| ()),
            }
        }
        Step::CancelRemove => ops.execute(FamilyOperation::CancelRemove).map(|_| ()),
        Step::Layout => ops.execute(FamilyOperation::UpdateTree).map(|_| ()),
    };
    match outcome {
        Err(err) if err.is_invariant() => Err(err.to_string()),
        _ => Ok(()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn edits_keep_the_graph_consistent(steps in prop::collection::vec(step_strategy(), 1..24)) {
        let mut ops = FamilyOperations::from_data(family(), ChartConfig::default())
            .expect("seed family should open");

        for step in &steps {
            let applied = apply(&mut ops, step);
            prop_assert!(applied.is_ok(), "step {:?} failed: {:?}", step, applied);

            let violations = family_invariant_violations(ops.store().data());
            prop_assert!(violations.is_empty(), "after {:?}: {:?}", step, violations);
            prop_assert!(ops.store().data().iter().all(|d| !d.to_add), "empty cards leaked into the store");
            if !ops.add_relative().is_active() {
                prop_assert!(placeholder_ids(&ops).is_empty(), "placeholders outlived the add session");
            }
        }
    }

    #[test]
    fn cancelling_restores_the_committed_graph(
        person in 0usize..10,
        parent in any::<bool>(),
        spouse in any::<bool>(),
        child in any::<bool>(),
    ) {
        let mut ops = FamilyOperations::from_data(family(), ChartConfig::default())
            .expect("seed family should open");
        let before = ops.store().data().to_vec();
        let person_id = before[person].id.clone();

        ops.execute(FamilyOperation::AddRelatives {
            person_id: person_id.clone(),
            can_add: CanAdd { parent, spouse, child },
        })
        .expect("placeholders should be added");
        let original = before[person].gender();
        for gender in [original.opposite(), original] {
            ops.execute(FamilyOperation::UpdatePersonData {
                person_id: person_id.clone(),
                data: PersonData::with_gender(gender),
            })
            .expect("gender edit");
        }
        ops.execute(FamilyOperation::CancelAddRelatives).expect("cancel");

        prop_assert_eq!(ops.store().data(), before.as_slice());
    }
}
