//! End-to-end coverage: ground a small model into page files, then
//! stream, shuffle, and solve it.

use clause_grounder::{
    Argument, Constant, Formula, MemoryDatabase, Predicate, Rule, ViolationPolicy,
};
use std::path::PathBuf;
use std::sync::Arc;
use streaming_dcd::{DcdOptions, DcdSolver, StoreError, StoreOptions, StreamingTermStore};

fn implication(a: &Arc<Predicate>, b: &Arc<Predicate>, weight: f32) -> Arc<Rule> {
    let formula = Formula::implies(
        Formula::atom(a, vec![Argument::var("x")]),
        Formula::atom(b, vec![Argument::var("x")]),
    );

    Rule::new_weighted(formula, weight, false).expect("clausal")
}

fn options(dir: PathBuf, page_size: usize) -> StoreOptions {
    StoreOptions {
        page_size,
        page_dir: Some(dir),
        shuffle_pages: true,
        shuffle_terms: true,
        c: 10.0,
        batch_size: 16,
        violation_policy: ViolationPolicy::Error,
        seed: Some(0x5eed),
    }
}

fn fixed_signature(store: &mut StreamingTermStore) -> Vec<(u32, i32)> {
    let mut seen: Vec<(u32, i32)> = Vec::new();
    store
        .read_only_pass(|term, _, _| {
            seen.push((
                term.variable_indexes()[0],
                (term.constant() * 1000.0).round() as i32,
            ));
        })
        .expect("read-only pass");
    seen.sort_unstable();

    seen
}

#[test]
fn single_term_folds_observation() {
    let a = Predicate::new("ItFoldA", 1);
    let b = Predicate::new("ItFoldB", 1);
    let rule = implication(&a, &b, 2.0);

    let mut db = MemoryDatabase::new();
    db.observe(&a, vec![Constant::int(1)], 0.9);
    db.declare_target(&b, vec![Constant::int(1)], 0.2);

    let dir = tempfile::tempdir().expect("tempdir");
    let mut store =
        StreamingTermStore::new(&[rule], options(dir.path().to_path_buf(), 8)).expect("store");
    let stats = store.ground(&db).expect("grounds");

    assert_eq!(stats.ground_rules, 1);
    assert_eq!(store.term_count(), 1);
    assert_eq!(store.variables().len(), 1);
    assert_eq!(store.variables().values(), &[0.2]);

    store
        .read_only_pass(|term, weight, values| {
            assert_eq!(term.coefficients(), &[-1.0]);
            assert!((term.constant() - (-0.9)).abs() < 1e-6);
            // 2 * 10 * max(0, 0.9 - 0.2).
            assert!((term.evaluate(weight, values) - 14.0).abs() < 1e-4);
        })
        .expect("pass");
}

#[test]
fn five_terms_split_over_three_pages() {
    let a = Predicate::new("ItPageA", 1);
    let b = Predicate::new("ItPageB", 1);
    let rule = implication(&a, &b, 1.0);

    let mut db = MemoryDatabase::new();
    for i in 0..5 {
        db.observe(&a, vec![Constant::int(i)], 1.0);
        db.declare_target(&b, vec![Constant::int(i)], 0.0);
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let mut store =
        StreamingTermStore::new(&[rule], options(dir.path().to_path_buf(), 2)).expect("store");
    store.ground(&db).expect("grounds");

    assert_eq!(store.term_count(), 5);
    assert_eq!(store.page_count(), 3);

    let mut visited = 0;
    store.pass(|_, _, _| visited += 1).expect("pass");
    assert_eq!(visited, 5);
}

#[test]
fn shuffled_passes_keep_multipliers_on_their_terms() {
    let a = Predicate::new("ItShufA", 1);
    let b = Predicate::new("ItShufB", 1);
    let rule = implication(&a, &b, 1.0);

    let mut db = MemoryDatabase::new();
    for i in 0..5 {
        db.observe(&a, vec![Constant::int(i)], 1.0);
        db.declare_target(&b, vec![Constant::int(i)], 0.0);
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let mut store =
        StreamingTermStore::new(&[rule], options(dir.path().to_path_buf(), 2)).expect("store");
    store.ground(&db).expect("grounds");

    // Each term touches exactly one distinct variable; tag every
    // term's multiplier with that identity.
    store
        .pass(|term, _, _| {
            let tag = 100.0 + term.variable_indexes()[0] as f32;
            term.set_lagrange(tag);
        })
        .expect("tagging pass");

    // Both a shuffled mutating pass and a read-only pass must see
    // every multiplier still attached to its own term.
    store
        .pass(|term, _, _| {
            let tag = 100.0 + term.variable_indexes()[0] as f32;
            assert_eq!(term.lagrange(), tag);
        })
        .expect("shuffled pass");
    store
        .read_only_pass(|term, _, _| {
            let tag = 100.0 + term.variable_indexes()[0] as f32;
            assert_eq!(term.lagrange(), tag);
        })
        .expect("read-only pass");
}

#[test]
fn fixed_fields_survive_volatile_rewrites() {
    let a = Predicate::new("ItFixedA", 1);
    let b = Predicate::new("ItFixedB", 1);
    let rule = implication(&a, &b, 1.0);

    let mut db = MemoryDatabase::new();
    for i in 0..4 {
        db.observe(&a, vec![Constant::int(i)], 0.5 + 0.1 * i as f32);
        db.declare_target(&b, vec![Constant::int(i)], 0.0);
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let mut store =
        StreamingTermStore::new(&[rule], options(dir.path().to_path_buf(), 2)).expect("store");
    store.ground(&db).expect("grounds");

    let before = fixed_signature(&mut store);
    for _ in 0..3 {
        store
            .pass(|term, weight, values| term.minimize(weight, values, true))
            .expect("pass");
    }
    assert_eq!(fixed_signature(&mut store), before);
}

#[test]
fn solver_pushes_implied_target_up() {
    let a = Predicate::new("ItSolveA", 1);
    let b = Predicate::new("ItSolveB", 1);
    let rule = implication(&a, &b, 2.0);

    let mut db = MemoryDatabase::new();
    db.observe(&a, vec![Constant::int(1)], 1.0);
    db.declare_target(&b, vec![Constant::int(1)], 0.0);

    let dir = tempfile::tempdir().expect("tempdir");
    let mut store =
        StreamingTermStore::new(&[rule], options(dir.path().to_path_buf(), 8)).expect("store");
    store.ground(&db).expect("grounds");

    let report = DcdSolver::new(DcdOptions::default())
        .optimize(&mut store)
        .expect("optimizes");

    assert!(report.passes >= 1);
    assert!(report.objective < 1e-3);
    let atoms = store.sync_atoms();
    assert_eq!(atoms.len(), 1);
    assert!(atoms[0].value() > 0.99);
}

#[test]
fn constraint_only_rule_set_is_rejected() {
    let a = Predicate::new("ItRejA", 1);
    let b = Predicate::new("ItRejB", 1);
    let formula = Formula::implies(
        Formula::atom(&a, vec![Argument::var("x")]),
        Formula::atom(&b, vec![Argument::var("x")]),
    );
    let constraint = Rule::new_constraint(formula).expect("clausal");

    let dir = tempfile::tempdir().expect("tempdir");
    let err = StreamingTermStore::new(&[constraint], options(dir.path().to_path_buf(), 8))
        .expect_err("no usable rules");
    assert!(matches!(err, StoreError::NoUsableRules));
}

#[test]
fn lifecycle_errors_and_clear() {
    let a = Predicate::new("ItLifeA", 1);
    let b = Predicate::new("ItLifeB", 1);
    let rule = implication(&a, &b, 1.0);

    let mut db = MemoryDatabase::new();
    db.observe(&a, vec![Constant::int(1)], 1.0);
    db.declare_target(&b, vec![Constant::int(1)], 0.0);

    let dir = tempfile::tempdir().expect("tempdir");
    let mut store =
        StreamingTermStore::new(&[rule], options(dir.path().to_path_buf(), 8)).expect("store");

    // No pass before grounding finishes.
    assert!(matches!(
        store.pass(|_, _, _| {}),
        Err(StoreError::StillGrowing)
    ));

    store.ground(&db).expect("grounds");
    assert!(matches!(store.ground(&db), Err(StoreError::AlreadyGrounded)));
    assert_eq!(store.term_count(), 1);

    store.clear();
    assert_eq!(store.term_count(), 0);
    let stats = store.ground(&db).expect("grounds again");
    assert_eq!(stats.ground_rules, 1);
    assert_eq!(store.term_count(), 1);
}
