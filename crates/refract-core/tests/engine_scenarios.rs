//! End-to-end engine behavior: peers on different schema versions
//! exchanging blocks and reading consistent documents.

mod common;

use common::{del_index, doc_of, local_change, push_all, set_at};
use refract_backend::ActorId;
use refract_core::{Engine, LensRegistration};
use refract_lenses::{LensOp, Property};
use serde_json::json;

fn rename(source: &str, destination: &str) -> LensOp {
    LensOp::Rename {
        source: source.into(),
        destination: destination.into(),
    }
}

fn project_lenses() -> Vec<LensRegistration> {
    vec![
        LensRegistration::new(
            "mu",
            "project-v1",
            vec![
                LensOp::Add(Property::string("name")),
                LensOp::Add(Property::string("summary")),
            ],
        ),
        LensRegistration::new("project-v1", "project-v2", vec![rename("name", "title")]),
    ]
}

fn chain_lenses() -> Vec<LensRegistration> {
    vec![
        LensRegistration::new(
            "mu",
            "v1",
            vec![
                LensOp::Add(Property::string("name")),
                LensOp::Add(Property::string("summary")),
            ],
        ),
        LensRegistration::new(
            "v1",
            "v2",
            vec![
                LensOp::Add(Property::string("created_at")),
                LensOp::Add(Property::object("details")),
                LensOp::In {
                    name: "details".into(),
                    lens: vec![
                        LensOp::Add(Property::string("author")),
                        LensOp::Add(Property::string("date")),
                    ],
                },
            ],
        ),
        LensRegistration::new("v2", "v3", vec![rename("name", "title")]),
        LensRegistration::new(
            "v3",
            "v4",
            vec![LensOp::Plunge {
                host: "details".into(),
                name: "created_at".into(),
            }],
        ),
        LensRegistration::new(
            "v4",
            "v5",
            vec![LensOp::In {
                name: "details".into(),
                lens: vec![rename("date", "updated_at")],
            }],
        ),
    ]
}

fn wrap_lenses() -> Vec<LensRegistration> {
    vec![
        LensRegistration::new(
            "mu",
            "scalar",
            vec![LensOp::Add(
                Property::string("assignee")
                    .nullable()
                    .with_default(json!("Bob")),
            )],
        ),
        LensRegistration::new(
            "scalar",
            "wrapped",
            vec![
                LensOp::Wrap {
                    name: "assignee".into(),
                },
                rename("assignee", "assignees"),
            ],
        ),
    ]
}

#[test]
fn fresh_engine_reads_schema_defaults() {
    let mut engine = Engine::init("project-v1", &project_lenses()).unwrap();
    assert_eq!(doc_of(&mut engine), json!({ "name": "", "summary": "" }));
}

#[test]
fn rename_lens_translates_an_incoming_write() {
    let author = ActorId::new("author");
    let mut v1 = Engine::init("project-v1", &project_lenses()).unwrap();
    v1.get_patch().unwrap();
    let change = local_change(&v1, &author, 1, vec![set_at(&v1, &[], "name", json!("hello"))]);
    let (_, block) = v1.apply_local_change(change).unwrap();

    let mut v2 = Engine::init("project-v2", &project_lenses()).unwrap();
    v2.apply_blocks(vec![block]).unwrap();
    assert_eq!(doc_of(&mut v2), json!({ "title": "hello", "summary": "" }));
}

#[test]
fn writes_travel_a_five_version_chain() {
    let author = ActorId::new("author");
    let mut v1 = Engine::init("v1", &chain_lenses()).unwrap();
    v1.get_patch().unwrap();
    let change = local_change(&v1, &author, 1, vec![set_at(&v1, &[], "name", json!("hello"))]);
    let (_, block) = v1.apply_local_change(change).unwrap();

    let mut v5 = Engine::init("v5", &chain_lenses()).unwrap();
    v5.apply_blocks(vec![block]).unwrap();
    assert_eq!(
        doc_of(&mut v5),
        json!({
            "title": "hello",
            "summary": "",
            "details": { "author": "", "created_at": "", "updated_at": "" }
        })
    );
}

#[test]
fn nested_writes_survive_plunge_and_rename_edges() {
    let author = ActorId::new("author");
    let mut v2 = Engine::init("v2", &chain_lenses()).unwrap();
    v2.get_patch().unwrap();
    let change = local_change(
        &v2,
        &author,
        1,
        vec![set_at(&v2, &["details"], "author", json!("Klaus"))],
    );
    let (_, block) = v2.apply_local_change(change).unwrap();

    let mut v5 = Engine::init("v5", &chain_lenses()).unwrap();
    v5.apply_blocks(vec![block]).unwrap();
    assert_eq!(
        doc_of(&mut v5),
        json!({
            "title": "",
            "summary": "",
            "details": { "author": "Klaus", "created_at": "", "updated_at": "" }
        })
    );
}

#[test]
fn list_pushes_convert_across_schemas() {
    let lenses = vec![
        LensRegistration::new(
            "mu",
            "v1",
            vec![
                LensOp::Add(Property::string("other")),
                LensOp::Add(Property::array_of("tags", json!({ "type": "string" }))),
            ],
        ),
        LensRegistration::new("v1", "v2", vec![]),
    ];
    let author = ActorId::new("author");
    let mut v2 = Engine::init("v2", &lenses).unwrap();
    v2.get_patch().unwrap();
    let ops = push_all(
        &v2,
        &author,
        &["tags"],
        &[json!("fun"), json!("relaxing"), json!("lovecraftian")],
    );
    let change = local_change(&v2, &author, 1, ops);
    let (_, block) = v2.apply_local_change(change).unwrap();

    let mut v1 = Engine::init("v1", &lenses).unwrap();
    v1.apply_blocks(vec![block]).unwrap();
    assert_eq!(
        doc_of(&mut v1),
        json!({ "other": "", "tags": ["fun", "relaxing", "lovecraftian"] })
    );
}

#[test]
fn wrap_and_head_keep_scalar_and_array_peers_consistent() {
    let scalar_author = ActorId::new("scalar-author");
    let wrap_author = ActorId::new("wrap-author");
    let mut scalar = Engine::init("scalar", &wrap_lenses()).unwrap();
    let mut wrapped = Engine::init("wrapped", &wrap_lenses()).unwrap();

    assert_eq!(doc_of(&mut scalar), json!({ "assignee": "Bob" }));
    assert_eq!(doc_of(&mut wrapped), json!({ "assignees": ["Bob"] }));

    // scalar peer overwrites its scalar; the wrapped peer sees the head
    let change = local_change(
        &scalar,
        &scalar_author,
        1,
        vec![set_at(&scalar, &[], "assignee", json!("Joe"))],
    );
    let (_, joe_block) = scalar.apply_local_change(change).unwrap();
    wrapped.apply_blocks(vec![joe_block]).unwrap();
    assert_eq!(doc_of(&mut wrapped), json!({ "assignees": ["Joe"] }));

    // a push past the head is invisible to the scalar peer
    let ops = push_all(&wrapped, &wrap_author, &["assignees"], &[json!("Jill")]);
    let change = local_change(&wrapped, &wrap_author, 1, ops);
    let (_, jill_block) = wrapped.apply_local_change(change).unwrap();
    assert_eq!(doc_of(&mut wrapped), json!({ "assignees": ["Joe", "Jill"] }));
    scalar.apply_blocks(vec![jill_block]).unwrap();
    assert_eq!(doc_of(&mut scalar), json!({ "assignee": "Joe" }));

    // shifting the head resets the scalar
    let shift = local_change(
        &wrapped,
        &wrap_author,
        2,
        vec![del_index(&wrapped, &["assignees"], 0)],
    );
    let (_, shift_block) = wrapped.apply_local_change(shift).unwrap();
    assert_eq!(doc_of(&mut wrapped), json!({ "assignees": ["Jill"] }));
    scalar.apply_blocks(vec![shift_block]).unwrap();
    assert_eq!(doc_of(&mut scalar), json!({ "assignee": null }));
}

#[test]
fn duplicate_blocks_are_idempotent() {
    let author = ActorId::new("author");
    let mut v1 = Engine::init("project-v1", &project_lenses()).unwrap();
    v1.get_patch().unwrap();
    let change = local_change(&v1, &author, 1, vec![set_at(&v1, &[], "name", json!("x"))]);
    let (_, block) = v1.apply_local_change(change).unwrap();

    let mut v2 = Engine::init("project-v2", &project_lenses()).unwrap();
    v2.apply_blocks(vec![block.clone()]).unwrap();
    let before = doc_of(&mut v2);
    let patch = v2.apply_blocks(vec![block]).unwrap();
    assert!(patch.diffs.is_empty());
    assert_eq!(doc_of(&mut v2), before);
}

#[test]
fn empty_apply_bootstraps_exactly_once() {
    let mut engine = Engine::init("project-v1", &project_lenses()).unwrap();
    let patch = engine.apply_blocks(Vec::new()).unwrap();
    assert!(!patch.diffs.is_empty());
    let again = engine.apply_blocks(Vec::new()).unwrap();
    assert!(again.diffs.is_empty());
}

#[test]
fn emitted_patches_never_mention_the_phantom_actor() {
    let author = ActorId::new("author");
    let phantom = ActorId::new("0000000000");
    let mut v1 = Engine::init("project-v1", &project_lenses()).unwrap();
    let patch = v1.get_patch().unwrap();
    assert_eq!(patch.clock.seq_for(&phantom), 0);
    assert_eq!(patch.deps.seq_for(&phantom), 0);

    let change = local_change(&v1, &author, 1, vec![set_at(&v1, &[], "name", json!("x"))]);
    let (patch, block) = v1.apply_local_change(change).unwrap();
    assert_eq!(patch.clock.seq_for(&phantom), 0);
    assert_eq!(patch.deps.seq_for(&phantom), 0);
    // the block itself does carry the phantom dependency
    assert_eq!(block.change.deps.seq_for(&phantom), 1);
}

#[test]
fn first_local_change_depends_on_the_defaults_change() {
    let author = ActorId::new("author");
    let phantom = ActorId::new("0000000000");
    let mut v1 = Engine::init("project-v1", &project_lenses()).unwrap();
    v1.get_patch().unwrap();
    let change = local_change(&v1, &author, 1, vec![set_at(&v1, &[], "name", json!("x"))]);
    let (_, block) = v1.apply_local_change(change).unwrap();
    assert_eq!(block.seq, 1);
    assert_eq!(block.change.deps.seq_for(&phantom), 1);
}

#[test]
fn lenses_are_published_once_per_schema() {
    let author = ActorId::new("author");
    let mut v1 = Engine::init("project-v1", &project_lenses()).unwrap();
    v1.get_patch().unwrap();
    let change = local_change(&v1, &author, 1, vec![set_at(&v1, &[], "name", json!("a"))]);
    let (_, first) = v1.apply_local_change(change).unwrap();
    assert_eq!(first.lenses.len(), 2);

    let change = local_change(&v1, &author, 2, vec![set_at(&v1, &[], "name", json!("b"))]);
    let (_, second) = v1.apply_local_change(change).unwrap();
    assert!(second.lenses.is_empty());
}

#[test]
fn embedded_lenses_teach_readers_unknown_schemas() {
    let author = ActorId::new("author");
    let mut author_lenses = project_lenses();
    author_lenses.push(LensRegistration::new(
        "project-v2",
        "project-v3",
        vec![rename("summary", "blurb")],
    ));
    let mut v3 = Engine::init("project-v3", &author_lenses).unwrap();
    v3.get_patch().unwrap();
    let change = local_change(&v3, &author, 1, vec![set_at(&v3, &[], "blurb", json!("hi"))]);
    let (_, block) = v3.apply_local_change(change).unwrap();
    assert_eq!(block.lenses.len(), 3);

    // the reader has never seen the v3 edge; the block carries it
    let mut v2 = Engine::init("project-v2", &project_lenses()).unwrap();
    v2.apply_blocks(vec![block]).unwrap();
    assert_eq!(doc_of(&mut v2), json!({ "title": "", "summary": "hi" }));
}

#[test]
fn merge_pulls_missing_history() {
    let author = ActorId::new("author");
    let mut v1 = Engine::init("project-v1", &project_lenses()).unwrap();
    v1.get_patch().unwrap();
    for (seq, word) in [(1, "one"), (2, "two")] {
        let change = local_change(&v1, &author, seq, vec![set_at(&v1, &[], "name", json!(word))]);
        v1.apply_local_change(change).unwrap();
    }

    let mut v2 = Engine::init("project-v2", &project_lenses()).unwrap();
    v2.merge(&v1).unwrap();
    assert_eq!(doc_of(&mut v2), json!({ "title": "two", "summary": "" }));
    assert!(v2.get_missing_changes(&v1.get_patch().unwrap().clock).is_empty());
    assert_eq!(v2.get_missing_deps(), refract_backend::Clock::empty());
}

#[test]
fn element_counters_never_decrease() {
    let author = ActorId::new("author");
    let lenses = vec![LensRegistration::new(
        "mu",
        "v1",
        vec![LensOp::Add(Property::array_of(
            "tags",
            json!({ "type": "string" }),
        ))],
    )];
    let mut engine = Engine::init("v1", &lenses).unwrap();
    engine.get_patch().unwrap();
    let mut last = 0;
    for seq in 1..=3 {
        let ops = push_all(&engine, &author, &["tags"], &[json!(format!("t{}", seq))]);
        let change = local_change(&engine, &author, seq, ops);
        engine.apply_local_change(change).unwrap();
        let current = engine.primary().max_elem(&author);
        assert!(current > last);
        last = current;
    }
}
