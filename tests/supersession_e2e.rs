use std::sync::Arc;
use std::thread;

use credo::{
    CandidateFact, FactStore, FactType, InMemoryFactStore, InMemoryHistoryLog, MemorySpaceId,
    RevisionAction, RevisionEngine, RevisionError, RuleOracle,
};

fn space() -> MemorySpaceId {
    MemorySpaceId::new("tenant-1").unwrap()
}

fn new_engine() -> RevisionEngine {
    RevisionEngine::new(
        Arc::new(InMemoryFactStore::new()),
        Arc::new(InMemoryHistoryLog::new()),
    )
}

fn color_candidate(object: &str, confidence: u16) -> CandidateFact {
    let mut candidate = CandidateFact::builder()
        .memory_space(space())
        .fact(format!("u1 favorite color is {object}"))
        .fact_type(FactType::Preference)
        .subject("u1")
        .predicate("favorite color")
        .confidence(confidence)
        .build()
        .unwrap();
    candidate.object = Some(object.to_string());
    candidate
}

#[test]
fn manual_supersede_scenario() {
    let engine = new_engine();
    let a = engine.store(color_candidate("blue", 90)).unwrap();
    let b = engine.store(color_candidate("purple", 95)).unwrap();

    let result = engine
        .supersede(&space(), a.id, b.id, Some("changed".to_string()))
        .unwrap();
    assert!(result.superseded);

    let a_now = engine.get(&space(), a.id).unwrap().unwrap();
    let b_now = engine.get(&space(), b.id).unwrap().unwrap();
    assert!(a_now.valid_until.is_some());
    assert!(b_now.valid_until.is_none());

    let events = engine.history(a.id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, RevisionAction::Supersede);
    assert_eq!(events[0].superseded_by, Some(b.id));
    assert_eq!(events[0].reason.as_deref(), Some("changed"));
}

#[test]
fn manual_supersede_is_not_idempotent() {
    let engine = new_engine();
    let a = engine.store(color_candidate("blue", 90)).unwrap();
    let b = engine.store(color_candidate("purple", 95)).unwrap();

    engine.supersede(&space(), a.id, b.id, None).unwrap();
    let err = engine.supersede(&space(), a.id, b.id, None).unwrap_err();
    assert!(matches!(err, RevisionError::AlreadySuperseded { .. }));
}

#[test]
fn manual_supersede_error_taxonomy() {
    let engine = new_engine();
    let a = engine.store(color_candidate("blue", 90)).unwrap();

    assert!(matches!(
        engine.supersede(&space(), a.id, a.id, None),
        Err(RevisionError::SelfSupersession { .. })
    ));
    assert!(matches!(
        engine.supersede(&space(), a.id, credo::FactId::new(), None),
        Err(RevisionError::NotFound { .. })
    ));
}

#[test]
fn chain_walks_from_every_member() {
    let engine = new_engine();
    engine
        .configure_belief_revision(Arc::new(RuleOracle::new()), None)
        .unwrap();

    let first = engine.store(color_candidate("blue", 80)).unwrap();
    let second = engine
        .revise(color_candidate("purple", 85))
        .unwrap()
        .fact
        .unwrap();
    let third = engine
        .revise(color_candidate("green", 90))
        .unwrap()
        .fact
        .unwrap();

    let expected = vec![first.id, second.id, third.id];
    for member in expected.clone() {
        let chain = engine.get_supersession_chain(&space(), member).unwrap();
        let ids: Vec<_> = chain.iter().map(|f| f.id).collect();
        assert_eq!(ids, expected);
    }
}

#[test]
fn invariant_valid_until_iff_superseded_by() {
    let engine = new_engine();
    engine
        .configure_belief_revision(Arc::new(RuleOracle::new()), None)
        .unwrap();

    engine.store(color_candidate("blue", 80)).unwrap();
    engine.revise(color_candidate("purple", 85)).unwrap();
    engine.revise(color_candidate("green", 90)).unwrap();
    engine.revise(color_candidate("green", 95)).unwrap(); // duplicate -> IGNORE

    let all = engine
        .list(&space(), &credo::FactFilter::default())
        .unwrap();
    assert!(!all.is_empty());
    for fact in all {
        assert_eq!(
            fact.valid_until.is_some(),
            fact.superseded_by.is_some(),
            "fact {} breaks the live/invalidated invariant",
            fact.id
        );
    }
}

#[test]
fn chain_of_missing_fact_is_not_found() {
    let engine = new_engine();
    assert!(matches!(
        engine.get_supersession_chain(&space(), credo::FactId::new()),
        Err(RevisionError::NotFound { .. })
    ));
}

#[test]
fn concurrent_revisions_of_one_slot_leave_one_live_fact() {
    let engine = Arc::new(new_engine());
    engine
        .configure_belief_revision(Arc::new(RuleOracle::new()), None)
        .unwrap();
    engine.store(color_candidate("blue", 50)).unwrap();

    let colors = ["red", "orange", "yellow", "green", "cyan", "violet"];
    let handles: Vec<_> = colors
        .iter()
        .map(|color| {
            let engine = Arc::clone(&engine);
            let candidate = color_candidate(color, 80);
            thread::spawn(move || engine.revise(candidate).unwrap())
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // No matter how the supersessions interleaved, the slot holds exactly
    // one live fact and every dead fact is forward-linked.
    let live = engine.fact_store().find_live(&space()).unwrap();
    assert_eq!(live.len(), 1);

    let all = engine
        .list(&space(), &credo::FactFilter::default())
        .unwrap();
    for fact in all {
        assert_eq!(fact.valid_until.is_some(), fact.superseded_by.is_some());
    }
}

#[test]
fn disjoint_spaces_revise_in_parallel() {
    let engine = Arc::new(new_engine());
    engine
        .configure_belief_revision(Arc::new(RuleOracle::new()), None)
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let tenant = MemorySpaceId::new(format!("tenant-{i}")).unwrap();
                let candidate = CandidateFact::builder()
                    .memory_space(tenant.clone())
                    .fact("subject statement")
                    .subject("s")
                    .predicate("p")
                    .confidence(70)
                    .build()
                    .unwrap();
                engine.revise(candidate).unwrap();
                assert_eq!(engine.fact_store().find_live(&tenant).unwrap().len(), 1);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
