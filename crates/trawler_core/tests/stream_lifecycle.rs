use std::sync::Once;

use pretty_assertions::assert_eq;
use trawler_core::{
    update, CatalogItem, CatalogStatus, CatalogTag, Effect, ItemId, JoinState, Msg, PairEvent,
    TaggedItem,
};

use CatalogTag::{Projects, Users};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(trawler_logging::initialize_for_tests);
}

fn item(tag: CatalogTag, id: &str) -> Msg {
    Msg::Item(TaggedItem::new(tag, CatalogItem::with_id(id)))
}

fn run(msgs: Vec<Msg>) -> (JoinState, Vec<Effect>) {
    let mut state = JoinState::new();
    let mut all = Vec::new();
    for msg in msgs {
        let (next, effects) = update(state, msg);
        all.extend(effects);
        state = next;
    }
    (state, all)
}

fn pair_count(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, Effect::EmitPair(_)))
        .count()
}

#[test]
fn closes_only_after_both_catalogs_complete() {
    init_logging();
    let (state, effects) = update(JoinState::new(), Msg::CatalogCompleted(Users));
    assert!(effects.is_empty());
    assert!(!state.is_closed());

    let (state, effects) = update(state, Msg::CatalogCompleted(Projects));
    assert_eq!(effects, vec![Effect::Close]);
    assert!(state.is_closed());
    assert!(state.summary().is_complete());
}

#[test]
fn failed_catalog_keeps_pairs_and_lets_other_side_finish() {
    init_logging();
    let mut msgs = vec![
        item(Projects, "p1"),
        item(Users, "u1"),
        item(Projects, "p2"),
        item(Projects, "p3"),
        Msg::CatalogFailed(Projects),
    ];
    for u in 2..=5 {
        msgs.push(item(Users, &format!("u{u}")));
    }
    msgs.push(Msg::CatalogCompleted(Users));

    let (state, effects) = run(msgs);
    assert_eq!(pair_count(&effects), 15);

    let failure_at = effects
        .iter()
        .position(|effect| *effect == Effect::ReportFailure(Projects))
        .expect("failure reported");
    // Users arriving after the failure still pair with the three projects.
    assert_eq!(pair_count(&effects[failure_at..]), 12);
    assert_eq!(effects.last(), Some(&Effect::Close));

    let summary = state.summary();
    assert_eq!(summary.projects, CatalogStatus::Failed);
    assert_eq!(summary.users, CatalogStatus::Completed);
    assert!(!summary.is_complete());
}

#[test]
fn items_after_catalog_end_are_ignored() {
    init_logging();
    let (state, _) = run(vec![item(Users, "u1"), Msg::CatalogCompleted(Users)]);
    let (state, effects) = update(state, item(Users, "u2"));
    assert!(effects.is_empty());
    assert_eq!(state.summary().users_seen, 1);
}

#[test]
fn repeated_terminal_message_is_a_noop() {
    init_logging();
    let (state, effects) = run(vec![Msg::CatalogFailed(Users), Msg::CatalogFailed(Users)]);
    assert_eq!(effects, vec![Effect::ReportFailure(Users)]);
    assert_eq!(state.status(Users), CatalogStatus::Failed);
    assert!(!state.is_closed());
}

#[test]
fn cancellation_closes_and_ignores_further_input() {
    init_logging();
    let (state, effects) = run(vec![item(Projects, "p1"), Msg::Cancelled]);
    assert_eq!(effects.last(), Some(&Effect::Close));
    assert!(state.is_closed());
    assert!(state.summary().cancelled);

    let (state, effects) = update(state, item(Users, "u1"));
    assert!(effects.is_empty());
    let (state, effects) = update(state, Msg::CatalogCompleted(Users));
    assert!(effects.is_empty());
    assert_eq!(state.summary().users_seen, 0);
    assert!(!state.summary().is_complete());
}

#[test]
fn observe_reports_duplicates_separately_from_lonely_items() {
    init_logging();
    let mut state = JoinState::new();
    let id: ItemId = "p1".into();
    assert_eq!(state.observe(Projects, &id), Some(Vec::new()));
    assert_eq!(state.observe(Projects, &id), None);
    assert_eq!(
        state.observe(Users, &"u1".into()),
        Some(vec![PairEvent::new("p1", "u1")])
    );
    assert!(state.contains(Projects, &id));
}
