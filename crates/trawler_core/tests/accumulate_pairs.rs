use std::collections::BTreeSet;
use std::sync::Once;

use pretty_assertions::assert_eq;
use trawler_core::{
    update, CatalogItem, CatalogTag, Effect, JoinState, Msg, PairEvent, TaggedItem,
};

use CatalogTag::{Projects, Users};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(trawler_logging::initialize_for_tests);
}

fn item(tag: CatalogTag, id: &str) -> Msg {
    Msg::Item(TaggedItem::new(tag, CatalogItem::with_id(id)))
}

fn pairs_of(effects: &[Effect]) -> Vec<PairEvent> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::EmitPair(pair) => Some(pair.clone()),
            _ => None,
        })
        .collect()
}

/// Feeds the arrivals in order and returns every emitted pair.
fn feed(arrivals: &[(CatalogTag, String)]) -> (JoinState, Vec<PairEvent>) {
    let mut state = JoinState::new();
    let mut emitted = Vec::new();
    for (tag, id) in arrivals {
        let (next, effects) = update(state, item(*tag, id));
        emitted.extend(pairs_of(&effects));
        state = next;
    }
    (state, emitted)
}

fn ids(tag: CatalogTag, prefix: &str, count: usize) -> Vec<(CatalogTag, String)> {
    (1..=count).map(|n| (tag, format!("{prefix}{n}"))).collect()
}

fn cross_product(projects: usize, users: usize) -> BTreeSet<PairEvent> {
    let mut all = BTreeSet::new();
    for p in 1..=projects {
        for u in 1..=users {
            all.insert(PairEvent::new(format!("p{p}").as_str(), format!("u{u}").as_str()));
        }
    }
    all
}

/// Every merge of `a` and `b` that keeps each side's own order.
fn interleavings<T: Clone>(a: &[T], b: &[T]) -> Vec<Vec<T>> {
    if a.is_empty() {
        return vec![b.to_vec()];
    }
    if b.is_empty() {
        return vec![a.to_vec()];
    }
    let mut out = Vec::new();
    for mut rest in interleavings(&a[1..], b) {
        rest.insert(0, a[0].clone());
        out.push(rest);
    }
    for mut rest in interleavings(a, &b[1..]) {
        rest.insert(0, b[0].clone());
        out.push(rest);
    }
    out
}

/// Deterministic Fisher-Yates shuffle driven by a small LCG.
fn shuffled<T>(mut values: Vec<T>, seed: u64) -> Vec<T> {
    let mut state = seed;
    for i in (1..values.len()).rev() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        values.swap(i, j);
    }
    values
}

#[test]
fn concrete_scenario_emits_pairs_as_users_arrive() {
    init_logging();
    let state = JoinState::new();

    let (state, effects) = update(state, item(Projects, "p1"));
    assert_eq!(
        effects,
        vec![Effect::ForwardItem(TaggedItem::new(
            Projects,
            CatalogItem::with_id("p1")
        ))]
    );

    let (state, effects) = update(state, item(Users, "u1"));
    assert_eq!(pairs_of(&effects), vec![PairEvent::new("p1", "u1")]);

    let (state, effects) = update(state, item(Users, "u2"));
    assert_eq!(pairs_of(&effects), vec![PairEvent::new("p1", "u2")]);

    let summary = state.summary();
    assert_eq!(summary.projects_seen, 1);
    assert_eq!(summary.users_seen, 2);
    assert_eq!(summary.pairs_emitted, 2);
}

#[test]
fn no_pair_before_opposite_catalog_has_items() {
    init_logging();
    let (_state, emitted) = feed(&ids(Users, "u", 4));
    assert!(emitted.is_empty());
}

#[test]
fn forwarded_item_precedes_its_pairs() {
    init_logging();
    let (state, _) = update(JoinState::new(), item(Users, "u1"));
    let (_state, effects) = update(state, item(Projects, "p1"));

    assert!(matches!(effects[0], Effect::ForwardItem(ref t) if t.id().as_str() == "p1"));
    assert_eq!(effects[1], Effect::EmitPair(PairEvent::new("p1", "u1")));
    assert_eq!(effects.len(), 2);
}

#[test]
fn every_interleaving_emits_each_pair_exactly_once() {
    init_logging();
    let projects = ids(Projects, "p", 3);
    let users = ids(Users, "u", 3);
    let expected = cross_product(3, 3);

    let orders = interleavings(&projects, &users);
    assert_eq!(orders.len(), 20);
    for order in orders {
        let (_state, emitted) = feed(&order);
        assert_eq!(emitted.len(), 9, "order {order:?}");
        let unique: BTreeSet<_> = emitted.into_iter().collect();
        assert_eq!(unique, expected, "order {order:?}");
    }
}

#[test]
fn one_catalog_fully_preceding_the_other() {
    init_logging();
    let mut order = ids(Projects, "p", 4);
    order.extend(ids(Users, "u", 5));

    let (state, emitted) = feed(&order);
    assert_eq!(emitted.len(), 20);
    assert_eq!(emitted.into_iter().collect::<BTreeSet<_>>(), cross_product(4, 5));
    assert_eq!(state.summary().pairs_emitted, 20);
}

#[test]
fn duplicate_arrival_emits_nothing() {
    init_logging();
    let (state, _) = update(JoinState::new(), item(Projects, "p1"));
    let (state, effects) = update(state, item(Users, "u1"));
    assert_eq!(pairs_of(&effects), vec![PairEvent::new("p1", "u1")]);

    let (state, effects) = update(state, item(Projects, "p1"));
    assert!(effects.is_empty());
    let (state, effects) = update(state, item(Users, "u1"));
    assert!(effects.is_empty());

    let summary = state.summary();
    assert_eq!(summary.pairs_emitted, 1);
    assert_eq!(summary.duplicates_ignored, 2);
    assert_eq!(summary.projects_seen, 1);
    assert_eq!(summary.users_seen, 1);
}

#[test]
fn same_id_in_both_catalogs_is_not_a_duplicate() {
    init_logging();
    let (state, _) = update(JoinState::new(), item(Projects, "7"));
    let (state, effects) = update(state, item(Users, "7"));
    assert_eq!(pairs_of(&effects), vec![PairEvent::new("7", "7")]);
    assert_eq!(state.summary().duplicates_ignored, 0);
}

#[test]
fn pair_set_is_independent_of_arrival_order() {
    init_logging();
    let mut arrivals = ids(Projects, "p", 12);
    arrivals.extend(ids(Users, "u", 9));
    // Re-deliveries, as overlapping pages or a restarted crawl would produce.
    arrivals.extend(ids(Projects, "p", 4));
    arrivals.extend(ids(Users, "u", 3));
    let expected = cross_product(12, 9);

    for seed in [1, 7, 42, 1_000_003, 987_654_321] {
        let order = shuffled(arrivals.clone(), seed);
        let (state, emitted) = feed(&order);
        assert_eq!(emitted.len(), expected.len(), "seed {seed}");
        assert_eq!(emitted.into_iter().collect::<BTreeSet<_>>(), expected, "seed {seed}");
        assert_eq!(state.summary().duplicates_ignored, 7);
    }
}
