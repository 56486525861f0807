//! # linkgraph-graphtest
//!
//! Behavioural checks every [`Graph`] backend must pass unmodified.
//!
//! Each check is a plain function taking a freshly constructed, empty
//! graph. [`graph_conformance_suite!`] stamps all of them out as `#[test]`
//! functions for a backend constructor:
//!
//! ```ignore
//! linkgraph_graphtest::graph_conformance_suite!(InMemoryGraph::new);
//! ```

use std::collections::HashSet;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};

use linkgraph_core::{drain, Edge, EdgeId, Graph, IdRange, Link, LinkId};

/// Expand every conformance check into a `#[test]` using `$make` to build
/// a fresh, empty graph per test.
#[macro_export]
macro_rules! graph_conformance_suite {
    (@tests $make:expr; $($name:ident),* $(,)?) => {
        $(
            #[test]
            fn $name() {
                let graph = ($make)();
                $crate::$name(&graph);
            }
        )*
    };
    ($make:expr) => {
        $crate::graph_conformance_suite!(@tests $make;
            upsert_link_assigns_id,
            upsert_link_is_idempotent_by_url,
            upsert_link_keeps_earliest_retrieved_at,
            find_link_returns_stored_link,
            find_link_unknown_id_is_not_found,
            find_link_returns_isolated_copy,
            links_range_is_half_open,
            links_filters_by_retrieved_before,
            links_membership_fixed_at_snapshot,
            links_cutoff_beyond_latest_timestamp,
            concurrent_link_iterators,
            partitioned_link_iterators,
            upsert_edge_assigns_id,
            upsert_edge_deduplicates_pair,
            upsert_edge_rejects_unknown_endpoints,
            edges_filters_by_updated_before,
            edges_membership_fixed_at_snapshot,
            edges_yield_removed_edge_from_snapshot,
            partitioned_edge_iterators,
            remove_stale_edges_keeps_fresh_edges,
            concurrent_distinct_upserts,
            iterator_close_is_idempotent,
        );
    };
}

/// Pause long enough for `Utc::now()` to move on coarse clocks.
fn tick() {
    thread::sleep(StdDuration::from_millis(5));
}

fn far_future() -> DateTime<Utc> {
    Utc::now() + Duration::days(365)
}

fn insert_link<G: Graph + ?Sized>(graph: &G, url: &str, retrieved_at: DateTime<Utc>) -> Link {
    let mut link = Link::new(url, retrieved_at);
    graph.upsert_link(&mut link).unwrap();
    link
}

fn insert_links<G: Graph + ?Sized>(graph: &G, count: usize) -> Vec<Link> {
    let retrieved_at = Utc::now() - Duration::hours(1);
    (0..count)
        .map(|i| insert_link(graph, &format!("https://example.com/{i}"), retrieved_at))
        .collect()
}

fn sorted_link_ids(mut links: Vec<Link>) -> Vec<LinkId> {
    links.sort_by_key(|l| l.id);
    links.into_iter().map(|l| l.id).collect()
}

fn scan_links<G: Graph + ?Sized>(
    graph: &G,
    from: LinkId,
    to: LinkId,
    before: DateTime<Utc>,
) -> Vec<Link> {
    let mut it = graph.links(from, to, before).unwrap();
    drain(&mut *it).unwrap()
}

fn scan_edges<G: Graph + ?Sized>(
    graph: &G,
    from: LinkId,
    to: LinkId,
    before: DateTime<Utc>,
) -> Vec<Edge> {
    let mut it = graph.edges(from, to, before).unwrap();
    drain(&mut *it).unwrap()
}

fn all_edges<G: Graph + ?Sized>(graph: &G) -> Vec<Edge> {
    scan_edges(graph, LinkId::MIN, LinkId::MAX, far_future())
}

pub fn upsert_link_assigns_id<G: Graph + ?Sized>(graph: &G) {
    let mut link = Link::new("https://example.com", Utc::now() - Duration::hours(10));
    graph.upsert_link(&mut link).unwrap();
    assert!(!link.id.is_nil(), "expected an id to be assigned to the new link");
}

pub fn upsert_link_is_idempotent_by_url<G: Graph + ?Sized>(graph: &G) {
    let t0 = Utc::now() - Duration::hours(10);
    let first = insert_link(graph, "https://example.com", t0);
    let second = insert_link(graph, "https://example.com", t0 + Duration::hours(1));

    assert_eq!(first.id, second.id, "same URL must resolve to the same link");
    assert_eq!(
        scan_links(graph, LinkId::MIN, LinkId::MAX, far_future()).len(),
        1,
        "repeated upserts must not create a second link"
    );
}

pub fn upsert_link_keeps_earliest_retrieved_at<G: Graph + ?Sized>(graph: &G) {
    let t0 = Utc::now() - Duration::hours(10);
    let t1 = t0 + Duration::hours(5);

    // Later observation first, then the earlier one.
    let later = insert_link(graph, "https://a.example", t1);
    assert_eq!(later.retrieved_at, t1);
    let earlier = insert_link(graph, "https://a.example", t0);
    assert_eq!(earlier.id, later.id);
    assert_eq!(earlier.retrieved_at, t0, "written back value must be the minimum");
    assert_eq!(graph.find_link(later.id).unwrap().retrieved_at, t0);

    // Earlier observation first, then the later one.
    let earlier = insert_link(graph, "https://b.example", t0);
    let later = insert_link(graph, "https://b.example", t1);
    assert_eq!(earlier.id, later.id);
    assert_eq!(later.retrieved_at, t0, "written back value must be the minimum");
    assert_eq!(graph.find_link(earlier.id).unwrap().retrieved_at, t0);
}

pub fn find_link_returns_stored_link<G: Graph + ?Sized>(graph: &G) {
    let link = insert_link(graph, "https://example.com", Utc::now() - Duration::hours(1));
    let found = graph.find_link(link.id).unwrap();
    assert_eq!(found, link);
}

pub fn find_link_unknown_id_is_not_found<G: Graph + ?Sized>(graph: &G) {
    insert_link(graph, "https://example.com", Utc::now());
    let err = graph.find_link(LinkId::new_random()).unwrap_err();
    assert!(err.is_not_found(), "expected NotFound, got {err:?}");
}

pub fn find_link_returns_isolated_copy<G: Graph + ?Sized>(graph: &G) {
    let mut link = insert_link(graph, "https://example.com", Utc::now() - Duration::hours(1));
    let stored = link.clone();

    // Mutating the caller's value must not reach the store.
    link.url = "https://mutated.example".to_string();
    assert_eq!(graph.find_link(stored.id).unwrap(), stored);

    let mut found = graph.find_link(stored.id).unwrap();
    found.url = "https://mutated-again.example".to_string();
    found.retrieved_at = Utc::now() - Duration::days(100);
    assert_eq!(graph.find_link(stored.id).unwrap(), stored);
}

pub fn links_range_is_half_open<G: Graph + ?Sized>(graph: &G) {
    let ids = sorted_link_ids(insert_links(graph, 6));
    let now = Utc::now();

    let (a, b) = (ids[1], ids[4]);
    let got = sorted_link_ids(scan_links(graph, a, b, now));
    assert_eq!(got, ids[1..4].to_vec(), "range must include [A, B) only");
    assert!(!got.contains(&b), "upper bound must be excluded");

    assert!(scan_links(graph, a, a, now).is_empty(), "empty range must be empty");
    assert_eq!(scan_links(graph, LinkId::MIN, LinkId::MAX, now).len(), ids.len());
}

pub fn links_filters_by_retrieved_before<G: Graph + ?Sized>(graph: &G) {
    let base = Utc::now() - Duration::hours(24);
    for i in 0..10 {
        insert_link(
            graph,
            &format!("https://example.com/{i}"),
            base + Duration::hours(i),
        );
    }

    for cutoff in [0_i64, 1, 5, 10] {
        let got = scan_links(graph, LinkId::MIN, LinkId::MAX, base + Duration::hours(cutoff));
        assert_eq!(got.len() as i64, cutoff, "cutoff {cutoff}h");
        assert!(got
            .iter()
            .all(|l| l.retrieved_at < base + Duration::hours(cutoff)));
    }
}

pub fn links_membership_fixed_at_snapshot<G: Graph + ?Sized>(graph: &G) {
    let t0 = Utc::now() - Duration::hours(2);
    let link = insert_link(graph, "https://example.com", t0);

    let mut it = graph.links(LinkId::MIN, LinkId::MAX, Utc::now()).unwrap();

    // Added after the snapshot: not included.
    insert_link(graph, "https://late.example", t0);
    // Updated after the snapshot: included with fresh content.
    insert_link(graph, "https://example.com", t0 - Duration::hours(1));

    assert!(it.advance());
    let seen = it.current().unwrap();
    assert_eq!(seen.id, link.id);
    assert_eq!(seen.retrieved_at, t0 - Duration::hours(1));
    assert!(!it.advance());
    assert!(it.error().is_none());
    it.close().unwrap();
}

pub fn links_cutoff_beyond_latest_timestamp<G: Graph + ?Sized>(graph: &G) {
    let latest = Utc.timestamp_nanos(i64::MAX);
    let link = insert_link(graph, "https://example.com", latest);

    assert_eq!(
        scan_links(graph, LinkId::MIN, LinkId::MAX, DateTime::<Utc>::MAX_UTC),
        vec![link]
    );
    assert!(scan_links(graph, LinkId::MIN, LinkId::MAX, latest).is_empty());
}

pub fn concurrent_link_iterators<G: Graph + ?Sized>(graph: &G) {
    let expected: HashSet<LinkId> = insert_links(graph, 100).into_iter().map(|l| l.id).collect();
    let now = Utc::now();

    thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    scan_links(graph, LinkId::MIN, LinkId::MAX, now)
                        .into_iter()
                        .map(|l| l.id)
                        .collect::<HashSet<_>>()
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), expected);
        }
    });
}

pub fn partitioned_link_iterators<G: Graph + ?Sized>(graph: &G) {
    let expected: HashSet<LinkId> = insert_links(graph, 100).into_iter().map(|l| l.id).collect();
    let now = Utc::now();

    for partitions in [1, 3, 8] {
        let range = IdRange::full(partitions).unwrap();
        let mut seen = HashSet::new();
        for (i, extent) in range.extents().into_iter().enumerate() {
            for link in scan_links(graph, extent.from, extent.to, now) {
                assert_eq!(range.partition_of(link.id), Some(i));
                assert!(seen.insert(link.id), "link {} seen twice", link.id);
            }
        }
        assert_eq!(seen, expected, "{partitions} partitions must cover every link");
    }
}

pub fn upsert_edge_assigns_id<G: Graph + ?Sized>(graph: &G) {
    let links = insert_links(graph, 2);
    let mut edge = Edge::new(links[0].id, links[1].id);
    let before = Utc::now();
    graph.upsert_edge(&mut edge).unwrap();

    assert!(!edge.id.is_nil(), "expected an id to be assigned to the new edge");
    assert!(edge.updated_at >= before - Duration::seconds(1));
    assert_eq!(all_edges(graph), vec![edge]);
}

pub fn upsert_edge_deduplicates_pair<G: Graph + ?Sized>(graph: &G) {
    let links = insert_links(graph, 2);
    let mut first = Edge::new(links[0].id, links[1].id);
    graph.upsert_edge(&mut first).unwrap();

    tick();
    let mut second = Edge::new(links[0].id, links[1].id);
    graph.upsert_edge(&mut second).unwrap();

    assert_eq!(first.id, second.id, "same (src, dst) must resolve to the same edge");
    assert!(second.updated_at >= first.updated_at);
    let stored = all_edges(graph);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], second);

    // The reverse direction is a different edge.
    let mut reverse = Edge::new(links[1].id, links[0].id);
    graph.upsert_edge(&mut reverse).unwrap();
    assert_ne!(reverse.id, first.id);
    assert_eq!(all_edges(graph).len(), 2);
}

pub fn upsert_edge_rejects_unknown_endpoints<G: Graph + ?Sized>(graph: &G) {
    let link = insert_link(graph, "https://example.com", Utc::now());
    let unknown = LinkId::new_random();

    for (src, dst) in [(link.id, unknown), (unknown, link.id), (unknown, unknown)] {
        let mut edge = Edge::new(src, dst);
        let err = graph.upsert_edge(&mut edge).unwrap_err();
        assert!(err.is_unknown_edge_links(), "expected UnknownEdgeLinks, got {err:?}");
        assert_eq!(edge.id, EdgeId::nil(), "failed upsert must not assign an id");
    }
    assert!(all_edges(graph).is_empty(), "no edge may be created");
}

pub fn edges_filters_by_updated_before<G: Graph + ?Sized>(graph: &G) {
    let links = insert_links(graph, 4);
    let mut early = Vec::new();
    for dst in &links[1..3] {
        let mut edge = Edge::new(links[0].id, dst.id);
        graph.upsert_edge(&mut edge).unwrap();
        early.push(edge.id);
    }

    tick();
    let cutoff = Utc::now();
    tick();

    let mut late = Edge::new(links[0].id, links[3].id);
    graph.upsert_edge(&mut late).unwrap();

    let mut got: Vec<EdgeId> = scan_edges(graph, LinkId::MIN, LinkId::MAX, cutoff)
        .into_iter()
        .map(|e| e.id)
        .collect();
    got.sort();
    early.sort();
    assert_eq!(got, early);
    assert_eq!(all_edges(graph).len(), 3);
}

pub fn edges_membership_fixed_at_snapshot<G: Graph + ?Sized>(graph: &G) {
    let links = insert_links(graph, 3);
    let mut edge = Edge::new(links[0].id, links[1].id);
    graph.upsert_edge(&mut edge).unwrap();

    let mut it = graph.edges(LinkId::MIN, LinkId::MAX, far_future()).unwrap();

    tick();
    // Added after the snapshot: not included.
    graph
        .upsert_edge(&mut Edge::new(links[0].id, links[2].id))
        .unwrap();
    // Refreshed after the snapshot: included with fresh content.
    let mut refreshed = Edge::new(links[0].id, links[1].id);
    graph.upsert_edge(&mut refreshed).unwrap();
    assert!(refreshed.updated_at > edge.updated_at);

    assert!(it.advance());
    let seen = it.current().unwrap();
    assert_eq!(seen.id, edge.id);
    assert_eq!(seen.updated_at, refreshed.updated_at);
    assert!(!it.advance());
    assert!(it.error().is_none());
    it.close().unwrap();
    assert_eq!(all_edges(graph).len(), 2);
}

pub fn edges_yield_removed_edge_from_snapshot<G: Graph + ?Sized>(graph: &G) {
    let links = insert_links(graph, 2);
    let mut edge = Edge::new(links[0].id, links[1].id);
    graph.upsert_edge(&mut edge).unwrap();

    let mut it = graph.edges(LinkId::MIN, LinkId::MAX, far_future()).unwrap();
    graph
        .remove_stale_edges(links[0].id, far_future())
        .unwrap();
    assert!(all_edges(graph).is_empty());

    assert!(it.advance(), "membership is fixed when the iterator is built");
    assert_eq!(it.current().unwrap().id, edge.id);
    assert!(!it.advance());
    it.close().unwrap();
}

pub fn partitioned_edge_iterators<G: Graph + ?Sized>(graph: &G) {
    let links = insert_links(graph, 30);
    let mut expected = HashSet::new();
    for (i, src) in links.iter().enumerate() {
        for dst in [&links[(i + 1) % links.len()], &links[(i + 7) % links.len()]] {
            let mut edge = Edge::new(src.id, dst.id);
            graph.upsert_edge(&mut edge).unwrap();
            expected.insert(edge.id);
        }
    }

    let range = IdRange::full(4).unwrap();
    let mut seen = HashSet::new();
    for (i, extent) in range.extents().into_iter().enumerate() {
        for edge in scan_edges(graph, extent.from, extent.to, far_future()) {
            assert_eq!(range.partition_of(edge.src), Some(i), "edge belongs to its source's shard");
            assert!(seen.insert(edge.id), "edge {} seen twice", edge.id);
        }
    }
    assert_eq!(seen, expected);
}

pub fn remove_stale_edges_keeps_fresh_edges<G: Graph + ?Sized>(graph: &G) {
    let links = insert_links(graph, 4);
    let src = links[0].id;

    let mut e1 = Edge::new(src, links[1].id);
    graph.upsert_edge(&mut e1).unwrap();
    tick();
    let mut e2 = Edge::new(src, links[2].id);
    graph.upsert_edge(&mut e2).unwrap();
    assert!(e1.updated_at < e2.updated_at);

    // Another source's old edge is out of scope for this sweep.
    let mut other = Edge::new(links[3].id, links[1].id);
    graph.upsert_edge(&mut other).unwrap();

    graph.remove_stale_edges(src, e2.updated_at).unwrap();
    let mut remaining: Vec<EdgeId> = all_edges(graph).into_iter().map(|e| e.id).collect();
    remaining.sort();
    let mut expected = vec![e2.id, other.id];
    expected.sort();
    assert_eq!(remaining, expected);

    graph.remove_stale_edges(src, e1.updated_at).unwrap();
    assert_eq!(all_edges(graph).len(), 2, "second sweep must delete nothing further");

    // Refreshing keeps an edge alive across a sweep.
    tick();
    let mut refreshed = Edge::new(src, links[2].id);
    graph.upsert_edge(&mut refreshed).unwrap();
    graph.remove_stale_edges(src, refreshed.updated_at).unwrap();
    assert!(all_edges(graph).iter().any(|e| e.id == e2.id));
}

pub fn concurrent_distinct_upserts<G: Graph + ?Sized>(graph: &G) {
    const WORKERS: usize = 8;
    const PER_WORKER: usize = 25;
    let retrieved_at = Utc::now() - Duration::hours(1);

    let ids: Vec<LinkId> = thread::scope(|s| {
        let workers: Vec<_> = (0..WORKERS)
            .map(|w| {
                s.spawn(move || {
                    (0..PER_WORKER)
                        .map(|i| {
                            insert_link(graph, &format!("https://w{w}.example/{i}"), retrieved_at)
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    let unique: HashSet<LinkId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), WORKERS * PER_WORKER, "ids must be distinct");
    let stored: HashSet<LinkId> = scan_links(graph, LinkId::MIN, LinkId::MAX, Utc::now())
        .into_iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(stored, unique, "no upsert may be lost");
}

pub fn iterator_close_is_idempotent<G: Graph + ?Sized>(graph: &G) {
    insert_links(graph, 2);
    let mut it = graph.links(LinkId::MIN, LinkId::MAX, Utc::now()).unwrap();
    assert!(it.current().is_none(), "no current element before advance");
    while it.advance() {
        assert!(it.current().is_some());
    }
    assert!(it.current().is_none(), "no current element after exhaustion");
    assert!(!it.advance());
    it.close().unwrap();
    it.close().unwrap();
    assert!(!it.advance(), "a closed iterator yields nothing");

    let mut it = graph.edges(LinkId::MIN, LinkId::MAX, Utc::now()).unwrap();
    it.close().unwrap();
    it.close().unwrap();
    assert!(!it.advance());
    assert!(it.error().is_none());
}
