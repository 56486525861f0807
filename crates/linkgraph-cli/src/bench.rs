//! Crawler simulation benchmark.
//!
//! Workers upsert links and their outgoing edges concurrently, then scan
//! the graph in disjoint partitions and sweep stale edges, the way a crawl
//! pass uses the store.

use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;

use linkgraph_core::{drain, Edge, Graph, IdRange, Link, LinkId};

pub struct Options {
    pub links: usize,
    pub fanout: usize,
    pub workers: usize,
}

/// Latency summary of one phase.
#[derive(Debug, Serialize)]
pub struct Timing {
    pub ops: usize,
    pub total_ms: f64,
    pub ops_per_sec: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
}

impl Timing {
    fn from_latencies(mut latencies_us: Vec<f64>, total: std::time::Duration) -> Self {
        latencies_us.sort_by(f64::total_cmp);
        let secs = total.as_secs_f64();
        Self {
            ops: latencies_us.len(),
            total_ms: secs * 1_000.0,
            ops_per_sec: if secs > 0.0 {
                latencies_us.len() as f64 / secs
            } else {
                0.0
            },
            p50_us: percentile(&latencies_us, 50.0),
            p95_us: percentile(&latencies_us, 95.0),
            p99_us: percentile(&latencies_us, 99.0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub backend: &'static str,
    pub workers: usize,
    pub links: usize,
    pub fanout: usize,
    pub upsert_links: Timing,
    pub upsert_edges: Timing,
    pub scan_links: Timing,
    pub scan_edges: Timing,
    pub remove_stale_edges: Timing,
    pub links_scanned: usize,
    pub edges_scanned: usize,
    pub edges_after_sweep: usize,
}

pub fn run(graph: &dyn Graph, backend: &'static str, opts: Options) -> Result<Report> {
    let Options {
        links,
        fanout,
        workers,
    } = opts;
    anyhow::ensure!(workers > 0, "at least one worker is required");
    tracing::info!(backend, links, fanout, workers, "starting benchmark");

    // --- Upsert links ---
    let start = Instant::now();
    let shards = run_workers(workers, |w| {
        let mut ids = Vec::new();
        let mut latencies = Vec::new();
        for i in (w..links).step_by(workers) {
            let url = format!("https://site{}.example/page/{i}", i % 97);
            let mut link = Link::new(url, Utc::now());
            let t = Instant::now();
            graph.upsert_link(&mut link)?;
            latencies.push(t.elapsed().as_micros() as f64);
            ids.push((i, link.id));
        }
        Ok((ids, latencies))
    })?;
    let upsert_links_elapsed = start.elapsed();

    let mut ids = vec![LinkId::nil(); links];
    let mut latencies = Vec::with_capacity(links);
    for (shard, shard_latencies) in shards {
        for (i, id) in shard {
            ids[i] = id;
        }
        latencies.extend(shard_latencies);
    }
    let upsert_links = Timing::from_latencies(latencies, upsert_links_elapsed);

    // --- Upsert edges ---
    let start = Instant::now();
    let latencies = run_workers(workers, |w| {
        let mut latencies = Vec::new();
        for i in (w..links).step_by(workers) {
            for dst in outgoing(i, links, fanout) {
                let mut edge = Edge::new(ids[i], ids[dst]);
                let t = Instant::now();
                graph.upsert_edge(&mut edge)?;
                latencies.push(t.elapsed().as_micros() as f64);
            }
        }
        Ok(latencies)
    })?;
    let upsert_edges = Timing::from_latencies(latencies.concat(), start.elapsed());

    // --- Partitioned scans ---
    let range = IdRange::full(workers)?;
    let now = Utc::now();

    let start = Instant::now();
    let counts = run_workers(workers, |w| {
        let (from, to) = range.extent(w)?;
        let t = Instant::now();
        let mut it = graph.links(from, to, now)?;
        let seen = drain(&mut *it)?.len();
        Ok((seen, t.elapsed().as_micros() as f64))
    })?;
    let links_scanned: usize = counts.iter().map(|(seen, _)| seen).sum();
    let scan_links = Timing::from_latencies(
        counts.into_iter().map(|(_, us)| us).collect(),
        start.elapsed(),
    );

    let start = Instant::now();
    let counts = run_workers(workers, |w| {
        let (from, to) = range.extent(w)?;
        let t = Instant::now();
        let mut it = graph.edges(from, to, now)?;
        let seen = drain(&mut *it)?.len();
        Ok((seen, t.elapsed().as_micros() as f64))
    })?;
    let edges_scanned: usize = counts.iter().map(|(seen, _)| seen).sum();
    let scan_edges = Timing::from_latencies(
        counts.into_iter().map(|(_, us)| us).collect(),
        start.elapsed(),
    );

    // --- Recrawl every other link, then sweep edges not seen since ---
    let recrawl_started = Utc::now();
    for i in (0..links).step_by(2) {
        for dst in outgoing(i, links, fanout) {
            graph.upsert_edge(&mut Edge::new(ids[i], ids[dst]))?;
        }
    }

    let start = Instant::now();
    let latencies = run_workers(workers, |w| {
        let mut latencies = Vec::new();
        for i in (w..links).step_by(workers) {
            let t = Instant::now();
            graph.remove_stale_edges(ids[i], recrawl_started)?;
            latencies.push(t.elapsed().as_micros() as f64);
        }
        Ok(latencies)
    })?;
    let remove_stale_edges = Timing::from_latencies(latencies.concat(), start.elapsed());

    let mut it = graph.edges(LinkId::MIN, LinkId::MAX, Utc::now())?;
    let edges_after_sweep = drain(&mut *it)?.len();

    let report = Report {
        backend,
        workers,
        links,
        fanout,
        upsert_links,
        upsert_edges,
        scan_links,
        scan_edges,
        remove_stale_edges,
        links_scanned,
        edges_scanned,
        edges_after_sweep,
    };
    tracing::info!(
        links_scanned,
        edges_scanned,
        edges_after_sweep,
        "benchmark finished"
    );
    Ok(report)
}

/// Run `work` on `workers` scoped threads and collect results in worker order.
fn run_workers<T, F>(workers: usize, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let work = &work;
                s.spawn(move || work(w))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow!("benchmark worker panicked"))?)
            .collect()
    })
}

/// Destinations of link `i`: a deterministic spread over the other links.
fn outgoing(i: usize, links: usize, fanout: usize) -> impl Iterator<Item = usize> {
    (1..=fanout)
        .map(move |k| (i + k * 7 + 1) % links.max(1))
        .filter(move |&dst| dst != i)
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = idx.saturating_sub(1);
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkgraph_memory::InMemoryGraph;

    #[test]
    fn percentile_picks_nearest_rank() {
        let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 50.0), 50.0);
        assert_eq!(percentile(&sorted, 99.0), 99.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn outgoing_never_loops_back() {
        for i in 0..10 {
            assert!(outgoing(i, 10, 5).all(|dst| dst != i && dst < 10));
        }
    }

    #[test]
    fn run_scans_everything_it_wrote() {
        let graph = InMemoryGraph::new();
        let report = run(
            &graph,
            "memory",
            Options {
                links: 40,
                fanout: 3,
                workers: 3,
            },
        )
        .unwrap();

        assert_eq!(report.links_scanned, 40);
        assert_eq!(report.edges_scanned, 120);
        assert_eq!(report.upsert_links.ops, 40);
        assert_eq!(report.upsert_edges.ops, 120);
        assert_eq!(report.scan_links.ops, 3);
        // Only the recrawled (even) links keep their edges.
        assert_eq!(report.edges_after_sweep, 60);
        assert_eq!(graph.edge_count(), 60);
    }
}
