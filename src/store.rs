use std::path::Path;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use hashbrown::{HashMap, HashSet};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::common::read_js_path;
use crate::error::StoreError;
use crate::graph::{Graph, Term, Triple, RDF_TYPE, USES_SCHEME, WITH_ROLE};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_DEPTH: usize = 10;
pub const RETRY_ATTEMPTS: u32 = 5;
pub const RETRY_BASE_SECS: u64 = 5;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProvSnapshot {
    #[serde(default)]
    pub derived_from: Vec<String>,
}

/// On-disk shape of the persistent store: a triple list plus, per
/// entity, its ordered provenance snapshots.
#[derive(Default, Serialize, Deserialize)]
pub struct StoreDump {
    pub triples: Vec<Triple>,
    #[serde(default)]
    pub prov: HashMap<String, Vec<ProvSnapshot>>,
}

/// The point queries a SPARQL endpoint would answer.
pub trait StoreClient: Send + Sync {
    fn triples_for_subject(&self, s: &str) -> Result<Vec<Triple>, StoreError>;
    fn subjects_with(&self, p: &str, object_face: &str) -> Result<Vec<String>, StoreError>;
    fn objects(&self, s: &str, p: &str) -> Result<Vec<Term>, StoreError>;
    fn has_subject(&self, s: &str) -> Result<bool, StoreError>;
    fn prov_chain(&self, s: &str) -> Result<Vec<ProvSnapshot>, StoreError>;
}

/// Store client over a loaded dump file.
pub struct DumpStore {
    graph: Graph,
    prov: HashMap<String, Vec<ProvSnapshot>>,
}

impl DumpStore {
    pub fn empty() -> Self {
        Self {
            graph: Graph::new(),
            prov: HashMap::new(),
        }
    }

    pub fn from_dump(dump: StoreDump) -> Self {
        Self {
            graph: Graph::from_triples(dump.triples),
            prov: dump.prov,
        }
    }

    /// A missing dump file is an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Ok(Self::empty());
        }
        let dump: StoreDump = read_js_path(path.to_str().unwrap())
            .map_err(|e| StoreError::Dump(e.to_string()))?;
        Ok(Self::from_dump(dump))
    }
}

impl StoreClient for DumpStore {
    fn triples_for_subject(&self, s: &str) -> Result<Vec<Triple>, StoreError> {
        Ok(self.graph.triples_for_subject(s))
    }

    fn subjects_with(&self, p: &str, object_face: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.graph.subjects_with(p, object_face))
    }

    fn objects(&self, s: &str, p: &str) -> Result<Vec<Term>, StoreError> {
        Ok(self.graph.objects(s, p).into_iter().cloned().collect())
    }

    fn has_subject(&self, s: &str) -> Result<bool, StoreError> {
        Ok(self.graph.has_subject(s))
    }

    fn prov_chain(&self, s: &str) -> Result<Vec<ProvSnapshot>, StoreError> {
        Ok(self.prov.get(s).cloned().unwrap_or_default())
    }
}

/// Bounded exponential backoff around any client. Exhaustion aborts the
/// batch (StoreUnavailable in the taxonomy).
pub struct RetryingStore<C> {
    inner: C,
    attempts: u32,
    base: Duration,
}

impl<C: StoreClient> RetryingStore<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            attempts: RETRY_ATTEMPTS,
            base: Duration::from_secs(RETRY_BASE_SECS),
        }
    }

    pub fn with_backoff(inner: C, attempts: u32, base: Duration) -> Self {
        Self {
            inner,
            attempts,
            base,
        }
    }

    fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(&C) -> Result<T, StoreError>,
    {
        let mut wait = self.base;
        let mut last = None;
        for attempt in 0..self.attempts {
            match f(&self.inner) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!("store query failed (attempt {}): {}", attempt + 1, e);
                    last = Some(e);
                    if attempt + 1 < self.attempts {
                        thread::sleep(wait);
                        wait *= 2;
                    }
                }
            }
        }
        Err(last.unwrap())
    }
}

impl<C: StoreClient> StoreClient for RetryingStore<C> {
    fn triples_for_subject(&self, s: &str) -> Result<Vec<Triple>, StoreError> {
        self.run(|c| c.triples_for_subject(s))
    }

    fn subjects_with(&self, p: &str, object_face: &str) -> Result<Vec<String>, StoreError> {
        self.run(|c| c.subjects_with(p, object_face))
    }

    fn objects(&self, s: &str, p: &str) -> Result<Vec<Term>, StoreError> {
        self.run(|c| c.objects(s, p))
    }

    fn has_subject(&self, s: &str) -> Result<bool, StoreError> {
        self.run(|c| c.has_subject(s))
    }

    fn prov_chain(&self, s: &str) -> Result<Vec<ProvSnapshot>, StoreError> {
        self.run(|c| c.prov_chain(s))
    }
}

enum QueIn {
    Go(Vec<String>),
    Poison,
}

/// Breadth-first bulk fetch of `seeds` and everything they link to, up
/// to `depth`, batched through a fixed worker pool. Workers fill
/// private partial graphs merged by the coordinator. The type,
/// identifier-scheme and with-role predicates are not traversed.
pub fn prefetch(
    client: &dyn StoreClient,
    seeds: Vec<String>,
    cache: &mut Graph,
    workers: usize,
    batch_size: usize,
    depth: usize,
) -> Result<(), StoreError> {
    let mut skip = HashSet::new();
    skip.insert(RDF_TYPE);
    skip.insert(USES_SCHEME);
    skip.insert(WITH_ROLE);

    let mut seen: HashSet<String> = HashSet::new();
    let mut frontier: Vec<String> = seeds
        .into_iter()
        .filter(|u| !cache.has_subject(u) && seen.insert(u.clone()))
        .collect();
    frontier.sort();

    for _ in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let level = fetch_level(client, &frontier, workers, batch_size)?;
        let mut next = vec![];
        for s in &frontier {
            for uri in level.linked_uris(s, &skip) {
                if !cache.has_subject(&uri) && !level.has_subject(&uri) && seen.insert(uri.clone())
                {
                    next.push(uri);
                }
            }
        }
        cache.merge(level);
        next.sort();
        next.dedup();
        frontier = next;
    }
    Ok(())
}

fn fetch_level(
    client: &dyn StoreClient,
    subjects: &[String],
    workers: usize,
    batch_size: usize,
) -> Result<Graph, StoreError> {
    let batches: Vec<Vec<String>> = subjects.chunks(batch_size).map(|c| c.to_vec()).collect();
    let n_batches = batches.len();
    let (tx, rx) = bounded::<QueIn>(workers * 2);
    let (res_tx, res_rx) = bounded::<Result<Graph, StoreError>>(n_batches);

    let mut out = Graph::new();
    let mut first_err = None;
    thread::scope(|s| {
        for _ in 0..workers {
            let rx = rx.clone();
            let res_tx = res_tx.clone();
            s.spawn(move || loop {
                match rx.recv().unwrap() {
                    QueIn::Go(batch) => {
                        res_tx.send(fetch_batch(client, &batch)).unwrap();
                    }
                    QueIn::Poison => break,
                }
            });
        }
        for batch in batches {
            tx.send(QueIn::Go(batch)).unwrap();
        }
        for _ in 0..workers {
            tx.send(QueIn::Poison).unwrap();
        }
        for _ in 0..n_batches {
            match res_rx.recv().unwrap() {
                Ok(g) => out.merge(g),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
    });
    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

fn fetch_batch(client: &dyn StoreClient, batch: &[String]) -> Result<Graph, StoreError> {
    let mut g = Graph::new();
    for s in batch {
        for t in client.triples_for_subject(s)? {
            g.add(t);
        }
    }
    Ok(g)
}
