use std::fs::{rename, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use hashbrown::HashMap;

use crate::common::{EntityKind, MetaNum};

const KINDS: [EntityKind; 5] = [
    EntityKind::Br,
    EntityKind::Ra,
    EntityKind::Ar,
    EntityKind::Re,
    EntityKind::Id,
];

/// Atomic monotonic meta allocator. Numbers start at one.
pub trait CounterService {
    fn next(&self, kind: EntityKind) -> MetaNum;
}

/// One file per entity kind, header line holding the next integer.
/// Rewritten via temp-and-rename so a crash never truncates a counter.
pub struct FileCounter {
    root: PathBuf,
    state: Mutex<HashMap<EntityKind, MetaNum>>,
}

impl FileCounter {
    pub fn new(root: &PathBuf) -> Self {
        let mut state = HashMap::new();
        for kind in KINDS {
            let path = root.join(kind.code());
            let current = match File::open(&path) {
                Ok(f) => {
                    let mut line = String::new();
                    BufReader::new(f).read_line(&mut line).unwrap();
                    line.trim().parse::<MetaNum>().unwrap_or(1)
                }
                Err(_) => 1,
            };
            state.insert(kind, current);
        }
        Self {
            root: root.clone(),
            state: Mutex::new(state),
        }
    }

    fn persist(&self, kind: EntityKind, value: MetaNum) {
        let path = self.root.join(kind.code());
        let tmp = self.root.join(format!("{}.tmp", kind.code()));
        let mut f = File::create(&tmp).unwrap();
        writeln!(f, "{}", value).unwrap();
        rename(&tmp, &path).unwrap();
    }
}

impl CounterService for FileCounter {
    fn next(&self, kind: EntityKind) -> MetaNum {
        let mut state = self.state.lock().unwrap();
        let slot = state.get_mut(&kind).unwrap();
        let out = *slot;
        *slot += 1;
        self.persist(kind, *slot);
        out
    }
}

/// Volatile allocator for tests and dry runs.
pub struct MemCounter {
    state: Mutex<HashMap<EntityKind, MetaNum>>,
}

impl MemCounter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Pretend earlier batches already consumed numbers below `start`.
    pub fn starting_at(start: MetaNum) -> Self {
        let mut state = HashMap::new();
        for kind in KINDS {
            state.insert(kind, start);
        }
        Self {
            state: Mutex::new(state),
        }
    }
}

impl CounterService for MemCounter {
    fn next(&self, kind: EntityKind) -> MetaNum {
        let mut state = self.state.lock().unwrap();
        let slot = state.entry(kind).or_insert(1);
        let out = *slot;
        *slot += 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, remove_dir_all};
    use std::path::Path;

    #[test]
    fn file_counter_survives_reopen() {
        let root = Path::new("counter-test-root").to_path_buf();
        create_dir_all(&root).unwrap();
        {
            let c = FileCounter::new(&root);
            assert_eq!(c.next(EntityKind::Br), 1);
            assert_eq!(c.next(EntityKind::Br), 2);
            assert_eq!(c.next(EntityKind::Ra), 1);
        }
        let c = FileCounter::new(&root);
        assert_eq!(c.next(EntityKind::Br), 3);
        assert_eq!(c.next(EntityKind::Ra), 2);
        assert_eq!(c.next(EntityKind::Id), 1);
        remove_dir_all(&root).unwrap();
    }

    #[test]
    fn mem_counter_per_kind() {
        let c = MemCounter::new();
        assert_eq!(c.next(EntityKind::Br), 1);
        assert_eq!(c.next(EntityKind::Br), 2);
        assert_eq!(c.next(EntityKind::Id), 1);
    }
}
