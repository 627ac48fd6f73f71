use hashbrown::HashMap;

use crate::common::{Key, MetaNum};
use crate::curator::{merge_entries, Curator, EntityEntry, Target, NEW_VALUE_PROPOSED};
use crate::error::StoreError;
use crate::rows::{parse_bracket_field, BrType};
use crate::vi_patterns::normalise_vi;

#[derive(Clone, Debug)]
pub struct VolumeNode {
    pub key: Key,
    pub issues: HashMap<String, Key>,
}

#[derive(Clone, Debug, Default)]
pub struct VenueNode {
    pub volumes: HashMap<String, VolumeNode>,
    pub issues: HashMap<String, Key>,
}

/// The two-level venue -> volume -> issue tree over br keys.
#[derive(Default)]
pub struct VenueTree {
    venues: HashMap<Key, VenueNode>,
}

impl VenueTree {
    pub fn contains(&self, venue: &Key) -> bool {
        self.venues.contains_key(venue)
    }

    pub fn venues(&self) -> &HashMap<Key, VenueNode> {
        &self.venues
    }

    pub fn node_mut(&mut self, venue: Key) -> &mut VenueNode {
        self.venues.entry(venue).or_default()
    }

    pub fn volume_key(&self, venue: &Key, number: &str) -> Option<Key> {
        self.venues
            .get(venue)
            .and_then(|n| n.volumes.get(number))
            .map(|v| v.key)
    }

    pub fn issue_key(&self, venue: &Key, volume: Option<&str>, number: &str) -> Option<Key> {
        let node = self.venues.get(venue)?;
        match volume {
            Some(v) => node.volumes.get(v).and_then(|vn| vn.issues.get(number)).copied(),
            None => node.issues.get(number).copied(),
        }
    }

    /// Rewrite every key; colliding venues are unioned, first key wins
    /// inside each slot.
    pub fn remap<F: Fn(Key) -> Key>(&mut self, f: F) {
        let old = std::mem::take(&mut self.venues);
        for (venue, node) in old {
            let target = self.venues.entry(f(venue)).or_default();
            for (num, vol) in node.volumes {
                let mapped = f(vol.key);
                let slot = target.volumes.entry(num).or_insert_with(|| VolumeNode {
                    key: mapped,
                    issues: HashMap::new(),
                });
                for (inum, ikey) in vol.issues {
                    slot.issues.entry(inum).or_insert_with(|| f(ikey));
                }
            }
            for (inum, ikey) in node.issues {
                target.issues.entry(inum).or_insert_with(|| f(ikey));
            }
        }
    }
}

/// Established-meta-wins arbitration for one tree slot.
fn pick_survivor(established: Key, incoming: Key) -> (Key, Option<Key>) {
    if established == incoming {
        return (established, None);
    }
    match (established.is_meta(), incoming.is_meta()) {
        (true, false) => (established, Some(incoming)),
        (false, true) => (incoming, Some(established)),
        (false, false) => (established, Some(incoming)),
        // two persistent metas on one slot: keep the first, never merge
        (true, true) => (established, None),
    }
}

impl<'a> Curator<'a> {
    /// Pass 2: place the row in its venue/volume/issue tree.
    pub(crate) fn clean_vvi(&mut self, idx: usize) -> Result<(), StoreError> {
        let row_num = self.rows[idx].num;
        let rtype = BrType::from_label(&self.rows[idx].row.rtype);

        let vi = normalise_vi(
            &self.rows[idx].row.volume,
            &self.rows[idx].row.issue,
            &self.rows[idx].row.rtype,
        );
        if vi.volume != self.rows[idx].row.volume || vi.issue != self.rows[idx].row.issue {
            self.rows[idx].row.volume = vi.volume.clone();
            self.rows[idx].row.issue = vi.issue.clone();
        }
        if let Some(new_type) = vi.new_type {
            self.log
                .add(row_num, "type", NEW_VALUE_PROPOSED.to_string());
            self.rows[idx].row.rtype = new_type.to_string();
        }
        let rtype = match vi.new_type {
            Some(t) => BrType::from_label(t),
            None => rtype,
        };

        if rtype == Some(BrType::Journal) {
            // a journal is a venue itself; embedded numbers are bogus
            if !self.rows[idx].row.volume.is_empty() || !self.rows[idx].row.issue.is_empty() {
                self.rows[idx].row.venue.clear();
                self.rows[idx].row.volume.clear();
                self.rows[idx].row.issue.clear();
            }
            return Ok(());
        }
        // a volume never carries an issue number, venue or not
        if rtype == Some(BrType::JournalVolume) {
            self.rows[idx].row.issue.clear();
        }
        if self.rows[idx].row.venue.is_empty() {
            return Ok(());
        }

        let (venue_name, venue_ids) = parse_bracket_field(&self.rows[idx].row.venue);
        let venue_key = self.id_worker(row_num, "venue", Target::Br, &venue_name, &venue_ids)?;
        self.rows[idx].venue = Some(venue_key);

        if !self.vvi.contains(&venue_key) {
            if let Key::Meta(meta) = venue_key {
                self.populate_venue_from_store(venue_key, meta)?;
            }
            self.vvi.node_mut(venue_key);
        }

        let volume = self.rows[idx].row.volume.clone();
        let issue = self.rows[idx].row.issue.clone();
        match rtype {
            Some(BrType::JournalVolume) => {
                let number = if volume.is_empty() {
                    self.rows[idx].row.title.clone()
                } else {
                    volume
                };
                let own = self.rows[idx].br;
                let survivor = self.place_volume(venue_key, &number, own);
                self.rows[idx].br = survivor;
                self.rows[idx].container = Some(venue_key);
            }
            Some(BrType::JournalIssue) => {
                let number = if issue.is_empty() {
                    self.rows[idx].row.title.clone()
                } else {
                    issue
                };
                let own = self.rows[idx].br;
                let (survivor, container) = if volume.is_empty() {
                    (self.place_issue(venue_key, None, &number, own), venue_key)
                } else {
                    let vol_key = self.ensure_volume(venue_key, &volume);
                    (
                        self.place_issue(venue_key, Some(&volume), &number, own),
                        vol_key,
                    )
                };
                self.rows[idx].br = survivor;
                self.rows[idx].container = Some(container);
            }
            _ => {
                let container = if !volume.is_empty() {
                    let vol_key = self.ensure_volume(venue_key, &volume);
                    if issue.is_empty() {
                        vol_key
                    } else {
                        self.ensure_issue(venue_key, Some(&volume), &issue)
                    }
                } else if !issue.is_empty() {
                    self.ensure_issue(venue_key, None, &issue)
                } else {
                    venue_key
                };
                self.rows[idx].container = Some(container);
            }
        }
        Ok(())
    }

    fn populate_venue_from_store(&mut self, venue_key: Key, meta: MetaNum) -> Result<(), StoreError> {
        let vs = self.finder.retrieve_venue_from_meta(meta)?;
        let node = self.vvi.node_mut(venue_key);
        for (num, (vol_meta, issues)) in vs.volumes {
            node.volumes.insert(
                num,
                VolumeNode {
                    key: Key::Meta(vol_meta),
                    issues: issues
                        .into_iter()
                        .map(|(n, m)| (n, Key::Meta(m)))
                        .collect(),
                },
            );
        }
        for (num, iss_meta) in vs.issues {
            node.issues.insert(num, Key::Meta(iss_meta));
        }
        Ok(())
    }

    /// Reuse the volume at this slot or create a fresh wannabe br.
    fn ensure_volume(&mut self, venue: Key, number: &str) -> Key {
        if let Some(k) = self.vvi.volume_key(&venue, number) {
            return k;
        }
        let key = self.new_wannabe();
        self.brdict.insert(key, EntityEntry::default());
        self.vvi.node_mut(venue).volumes.insert(
            number.to_string(),
            VolumeNode {
                key,
                issues: HashMap::new(),
            },
        );
        key
    }

    fn ensure_issue(&mut self, venue: Key, volume: Option<&str>, number: &str) -> Key {
        if let Some(v) = volume {
            self.ensure_volume(venue, v);
        }
        if let Some(k) = self.vvi.issue_key(&venue, volume, number) {
            return k;
        }
        let key = self.new_wannabe();
        self.brdict.insert(key, EntityEntry::default());
        let node = self.vvi.node_mut(venue);
        match volume {
            Some(v) => {
                node.volumes
                    .get_mut(v)
                    .unwrap()
                    .issues
                    .insert(number.to_string(), key);
            }
            None => {
                node.issues.insert(number.to_string(), key);
            }
        }
        key
    }

    /// Install a row's own br as the volume at this slot, merging with
    /// whatever already sits there.
    fn place_volume(&mut self, venue: Key, number: &str, incoming: Key) -> Key {
        match self.vvi.volume_key(&venue, number) {
            None => {
                self.vvi.node_mut(venue).volumes.insert(
                    number.to_string(),
                    VolumeNode {
                        key: incoming,
                        issues: HashMap::new(),
                    },
                );
                incoming
            }
            Some(established) => {
                let (survivor, victim) = pick_survivor(established, incoming);
                if let Some(victim) = victim {
                    merge_entries(&mut self.brdict, survivor, victim);
                }
                self.vvi
                    .node_mut(venue)
                    .volumes
                    .get_mut(number)
                    .unwrap()
                    .key = survivor;
                survivor
            }
        }
    }

    fn place_issue(
        &mut self,
        venue: Key,
        volume: Option<&str>,
        number: &str,
        incoming: Key,
    ) -> Key {
        if let Some(v) = volume {
            self.ensure_volume(venue, v);
        }
        match self.vvi.issue_key(&venue, volume, number) {
            None => {
                let node = self.vvi.node_mut(venue);
                match volume {
                    Some(v) => {
                        node.volumes
                            .get_mut(v)
                            .unwrap()
                            .issues
                            .insert(number.to_string(), incoming);
                    }
                    None => {
                        node.issues.insert(number.to_string(), incoming);
                    }
                }
                incoming
            }
            Some(established) => {
                let (survivor, victim) = pick_survivor(established, incoming);
                if let Some(victim) = victim {
                    merge_entries(&mut self.brdict, survivor, victim);
                }
                let node = self.vvi.node_mut(venue);
                match volume {
                    Some(v) => {
                        node.volumes
                            .get_mut(v)
                            .unwrap()
                            .issues
                            .insert(number.to_string(), survivor);
                    }
                    None => {
                        node.issues.insert(number.to_string(), survivor);
                    }
                }
                survivor
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survivor_arbitration() {
        let w0 = Key::Wannabe(0);
        let w1 = Key::Wannabe(1);
        let m = Key::Meta(5);
        assert_eq!(pick_survivor(m, w0), (m, Some(w0)));
        assert_eq!(pick_survivor(w0, m), (m, Some(w0)));
        assert_eq!(pick_survivor(w0, w1), (w0, Some(w1)));
        assert_eq!(pick_survivor(m, Key::Meta(6)), (m, None));
        assert_eq!(pick_survivor(m, m), (m, None));
    }

    #[test]
    fn remap_unions_colliding_venues() {
        let mut tree = VenueTree::default();
        tree.node_mut(Key::Wannabe(0)).issues.insert("1".into(), Key::Wannabe(2));
        tree.node_mut(Key::Wannabe(1)).issues.insert("2".into(), Key::Wannabe(3));
        // both venues map to the same meta
        tree.remap(|k| match k {
            Key::Wannabe(0) | Key::Wannabe(1) => Key::Meta(9),
            other => other,
        });
        let node = tree.venues().get(&Key::Meta(9)).unwrap();
        assert_eq!(node.issues.len(), 2);
    }
}
