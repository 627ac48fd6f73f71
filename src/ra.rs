use crate::common::{EntityKind, Key, MetaNum};
use crate::curator::{resolve, Curator, EntityEntry, Target, RA_SEQUENCE_REFUSED};
use crate::error::StoreError;
use crate::rows::{parse_bracket_field, split_family_given, split_outside_brackets};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Author,
    Editor,
    Publisher,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Author => "author",
            RoleKind::Editor => "editor",
            RoleKind::Publisher => "publisher",
        }
    }
}

/// `family, given` name compatibility: equal families, and givens that
/// agree up to abbreviation. Org names compare whole.
fn names_match(stored: &str, proposed: &str) -> bool {
    let (sf, sg) = split_family_given(stored);
    let (pf, pg) = split_family_given(proposed);
    if sf.is_empty() || pf.is_empty() {
        return !stored.trim().is_empty()
            && stored.trim().to_lowercase() == proposed.trim().to_lowercase();
    }
    if sf.to_lowercase() != pf.to_lowercase() {
        return false;
    }
    if sg.is_empty() || pg.is_empty() {
        return true;
    }
    let a = sg.trim_end_matches('.').to_lowercase();
    let b = pg.trim_end_matches('.').to_lowercase();
    a.starts_with(&b) || b.starts_with(&a)
}

/// A fuller given-name than the stored one, same family.
fn upgrades_given(stored: &str, proposed: &str) -> bool {
    let (sf, sg) = split_family_given(stored);
    let (pf, pg) = split_family_given(proposed);
    if sf.is_empty() || pf.is_empty() || sf.to_lowercase() != pf.to_lowercase() {
        return false;
    }
    if pg.len() <= sg.len() {
        return false;
    }
    sg.is_empty()
        || pg
            .to_lowercase()
            .starts_with(&sg.trim_end_matches('.').to_lowercase())
}

impl<'a> Curator<'a> {
    /// Pass 3: resolve one contributor field of a row into the br's
    /// ordered role chain.
    pub(crate) fn clean_ra(&mut self, idx: usize, role: RoleKind) -> Result<(), StoreError> {
        let field_val = {
            let row = &self.rows[idx].row;
            match role {
                RoleKind::Author => row.author.clone(),
                RoleKind::Editor => row.editor.clone(),
                RoleKind::Publisher => row.publisher.clone(),
            }
        };
        if field_val.is_empty() {
            return Ok(());
        }
        let row_num = self.rows[idx].num;
        let br_key = self.rows[idx].br;

        self.load_stored_chain(br_key, role)?;

        // a publisher field is one agent, never a semicolon list
        let entries = if role == RoleKind::Publisher {
            vec![field_val]
        } else {
            split_outside_brackets(&field_val, ';')
        };

        let mut row_positions: Vec<usize> = vec![];
        for entry in entries {
            let (name, mut ids) = parse_bracket_field(&entry);
            let mut direct = None;
            if ids.is_empty() {
                // id-less mention of an agent already on the chain
                match self.match_name_in_chain(br_key, role, &name) {
                    Some(Key::Meta(m)) => ids.push(format!("meta:ra/{}", m)),
                    Some(wannabe) => direct = Some(wannabe),
                    None => {}
                }
            }
            let ra_key = match direct {
                Some(k) => k,
                None => self.id_worker(
                    row_num,
                    role.as_str(),
                    Target::Ra {
                        publisher: role == RoleKind::Publisher,
                    },
                    &name,
                    &ids,
                )?,
            };
            if role != RoleKind::Publisher {
                self.enrich_agent_name(ra_key, &name);
            }

            let resolved_new = resolve(&self.radict, ra_key);
            let found = self
                .ardict
                .get(&br_key)
                .and_then(|roles| roles.get(&role))
                .and_then(|chain| {
                    chain
                        .iter()
                        .position(|(_, ra)| resolve(&self.radict, *ra) == resolved_new)
                });
            match found {
                Some(pos) => row_positions.push(pos),
                None => {
                    let ar_key = self.new_wannabe();
                    let chain = self
                        .ardict
                        .entry(br_key)
                        .or_default()
                        .entry(role)
                        .or_default();
                    chain.push((ar_key, ra_key));
                    row_positions.push(chain.len() - 1);
                }
            }
        }

        // the stored order is immutable: a row proposing a different one
        // is noted and ignored
        if row_positions.windows(2).any(|w| w[0] > w[1]) {
            self.log
                .add(row_num, role.as_str(), RA_SEQUENCE_REFUSED.to_string());
        }
        Ok(())
    }

    /// Seed the chain for this (br, role) from the store, once.
    fn load_stored_chain(&mut self, br_key: Key, role: RoleKind) -> Result<(), StoreError> {
        if self
            .ardict
            .get(&br_key)
            .map_or(false, |roles| roles.contains_key(&role))
        {
            return Ok(());
        }
        let mut chain: Vec<(Key, Key)> = vec![];
        if let Key::Meta(meta) = br_key {
            if self.preexisting.contains(&br_key.label(EntityKind::Br)) {
                for link in self
                    .finder
                    .retrieve_ra_sequence_from_br_meta(meta, role.as_str())?
                {
                    let ra_key = Key::Meta(link.ra);
                    if !self.radict.contains_key(&ra_key) {
                        self.radict.insert(ra_key, EntityEntry::named(&link.name));
                        self.preexisting.insert(ra_key.label(EntityKind::Ra));
                        for (id_label, literal) in link.ids {
                            let id_meta = id_label
                                .strip_prefix("id/")
                                .and_then(|m| m.parse::<MetaNum>().ok());
                            self.attach_known_id(
                                Target::Ra { publisher: false },
                                ra_key,
                                &literal,
                                id_meta,
                            )?;
                        }
                    }
                    chain.push((Key::Meta(link.ar), ra_key));
                }
            }
        }
        self.ardict.entry(br_key).or_default().insert(role, chain);
        Ok(())
    }

    fn match_name_in_chain(&self, br_key: Key, role: RoleKind, name: &str) -> Option<Key> {
        let chain = self.ardict.get(&br_key)?.get(&role)?;
        for (_, ra) in chain {
            let key = resolve(&self.radict, *ra);
            if let Some(entry) = self.radict.get(&key) {
                if names_match(&entry.title, name) {
                    return Some(key);
                }
            }
        }
        None
    }

    fn enrich_agent_name(&mut self, ra_key: Key, row_name: &str) {
        let key = resolve(&self.radict, ra_key);
        if let Some(entry) = self.radict.get_mut(&key) {
            if upgrades_given(&entry.title, row_name) {
                let (family, _) = split_family_given(&entry.title);
                let (_, given) = split_family_given(row_name);
                entry.title = format!("{}, {}", family, given);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::MemCounter;
    use crate::curator::RowSlot;
    use crate::finder::ResourceFinder;
    use crate::rows::CleanedRow;
    use crate::store::DumpStore;

    #[test]
    fn name_matching_rules() {
        assert!(names_match("Smith, A", "Smith, Alice"));
        assert!(names_match("Smith, A.", "Smith, Alice"));
        assert!(names_match("Smith,", "Smith, Alice"));
        assert!(names_match("Smith, Alice", "Smith, Alice"));
        assert!(!names_match("Smith, Alice", "Smith, Bob"));
        assert!(!names_match("Jones, A", "Smith, A"));
        assert!(names_match("ACME Press", "acme press"));
        assert!(!names_match("", ""));
    }

    #[test]
    fn given_name_upgrade() {
        assert!(upgrades_given("Smith, A", "Smith, Alice"));
        assert!(upgrades_given("Smith,", "Smith, Alice"));
        assert!(!upgrades_given("Smith, Alice", "Smith, A"));
        assert!(!upgrades_given("Smith, Alice", "Smith, Alice"));
        assert!(!upgrades_given("ACME", "ACME Press"));
    }

    fn curator_with_row(counter: &MemCounter, row: CleanedRow) -> Curator<'_> {
        let mut c = Curator::new(
            ResourceFinder::new(Box::new(DumpStore::empty())),
            counter,
        );
        let br = c.new_wannabe();
        c.brdict.insert(br, EntityEntry::named(&row.title));
        c.rows.push(RowSlot {
            num: 0,
            row,
            br,
            venue: None,
            container: None,
        });
        c
    }

    #[test]
    fn idless_mention_reuses_chain_agent_and_enriches() {
        let counter = MemCounter::new();
        let row = CleanedRow {
            author: "Smith, A [orcid:0000-0001-0000-0000]".to_string(),
            ..Default::default()
        };
        let mut c = curator_with_row(&counter, row);
        c.clean_ra(0, RoleKind::Author).unwrap();
        assert_eq!(c.radict.len(), 1);

        // same br mentions the agent again, fuller name, no ids
        c.rows[0].row.author = "Smith, Alice".to_string();
        c.clean_ra(0, RoleKind::Author).unwrap();
        assert_eq!(c.radict.len(), 1);
        let entry = c.radict.values().next().unwrap();
        assert_eq!(entry.title, "Smith, Alice");
        let chain = &c.ardict[&c.rows[0].br][&RoleKind::Author];
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn reordered_sequence_is_refused() {
        let counter = MemCounter::new();
        let row = CleanedRow {
            author: "Smith, A [orcid:0000-0001-0000-0000]; Doe, J [orcid:0000-0002-0000-0000]"
                .to_string(),
            ..Default::default()
        };
        let mut c = curator_with_row(&counter, row);
        c.clean_ra(0, RoleKind::Author).unwrap();
        assert!(c.log().messages(0, "author").is_empty());

        c.rows[0].row.author =
            "Doe, J [orcid:0000-0002-0000-0000]; Smith, A [orcid:0000-0001-0000-0000]"
                .to_string();
        c.clean_ra(0, RoleKind::Author).unwrap();
        assert_eq!(
            c.log().messages(0, "author"),
            vec![RA_SEQUENCE_REFUSED.to_string()]
        );
        // order unchanged
        let chain = &c.ardict[&c.rows[0].br][&RoleKind::Author];
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn publisher_semicolon_stays_single_agent() {
        let counter = MemCounter::new();
        let row = CleanedRow {
            publisher: "ACME; Sons [crossref:42]".to_string(),
            ..Default::default()
        };
        let mut c = curator_with_row(&counter, row);
        c.clean_ra(0, RoleKind::Publisher).unwrap();
        assert_eq!(c.radict.len(), 1);
        let entry = c.radict.values().next().unwrap();
        assert_eq!(entry.title, "ACME; Sons");
        assert_eq!(entry.ids, vec!["crossref:42"]);
    }
}
