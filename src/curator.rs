use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use log::info;
use serde::Serialize;
use tqdm::Iter;

use crate::common::{parse_omid_token, EntityKind, Key, MetaNum};
use crate::counter::CounterService;
use crate::error::StoreError;
use crate::finder::ResourceFinder;
use crate::ra::RoleKind;
use crate::rows::{
    is_known_scheme, normalize_hyphens, parse_bracket_field, row_validity, split_identifiers,
    split_outside_brackets, CleanedRow, RowValidity,
};
use crate::vvi::VenueTree;

pub const NEW_VALUE_PROPOSED: &str = "New value proposed";
pub const ENTITY_ALREADY_EXISTS: &str = "Entity already exists";
pub const RA_SEQUENCE_REFUSED: &str = "New RA sequence proposed: refused";

/// One working-dictionary entry: a br or ra accumulating identifiers.
#[derive(Clone, Debug, Default)]
pub struct EntityEntry {
    /// `scheme:literal` strings, insertion-ordered, unique.
    pub ids: Vec<String>,
    /// Keys absorbed into this entry.
    pub others: HashSet<Key>,
    /// Title for a br, formatted name for a ra.
    pub title: String,
}

impl EntityEntry {
    pub fn named(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn add_id(&mut self, literal: &str) {
        if !self.ids.iter().any(|i| i == literal) {
            self.ids.push(literal.to_string());
        }
    }
}

/// Row plus everything the batch learns about it.
#[derive(Clone, Debug)]
pub struct RowSlot {
    pub num: usize,
    pub row: CleanedRow,
    pub br: Key,
    pub venue: Option<Key>,
    pub container: Option<Key>,
}

/// The (row, field) -> messages structured log, emitted as JSON.
#[derive(Default, Serialize)]
pub struct CurationLog {
    entries: BTreeMap<usize, BTreeMap<String, Vec<String>>>,
}

impl CurationLog {
    pub fn add(&mut self, row: usize, field: &str, msg: String) {
        self.entries
            .entry(row)
            .or_default()
            .entry(field.to_string())
            .or_default()
            .push(msg);
    }

    pub fn messages(&self, row: usize, field: &str) -> Vec<String> {
        self.entries
            .get(&row)
            .and_then(|f| f.get(field))
            .cloned()
            .unwrap_or_default()
    }

    /// Rewrite lingering wannabe mentions to their final metas.
    pub fn remap(&mut self, subst: &HashMap<String, String>) {
        for fields in self.entries.values_mut() {
            for msgs in fields.values_mut() {
                for msg in msgs.iter_mut() {
                    if !msg.contains("wannabe_") {
                        continue;
                    }
                    for (from, to) in subst {
                        if msg.contains(from.as_str()) {
                            *msg = msg.replace(from.as_str(), to);
                        }
                    }
                }
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Target {
    Br,
    Ra { publisher: bool },
}

impl Target {
    pub(crate) fn kind(&self) -> EntityKind {
        match self {
            Target::Br => EntityKind::Br,
            Target::Ra { .. } => EntityKind::Ra,
        }
    }
}

pub struct Curator<'a> {
    pub(crate) finder: ResourceFinder,
    pub(crate) counter: &'a dyn CounterService,
    pub(crate) brdict: HashMap<Key, EntityEntry>,
    pub(crate) radict: HashMap<Key, EntityEntry>,
    pub(crate) conflict_br: HashMap<Key, EntityEntry>,
    pub(crate) conflict_ra: HashMap<Key, EntityEntry>,
    /// `scheme:literal` -> identifier-entity key, per holder kind.
    pub(crate) idmap_br: HashMap<String, Key>,
    pub(crate) idmap_ra: HashMap<String, Key>,
    pub(crate) vvi: VenueTree,
    /// br key -> role -> ordered (ar, ra) chain.
    pub(crate) ardict: HashMap<Key, HashMap<RoleKind, Vec<(Key, Key)>>>,
    pub(crate) rows: Vec<RowSlot>,
    pub(crate) log: CurationLog,
    pub(crate) preexisting: HashSet<String>,
    /// br key -> re meta, filled during enrichment.
    pub(crate) re_table: Vec<(Key, MetaNum)>,
    wannabe_cnt: u32,
}

impl<'a> Curator<'a> {
    pub fn new(finder: ResourceFinder, counter: &'a dyn CounterService) -> Self {
        Self {
            finder,
            counter,
            brdict: HashMap::new(),
            radict: HashMap::new(),
            conflict_br: HashMap::new(),
            conflict_ra: HashMap::new(),
            idmap_br: HashMap::new(),
            idmap_ra: HashMap::new(),
            vvi: VenueTree::default(),
            ardict: HashMap::new(),
            rows: vec![],
            log: CurationLog::default(),
            preexisting: HashSet::new(),
            re_table: vec![],
            wannabe_cnt: 0,
        }
    }

    pub fn log(&self) -> &CurationLog {
        &self.log
    }

    pub fn rows(&self) -> &[RowSlot] {
        &self.rows
    }

    pub(crate) fn new_wannabe(&mut self) -> Key {
        let key = Key::Wannabe(self.wannabe_cnt);
        self.wannabe_cnt += 1;
        key
    }

    pub(crate) fn dict(&self, target: Target) -> &HashMap<Key, EntityEntry> {
        match target {
            Target::Br => &self.brdict,
            Target::Ra { .. } => &self.radict,
        }
    }

    pub(crate) fn dict_mut(&mut self, target: Target) -> &mut HashMap<Key, EntityEntry> {
        match target {
            Target::Br => &mut self.brdict,
            Target::Ra { .. } => &mut self.radict,
        }
    }

    fn conflict_dict_mut(&mut self, target: Target) -> &mut HashMap<Key, EntityEntry> {
        match target {
            Target::Br => &mut self.conflict_br,
            Target::Ra { .. } => &mut self.conflict_ra,
        }
    }

    pub(crate) fn idmap_mut(&mut self, target: Target) -> &mut HashMap<String, Key> {
        match target {
            Target::Br => &mut self.idmap_br,
            Target::Ra { .. } => &mut self.idmap_ra,
        }
    }

    // ------------------------------------------------------------------
    // batch pipeline

    pub fn curate(&mut self, input: Vec<CleanedRow>) -> Result<(), StoreError> {
        self.validate_rows(input);
        info!("curating {} valid rows", self.rows.len());
        self.prefetch_batch()?;

        let row_count = self.rows.len();
        for idx in (0..row_count).tqdm() {
            self.clean_id(idx)?;
        }
        self.merge_duplicate_entities();
        for idx in 0..row_count {
            self.clean_vvi(idx)?;
        }
        for idx in 0..row_count {
            for role in [RoleKind::Author, RoleKind::Publisher, RoleKind::Editor] {
                self.clean_ra(idx, role)?;
            }
        }

        let conflicts: Vec<(Key, EntityEntry)> = self.conflict_br.drain().collect();
        self.brdict.extend(conflicts);
        let conflicts: Vec<(Key, EntityEntry)> = self.conflict_ra.drain().collect();
        self.radict.extend(conflicts);

        self.meta_maker();
        self.enrich()?;
        self.dedup_rows();
        Ok(())
    }

    fn validate_rows(&mut self, input: Vec<CleanedRow>) {
        for (num, row) in input.into_iter().enumerate() {
            match row_validity(&row) {
                RowValidity::Valid => self.rows.push(RowSlot {
                    num,
                    row,
                    br: Key::Wannabe(u32::MAX),
                    venue: None,
                    container: None,
                }),
                RowValidity::DropSilently => {}
                RowValidity::Invalid(reason) => {
                    self.log.add(num, "row", format!("Invalid row: {}", reason));
                }
            }
        }
    }

    /// Gather every meta reference, identifier and venue in the batch
    /// and warm the finder's cache in one parallel sweep.
    fn prefetch_batch(&mut self) -> Result<(), StoreError> {
        let mut metavals: Vec<(EntityKind, MetaNum)> = vec![];
        let mut identifiers: Vec<(String, String)> = vec![];
        let mut vvis: Vec<MetaNum> = vec![];

        let mut take = |tokens: Vec<String>, kind: EntityKind| {
            let mut venue_meta = None;
            for token in tokens {
                let token = normalize_hyphens(&token);
                if let Some((k, m)) = parse_omid_token(&token) {
                    metavals.push((k, m));
                    if k == EntityKind::Br && kind == EntityKind::Br {
                        venue_meta = Some(m);
                    }
                } else if let Some((scheme, value)) = token.split_once(':') {
                    if !scheme.is_empty() && !value.is_empty() {
                        identifiers.push((scheme.to_lowercase(), value.to_string()));
                    }
                }
            }
            venue_meta
        };

        for slot in &self.rows {
            take(split_identifiers(&slot.row.id), EntityKind::Br);
            let (_, venue_ids) = parse_bracket_field(&slot.row.venue);
            if let Some(m) = take(venue_ids, EntityKind::Br) {
                vvis.push(m);
            }
            for field in [&slot.row.author, &slot.row.editor, &slot.row.publisher] {
                for entry in split_outside_brackets(field, ';') {
                    let (_, ids) = parse_bracket_field(&entry);
                    take(ids, EntityKind::Ra);
                }
            }
        }
        drop(take);
        self.finder
            .get_everything_about_res(&metavals, &identifiers, &vvis)
    }

    /// Pass 1: resolve the row's own bibliographic resource.
    fn clean_id(&mut self, idx: usize) -> Result<(), StoreError> {
        let row_num = self.rows[idx].num;
        let title = self.rows[idx].row.title.clone();
        let ids = split_identifiers(&self.rows[idx].row.id);
        let key = self.id_worker(row_num, "id", Target::Br, &title, &ids)?;
        self.rows[idx].br = key;
        if let Key::Meta(meta) = key {
            if self.preexisting.contains(&key.label(EntityKind::Br)) {
                self.log
                    .add(row_num, "id", ENTITY_ALREADY_EXISTS.to_string());
                self.equalizer(idx, meta)?;
            }
        }
        Ok(())
    }

    /// Align a row with the store's view of an already-known br.
    fn equalizer(&mut self, idx: usize, meta: MetaNum) -> Result<(), StoreError> {
        let info = self.finder.retrieve_br_info_from_meta(meta)?;
        let row_num = self.rows[idx].num;
        let row = &mut self.rows[idx].row;
        let fields: [(&str, &mut String, String); 6] = [
            ("pub_date", &mut row.pub_date, info.pub_date),
            ("type", &mut row.rtype, info.rtype),
            ("venue", &mut row.venue, info.venue),
            ("volume", &mut row.volume, info.volume),
            ("issue", &mut row.issue, info.issue),
            ("page", &mut row.page, info.page),
        ];
        let mut messages = vec![];
        for (field, row_val, store_val) in fields {
            if store_val.is_empty() {
                if !row_val.is_empty() {
                    messages.push((field, NEW_VALUE_PROPOSED.to_string()));
                }
                continue;
            }
            if !row_val.is_empty() && *row_val != store_val {
                messages.push((field, NEW_VALUE_PROPOSED.to_string()));
            }
            *row_val = store_val;
        }
        for (field, msg) in messages {
            self.log.add(row_num, field, msg);
        }
        Ok(())
    }

    /// Rows still keyed by an absorbed wannabe adopt the survivor, and
    /// rows sharing one br equalise their bibliographic fields.
    fn merge_duplicate_entities(&mut self) {
        for idx in 0..self.rows.len() {
            let key = self.rows[idx].br;
            self.rows[idx].br = resolve(&self.brdict, key);
        }

        let mut first_values: HashMap<Key, CleanedRow> = HashMap::new();
        let mut messages = vec![];
        for slot in self.rows.iter_mut() {
            let shared = first_values.entry(slot.br).or_insert_with(|| slot.row.clone());
            macro_rules! propagate {
                ($field:ident, $label:literal) => {
                    if shared.$field.is_empty() {
                        shared.$field = slot.row.$field.clone();
                    } else if !slot.row.$field.is_empty() && slot.row.$field != shared.$field {
                        messages.push((slot.num, $label));
                        slot.row.$field = shared.$field.clone();
                    } else {
                        slot.row.$field = shared.$field.clone();
                    }
                };
            }
            propagate!(pub_date, "pub_date");
            propagate!(page, "page");
            propagate!(rtype, "type");
            propagate!(venue, "venue");
            propagate!(volume, "volume");
            propagate!(issue, "issue");
        }
        for (num, field) in messages {
            self.log.add(num, field, NEW_VALUE_PROPOSED.to_string());
        }
    }

    // ------------------------------------------------------------------
    // identifier resolution

    /// Central resolution routine: one (name, identifier list) becomes
    /// a key into the br or ra dictionary.
    pub(crate) fn id_worker(
        &mut self,
        row_num: usize,
        field: &str,
        target: Target,
        name: &str,
        raw_ids: &[String],
    ) -> Result<Key, StoreError> {
        let (clean, metaval) = normalize_id_list(raw_ids, target.kind());

        if let Some(mv) = metaval {
            if let Some(key) = self.adopt_meta(target, mv, name, &clean)? {
                return Ok(key);
            }
            let redirect = self
                .finder
                .retrieve_metaid_from_merged_entity(target.kind(), mv)?;
            if let Some(surviving) = redirect {
                if let Some(key) = self.adopt_meta(target, surviving, name, &clean)? {
                    return Ok(key);
                }
            }
            // unknown meta reference: treat as absent
        }

        if clean.is_empty() {
            let key = self.new_wannabe();
            self.dict_mut(target).insert(key, EntityEntry::named(name));
            return Ok(key);
        }

        let mut meta_matches: Vec<Key> = vec![];
        let mut wannabe_matches: Vec<Key> = vec![];
        for (k, e) in self.dict(target) {
            if clean.iter().any(|c| e.ids.iter().any(|i| i == c)) {
                match k {
                    Key::Meta(_) => meta_matches.push(*k),
                    Key::Wannabe(_) => wannabe_matches.push(*k),
                }
            }
        }
        meta_matches.sort();
        wannabe_matches.sort();

        if meta_matches.len() > 1 {
            return self.conflict(row_num, field, target, name, &clean);
        }

        let key = if let Some(&meta_key) = meta_matches.first() {
            for w in wannabe_matches {
                merge_entries(self.dict_mut(target), meta_key, w);
            }
            let attached = self.dict(target)[&meta_key].ids.clone();
            let suspects: Vec<String> = clean
                .iter()
                .filter(|c| !attached.iter().any(|a| a == *c))
                .cloned()
                .collect();
            let mut store_metas = self.store_metas_for(target, &suspects)?;
            store_metas.retain(|m| Key::Meta(*m) != meta_key);
            if !store_metas.is_empty() {
                return self.conflict(row_num, field, target, name, &clean);
            }
            meta_key
        } else if !wannabe_matches.is_empty() {
            let survivor = wannabe_matches[0];
            for w in &wannabe_matches[1..] {
                merge_entries(self.dict_mut(target), survivor, *w);
            }
            let store_metas = self.store_metas_for(target, &clean)?;
            match store_metas.as_slice() {
                [] => survivor,
                [meta] => {
                    let meta = *meta;
                    self.adopt_meta(target, meta, name, &[])?;
                    merge_entries(self.dict_mut(target), Key::Meta(meta), survivor);
                    Key::Meta(meta)
                }
                _ => return self.conflict(row_num, field, target, name, &clean),
            }
        } else {
            let store_metas = self.store_metas_for(target, &clean)?;
            match store_metas.as_slice() {
                [] => {
                    let key = self.new_wannabe();
                    self.dict_mut(target).insert(key, EntityEntry::named(name));
                    key
                }
                [meta] => {
                    let meta = *meta;
                    self.adopt_meta(target, meta, name, &[])?;
                    Key::Meta(meta)
                }
                _ => return self.conflict(row_num, field, target, name, &clean),
            }
        };

        self.attach_ids(target, key, &clean)?;
        let entry = self.dict_mut(target).get_mut(&key).unwrap();
        if entry.title.is_empty() && !name.is_empty() {
            entry.title = name.to_string();
        }
        Ok(key)
    }

    /// Known-meta path: use the working entry or pull it from the store.
    /// None when the store has never heard of this meta.
    fn adopt_meta(
        &mut self,
        target: Target,
        meta: MetaNum,
        name: &str,
        clean: &[String],
    ) -> Result<Option<Key>, StoreError> {
        let key = Key::Meta(meta);
        if !self.dict(target).contains_key(&key) {
            let (stored_name, stored_ids, exists) = match target {
                Target::Br => self.finder.retrieve_br_from_meta(meta)?,
                Target::Ra { .. } => self.finder.retrieve_ra_from_meta(meta)?,
            };
            if !exists {
                return Ok(None);
            }
            self.dict_mut(target).insert(key, EntityEntry::named(&stored_name));
            self.preexisting.insert(key.label(target.kind()));
            for (id_label, literal) in stored_ids {
                let id_meta = id_label
                    .strip_prefix("id/")
                    .and_then(|m| m.parse::<MetaNum>().ok());
                self.attach_known_id(target, key, &literal, id_meta)?;
            }
        }
        self.attach_ids(target, key, clean)?;
        let entry = self.dict_mut(target).get_mut(&key).unwrap();
        if entry.title.is_empty() && !name.is_empty() {
            entry.title = name.to_string();
        }
        Ok(Some(key))
    }

    fn attach_ids(&mut self, target: Target, key: Key, literals: &[String]) -> Result<(), StoreError> {
        for literal in literals {
            self.attach_known_id(target, key, literal, None)?;
        }
        Ok(())
    }

    pub(crate) fn attach_known_id(
        &mut self,
        target: Target,
        key: Key,
        literal: &str,
        id_meta: Option<MetaNum>,
    ) -> Result<(), StoreError> {
        let id_key = match (self.idmap_mut(target).get(literal).copied(), id_meta) {
            (Some(Key::Wannabe(_)), Some(m)) => Key::Meta(m),
            (Some(existing), _) => existing,
            (None, Some(m)) => Key::Meta(m),
            (None, None) => match self.stored_id_meta(literal)? {
                Some(m) => Key::Meta(m),
                None => self.new_wannabe(),
            },
        };
        self.idmap_mut(target).insert(literal.to_string(), id_key);
        if let Some(entry) = self.dict_mut(target).get_mut(&key) {
            entry.add_id(literal);
        } else if let Some(entry) = self.conflict_dict_mut(target).get_mut(&key) {
            entry.add_id(literal);
        }
        Ok(())
    }

    /// The store may hold an id entity no br or ra references yet; its
    /// meta still has to be reused rather than re-minted.
    fn stored_id_meta(&mut self, literal: &str) -> Result<Option<MetaNum>, StoreError> {
        match literal.split_once(':') {
            Some((scheme, value)) => self.finder.retrieve_metaid_from_id(scheme, value),
            None => Ok(None),
        }
    }

    fn store_metas_for(
        &mut self,
        target: Target,
        literals: &[String],
    ) -> Result<Vec<MetaNum>, StoreError> {
        let mut out = vec![];
        for literal in literals {
            let (scheme, value) = match literal.split_once(':') {
                Some(pair) => pair,
                None => continue,
            };
            let hits = match target {
                Target::Br => self.finder.retrieve_br_from_id(scheme, value)?,
                Target::Ra { publisher } => {
                    self.finder.retrieve_ra_from_id(scheme, value, publisher)?
                }
            };
            out.extend(hits.into_iter().map(|(m, _, _)| m));
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Two distinct metas would be joined: park the identifiers on a
    /// conflict entity instead.
    fn conflict(
        &mut self,
        row_num: usize,
        field: &str,
        target: Target,
        name: &str,
        clean: &[String],
    ) -> Result<Key, StoreError> {
        let key = self.new_wannabe();
        self.conflict_dict_mut(target)
            .insert(key, EntityEntry::named(name));
        for literal in clean {
            self.attach_known_id(target, key, literal, None)?;
        }
        self.log.add(
            row_num,
            field,
            format!("Conflict entity: {}", key.label(target.kind())),
        );
        Ok(key)
    }

    // ------------------------------------------------------------------
    // finalisation

    /// Allocate metas for every wannabe, rewrite all references, and
    /// prepend the synthetic meta identifier to each entry.
    fn meta_maker(&mut self) {
        let mut label_subst: HashMap<String, String> = HashMap::new();

        let br_subst = promote(&mut self.brdict, EntityKind::Br, self.counter, &mut label_subst);
        let ra_subst = promote(&mut self.radict, EntityKind::Ra, self.counter, &mut label_subst);

        // pre-existing entries carry their synthetic meta token too
        for (kind, dict) in [
            (EntityKind::Br, &mut self.brdict),
            (EntityKind::Ra, &mut self.radict),
        ] {
            for (key, entry) in dict.iter_mut() {
                let token = format!("meta:{}", key.label(kind));
                if !entry.ids.first().map(|i| i == &token).unwrap_or(false) {
                    entry.ids.retain(|i| i != &token);
                    entry.ids.insert(0, token);
                }
            }
        }

        for idmap in [&mut self.idmap_br, &mut self.idmap_ra] {
            let mut promoted: HashMap<Key, Key> = HashMap::new();
            for id_key in idmap.values_mut() {
                if let Key::Wannabe(_) = id_key {
                    let new = *promoted
                        .entry(*id_key)
                        .or_insert_with(|| Key::Meta(self.counter.next(EntityKind::Id)));
                    *id_key = new;
                }
            }
        }

        for slot in self.rows.iter_mut() {
            slot.br = chase(&self.brdict, &br_subst, slot.br);
            slot.venue = slot.venue.map(|k| chase(&self.brdict, &br_subst, k));
            slot.container = slot.container.map(|k| chase(&self.brdict, &br_subst, k));
        }
        self.vvi.remap(|k| chase(&self.brdict, &br_subst, k));

        let mut ar_chains: Vec<(Key, HashMap<RoleKind, Vec<(Key, Key)>>)> =
            self.ardict.drain().collect();
        for (br_key, roles) in ar_chains.iter_mut() {
            *br_key = chase(&self.brdict, &br_subst, *br_key);
            for chain in roles.values_mut() {
                for (ar, ra) in chain.iter_mut() {
                    if let Key::Wannabe(_) = ar {
                        *ar = Key::Meta(self.counter.next(EntityKind::Ar));
                    }
                    *ra = chase(&self.radict, &ra_subst, *ra);
                }
            }
        }
        self.ardict = ar_chains.into_iter().collect();
        self.re_table = self
            .re_table
            .iter()
            .map(|(k, m)| (chase(&self.brdict, &br_subst, *k), *m))
            .collect();

        self.log.remap(&label_subst);
    }

    /// Rewrite each row's fields as canonical strings from the final
    /// dictionaries, and allocate embodiments for paged rows.
    fn enrich(&mut self) -> Result<(), StoreError> {
        for idx in 0..self.rows.len() {
            let br_key = self.rows[idx].br;
            let entry = match self.brdict.get(&br_key) {
                Some(e) => e.clone(),
                None => continue,
            };
            if !entry.title.is_empty() {
                self.rows[idx].row.title = entry.title.clone();
            }
            self.rows[idx].row.id = entry.ids.join(" ");

            if let Some(venue_key) = self.rows[idx].venue {
                if let Some(venue_entry) = self.brdict.get(&venue_key) {
                    self.rows[idx].row.venue =
                        format!("{} [{}]", venue_entry.title, venue_entry.ids.join(" "));
                }
            }

            for role in [RoleKind::Author, RoleKind::Editor, RoleKind::Publisher] {
                let chain = self
                    .ardict
                    .get(&br_key)
                    .and_then(|roles| roles.get(&role))
                    .cloned()
                    .unwrap_or_default();
                if chain.is_empty() {
                    continue;
                }
                let mut parts = vec![];
                for (_, ra_key) in &chain {
                    if let Some(ra) = self.radict.get(ra_key) {
                        parts.push(format!("{} [{}]", ra.title, ra.ids.join(" ")));
                    }
                }
                let value = parts.join("; ");
                match role {
                    RoleKind::Author => self.rows[idx].row.author = value,
                    RoleKind::Editor => self.rows[idx].row.editor = value,
                    RoleKind::Publisher => self.rows[idx].row.publisher = value,
                }
            }

            if !self.rows[idx].row.page.is_empty()
                && !self.re_table.iter().any(|(k, _)| *k == br_key)
            {
                let re_meta = match br_key.meta() {
                    Some(meta) if self.preexisting.contains(&br_key.label(EntityKind::Br)) => {
                        match self.finder.retrieve_re_from_br_meta(meta)? {
                            Some((re_meta, _)) => re_meta,
                            None => self.counter.next(EntityKind::Re),
                        }
                    }
                    _ => self.counter.next(EntityKind::Re),
                };
                self.re_table.push((br_key, re_meta));
            }
        }
        Ok(())
    }

    fn dedup_rows(&mut self) {
        let mut seen: HashSet<String> = HashSet::new();
        self.rows.retain(|slot| seen.insert(slot.row.id.clone()));
    }
}

/// Union the victim into the survivor and leave a trace in `others`.
/// Safe to call twice: an absent victim is a no-op.
pub(crate) fn merge_entries(
    dict: &mut HashMap<Key, EntityEntry>,
    survivor: Key,
    victim: Key,
) {
    if survivor == victim {
        return;
    }
    let victim_entry = match dict.remove(&victim) {
        Some(e) => e,
        None => return,
    };
    let entry = dict.entry(survivor).or_default();
    for id in victim_entry.ids {
        entry.add_id(&id);
    }
    entry.others.extend(victim_entry.others);
    entry.others.insert(victim);
    if entry.title.is_empty() {
        entry.title = victim_entry.title;
    }
}

/// Follow `others` traces to whatever key absorbed this one.
pub(crate) fn resolve(dict: &HashMap<Key, EntityEntry>, key: Key) -> Key {
    if dict.contains_key(&key) {
        return key;
    }
    for (k, e) in dict {
        if e.others.contains(&key) {
            return *k;
        }
    }
    key
}

fn chase(dict: &HashMap<Key, EntityEntry>, subst: &HashMap<Key, Key>, key: Key) -> Key {
    let resolved = resolve(dict, key);
    subst.get(&resolved).copied().unwrap_or(resolved)
}

/// Move every wannabe entry of a dictionary to a fresh meta key.
fn promote(
    dict: &mut HashMap<Key, EntityEntry>,
    kind: EntityKind,
    counter: &dyn CounterService,
    label_subst: &mut HashMap<String, String>,
) -> HashMap<Key, Key> {
    let mut wannabes: Vec<Key> = dict
        .keys()
        .filter(|k| !k.is_meta())
        .copied()
        .collect();
    wannabes.sort();
    let mut subst = HashMap::new();
    for old in wannabes {
        let meta = counter.next(kind);
        let new = Key::Meta(meta);
        let mut entry = dict.remove(&old).unwrap();
        entry.others.insert(old);
        entry.ids.insert(0, format!("meta:{}/{}", kind.code(), meta));
        dict.insert(new, entry);
        subst.insert(old, new);
        label_subst.insert(old.label(kind), new.label(kind));
    }
    subst
}

/// §id-list normalisation: strip meta tokens (all of them when
/// ambiguous), hyphen-normalise the rest, split into scheme:value.
fn normalize_id_list(raw: &[String], kind: EntityKind) -> (Vec<String>, Option<MetaNum>) {
    let tokens: Vec<String> = raw
        .iter()
        .map(|t| normalize_hyphens(t.trim()))
        .filter(|t| !t.is_empty())
        .collect();
    let meta_tokens = tokens
        .iter()
        .filter(|t| parse_omid_token(t).is_some())
        .count();
    let mut clean = vec![];
    let mut metaval = None;
    for token in tokens {
        if let Some((k, m)) = parse_omid_token(&token) {
            if meta_tokens == 1 && k == kind {
                metaval = Some(m);
            }
            continue;
        }
        if let Some((scheme, value)) = token.split_once(':') {
            if scheme.is_empty() || value.is_empty() {
                continue;
            }
            let scheme = scheme.to_lowercase();
            if !is_known_scheme(&scheme) {
                continue;
            }
            let id = format!("{}:{}", scheme, value);
            if !clean.iter().any(|c| *c == id) {
                clean.push(id);
            }
        }
    }
    (clean, metaval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::MemCounter;
    use crate::store::DumpStore;

    fn empty_curator(counter: &MemCounter) -> Curator<'_> {
        Curator::new(
            ResourceFinder::new(Box::new(DumpStore::empty())),
            counter,
        )
    }

    #[test]
    fn normalize_strips_ambiguous_meta() {
        let raw = vec!["meta:br/1".to_string(), "meta:br/2".to_string()];
        let (clean, metaval) = normalize_id_list(&raw, EntityKind::Br);
        assert!(clean.is_empty());
        assert_eq!(metaval, None);

        let raw = vec!["meta:br/1".to_string(), "DOI:10.1/A".to_string()];
        let (clean, metaval) = normalize_id_list(&raw, EntityKind::Br);
        assert_eq!(clean, vec!["doi:10.1/A"]);
        assert_eq!(metaval, Some(1));
    }

    #[test]
    fn normalize_drops_unknown_scheme() {
        let raw = vec!["doi:10.1/a".to_string(), "madeup:77".to_string()];
        let (clean, _) = normalize_id_list(&raw, EntityKind::Br);
        assert_eq!(clean, vec!["doi:10.1/a"]);
    }

    #[test]
    fn normalize_drops_foreign_kind_meta() {
        let raw = vec!["meta:ra/9".to_string()];
        let (clean, metaval) = normalize_id_list(&raw, EntityKind::Br);
        assert!(clean.is_empty());
        assert_eq!(metaval, None);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut dict = HashMap::new();
        dict.insert(Key::Wannabe(0), {
            let mut e = EntityEntry::named("X");
            e.add_id("doi:10.1/a");
            e
        });
        dict.insert(Key::Wannabe(1), {
            let mut e = EntityEntry::named("");
            e.add_id("isbn:1");
            e
        });
        merge_entries(&mut dict, Key::Wannabe(0), Key::Wannabe(1));
        merge_entries(&mut dict, Key::Wannabe(0), Key::Wannabe(1));
        assert_eq!(dict.len(), 1);
        let e = &dict[&Key::Wannabe(0)];
        assert_eq!(e.ids, vec!["doi:10.1/a", "isbn:1"]);
        assert!(e.others.contains(&Key::Wannabe(1)));
        assert_eq!(e.title, "X");
    }

    #[test]
    fn id_worker_reuses_local_wannabe() {
        let counter = MemCounter::new();
        let mut c = empty_curator(&counter);
        let k1 = c
            .id_worker(0, "id", Target::Br, "X", &["doi:10.1/a".to_string()])
            .unwrap();
        let k2 = c
            .id_worker(
                1,
                "id",
                Target::Br,
                "X",
                &["doi:10.1/a".to_string(), "isbn:1".to_string()],
            )
            .unwrap();
        assert_eq!(k1, k2);
        assert_eq!(c.brdict[&k1].ids, vec!["doi:10.1/a", "isbn:1"]);
    }

    #[test]
    fn id_worker_empty_ids_makes_wannabe() {
        let counter = MemCounter::new();
        let mut c = empty_curator(&counter);
        let k1 = c.id_worker(0, "id", Target::Br, "X", &[]).unwrap();
        let k2 = c.id_worker(1, "id", Target::Br, "X", &[]).unwrap();
        assert_ne!(k1, k2);
        assert!(!k1.is_meta());
    }

    #[test]
    fn orphan_store_identifier_keeps_its_meta() {
        use crate::graph::{scheme_uri, Term, Triple, HAS_LITERAL_VALUE, USES_SCHEME};
        use crate::store::StoreDump;

        // id/7 exists in the store but no br references it
        let id_uri = crate::common::omid_uri(EntityKind::Id, 7);
        let dump = StoreDump {
            triples: vec![
                Triple::new(id_uri.clone(), USES_SCHEME, Term::uri(scheme_uri("doi"))),
                Triple::new(id_uri, HAS_LITERAL_VALUE, Term::lit("10.1/a")),
            ],
            ..Default::default()
        };
        let counter = MemCounter::new();
        let mut c = Curator::new(
            ResourceFinder::new(Box::new(DumpStore::from_dump(dump))),
            &counter,
        );
        c.id_worker(0, "id", Target::Br, "X", &["doi:10.1/a".to_string()])
            .unwrap();
        assert_eq!(c.idmap_br.get("doi:10.1/a"), Some(&Key::Meta(7)));
    }

    #[test]
    fn local_wannabes_with_shared_id_collapse() {
        let counter = MemCounter::new();
        let mut c = empty_curator(&counter);
        let a = c
            .id_worker(0, "id", Target::Br, "A", &["doi:10.1/a".to_string()])
            .unwrap();
        let _b = c
            .id_worker(1, "id", Target::Br, "B", &["isbn:1".to_string()])
            .unwrap();
        let j = c
            .id_worker(
                2,
                "id",
                Target::Br,
                "",
                &["doi:10.1/a".to_string(), "isbn:1".to_string()],
            )
            .unwrap();
        assert_eq!(j, a);
        assert_eq!(c.brdict.len(), 1);
        assert!(!c.brdict[&j].others.is_empty());
    }
}
