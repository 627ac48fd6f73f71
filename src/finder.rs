use hashbrown::{HashMap, HashSet};
use log::warn;

use crate::common::{omid_uri, parse_omid_uri, EntityKind, MetaNum};
use crate::error::StoreError;
use crate::graph::{
    role_uri, scheme_uri, Graph, Term, DATACITE_NS, DCTERMS_TITLE, EMBODIMENT, ENDING_PAGE,
    FAMILY_NAME, FOAF_NAME, GIVEN_NAME, HAS_IDENTIFIER, HAS_LITERAL_VALUE, HAS_NEXT, IS_DOCUMENT_CONTEXT_FOR,
    IS_HELD_BY, PART_OF, PRISM_PUB_DATE, RDF_TYPE, SEQUENCE_IDENTIFIER, STARTING_PAGE, USES_SCHEME,
    WITH_ROLE,
};
use crate::rows::{format_name, BrType};
use crate::store::{prefetch, StoreClient, DEFAULT_BATCH_SIZE, DEFAULT_DEPTH, DEFAULT_WORKERS};

/// Guard against corrupt has-next chains.
const CHAIN_ITER_CAP: usize = 10_000;

/// (identifier meta label `id/N`, `scheme:literal`)
pub type IdPair = (String, String);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BrInfo {
    pub pub_date: String,
    pub rtype: String,
    pub page: String,
    pub issue: String,
    pub volume: String,
    pub venue: String,
}

/// Venue structure as known to the store: volume number -> (volume
/// meta, issue number -> issue meta), plus issues hanging directly off
/// the venue.
#[derive(Clone, Debug, Default)]
pub struct VenueStructure {
    pub volumes: HashMap<String, (MetaNum, HashMap<String, MetaNum>)>,
    pub issues: HashMap<String, MetaNum>,
}

/// One reconstructed role-chain element.
#[derive(Clone, Debug)]
pub struct ChainLink {
    pub ar: MetaNum,
    pub ra: MetaNum,
    pub name: String,
    pub ids: Vec<IdPair>,
}

/// Read-only view over the persistent store plus a local graph cache.
pub struct ResourceFinder {
    client: Box<dyn StoreClient>,
    cache: Graph,
    fetched: HashSet<String>,
    pub workers: usize,
    pub batch_size: usize,
    pub depth: usize,
}

impl ResourceFinder {
    pub fn new(client: Box<dyn StoreClient>) -> Self {
        Self {
            client,
            cache: Graph::new(),
            fetched: HashSet::new(),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            depth: DEFAULT_DEPTH,
        }
    }

    fn ensure_cached(&mut self, uri: &str) -> Result<(), StoreError> {
        if self.fetched.contains(uri) || self.cache.has_subject(uri) {
            return Ok(());
        }
        for t in self.client.triples_for_subject(uri)? {
            self.cache.add(t);
        }
        self.fetched.insert(uri.to_string());
        Ok(())
    }

    fn objects(&mut self, s: &str, p: &str) -> Result<Vec<Term>, StoreError> {
        self.ensure_cached(s)?;
        Ok(self.cache.objects(s, p).into_iter().cloned().collect())
    }

    fn one_value(&mut self, s: &str, p: &str) -> Result<String, StoreError> {
        Ok(self
            .objects(s, p)?
            .first()
            .map(|t| t.face().to_string())
            .unwrap_or_default())
    }

    fn subjects_with(&mut self, p: &str, face: &str) -> Result<Vec<String>, StoreError> {
        let mut subs = self.client.subjects_with(p, face)?;
        subs.extend(self.cache.subjects_with(p, face));
        subs.sort();
        subs.dedup();
        Ok(subs)
    }

    /// Identifier entities matching (scheme, literal), typed or plain.
    fn id_entities(&mut self, scheme: &str, literal: &str) -> Result<Vec<String>, StoreError> {
        let wanted_scheme = scheme_uri(scheme);
        let mut out = vec![];
        for id_uri in self.subjects_with(HAS_LITERAL_VALUE, literal)? {
            if !matches!(parse_omid_uri(&id_uri), Some((EntityKind::Id, _))) {
                continue;
            }
            let schemes = self.objects(&id_uri, USES_SCHEME)?;
            if schemes.iter().any(|t| t.face() == wanted_scheme) {
                out.push(id_uri);
            }
        }
        Ok(out)
    }

    /// All identifiers attached to an entity, as (id meta, scheme:literal).
    fn ids_of(&mut self, uri: &str) -> Result<Vec<IdPair>, StoreError> {
        let mut out = vec![];
        for id_term in self.objects(uri, HAS_IDENTIFIER)? {
            let id_uri = match id_term.as_uri() {
                Some(u) => u.to_string(),
                None => continue,
            };
            let meta = match parse_omid_uri(&id_uri) {
                Some((EntityKind::Id, m)) => m,
                _ => continue,
            };
            let scheme = self
                .one_value(&id_uri, USES_SCHEME)?
                .strip_prefix(DATACITE_NS)
                .unwrap_or_default()
                .to_string();
            let literal = self.one_value(&id_uri, HAS_LITERAL_VALUE)?;
            if scheme.is_empty() || literal.is_empty() {
                continue;
            }
            out.push((format!("id/{}", meta), format!("{}:{}", scheme, literal)));
        }
        Ok(out)
    }

    fn entities_holding_id(
        &mut self,
        id_uri: &str,
        kind: EntityKind,
    ) -> Result<Vec<MetaNum>, StoreError> {
        let mut out = vec![];
        for s in self.subjects_with(HAS_IDENTIFIER, id_uri)? {
            if let Some((k, m)) = parse_omid_uri(&s) {
                if k == kind {
                    out.push(m);
                }
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    pub fn retrieve_br_from_id(
        &mut self,
        scheme: &str,
        literal: &str,
    ) -> Result<Vec<(MetaNum, String, Vec<IdPair>)>, StoreError> {
        self.retrieve_entity_from_id(scheme, literal, EntityKind::Br)
    }

    pub fn retrieve_ra_from_id(
        &mut self,
        scheme: &str,
        literal: &str,
        _is_publisher: bool,
    ) -> Result<Vec<(MetaNum, String, Vec<IdPair>)>, StoreError> {
        self.retrieve_entity_from_id(scheme, literal, EntityKind::Ra)
    }

    fn retrieve_entity_from_id(
        &mut self,
        scheme: &str,
        literal: &str,
        kind: EntityKind,
    ) -> Result<Vec<(MetaNum, String, Vec<IdPair>)>, StoreError> {
        let mut metas = vec![];
        for id_uri in self.id_entities(scheme, literal)? {
            metas.extend(self.entities_holding_id(&id_uri, kind)?);
        }
        metas.sort();
        metas.dedup();
        let mut out = vec![];
        for meta in metas {
            let uri = omid_uri(kind, meta);
            let name = match kind {
                EntityKind::Br => self.one_value(&uri, DCTERMS_TITLE)?,
                _ => self.agent_name(&uri)?,
            };
            let ids = self.ids_of(&uri)?;
            out.push((meta, name, ids));
        }
        Ok(out)
    }

    pub fn retrieve_br_from_meta(
        &mut self,
        meta: MetaNum,
    ) -> Result<(String, Vec<IdPair>, bool), StoreError> {
        let uri = omid_uri(EntityKind::Br, meta);
        self.ensure_cached(&uri)?;
        let exists = self.cache.has_subject(&uri) || self.client.has_subject(&uri)?;
        if !exists {
            return Ok((String::new(), vec![], false));
        }
        let title = self.one_value(&uri, DCTERMS_TITLE)?;
        let ids = self.ids_of(&uri)?;
        Ok((title, ids, true))
    }

    pub fn retrieve_ra_from_meta(
        &mut self,
        meta: MetaNum,
    ) -> Result<(String, Vec<IdPair>, bool), StoreError> {
        let uri = omid_uri(EntityKind::Ra, meta);
        self.ensure_cached(&uri)?;
        let exists = self.cache.has_subject(&uri) || self.client.has_subject(&uri)?;
        if !exists {
            return Ok((String::new(), vec![], false));
        }
        let name = self.agent_name(&uri)?;
        let ids = self.ids_of(&uri)?;
        Ok((name, ids, true))
    }

    fn agent_name(&mut self, uri: &str) -> Result<String, StoreError> {
        let given = self.one_value(uri, GIVEN_NAME)?;
        let family = self.one_value(uri, FAMILY_NAME)?;
        let name = self.one_value(uri, FOAF_NAME)?;
        Ok(format_name(&given, &family, &name))
    }

    /// Meta of the identifier entity itself, if the literal is known.
    pub fn retrieve_metaid_from_id(
        &mut self,
        scheme: &str,
        literal: &str,
    ) -> Result<Option<MetaNum>, StoreError> {
        let ids = self.id_entities(scheme, literal)?;
        Ok(ids
            .first()
            .and_then(|u| parse_omid_uri(u))
            .map(|(_, m)| m))
    }

    /// Redirect for an entity merged away: its penultimate provenance
    /// snapshot names the surviving entity it was folded into.
    pub fn retrieve_metaid_from_merged_entity(
        &mut self,
        kind: EntityKind,
        meta: MetaNum,
    ) -> Result<Option<MetaNum>, StoreError> {
        let uri = omid_uri(kind, meta);
        let chain = self.client.prov_chain(&uri)?;
        if chain.len() < 2 {
            return Ok(None);
        }
        let penultimate = &chain[chain.len() - 2];
        for derived in &penultimate.derived_from {
            if derived == &uri {
                continue;
            }
            if let Some((k, m)) = parse_omid_uri(derived) {
                if k == kind && self.client.has_subject(derived)? {
                    return Ok(Some(m));
                }
            }
        }
        Ok(None)
    }

    /// The ordered contributor chain of a br for one role kind. Cycles
    /// and blown caps yield an empty chain and a warning.
    pub fn retrieve_ra_sequence_from_br_meta(
        &mut self,
        br_meta: MetaNum,
        role: &str,
    ) -> Result<Vec<ChainLink>, StoreError> {
        let br_uri = omid_uri(EntityKind::Br, br_meta);
        let wanted_role = role_uri(role);

        let mut ars: Vec<MetaNum> = vec![];
        for term in self.objects(&br_uri, IS_DOCUMENT_CONTEXT_FOR)? {
            let ar_uri = match term.as_uri() {
                Some(u) => u.to_string(),
                None => continue,
            };
            let meta = match parse_omid_uri(&ar_uri) {
                Some((EntityKind::Ar, m)) => m,
                _ => continue,
            };
            let roles = self.objects(&ar_uri, WITH_ROLE)?;
            if roles.iter().any(|t| t.face() == wanted_role) {
                ars.push(meta);
            }
        }
        ars.sort();
        ars.dedup();
        if ars.is_empty() {
            return Ok(vec![]);
        }

        let ar_set: HashSet<MetaNum> = ars.iter().cloned().collect();
        let mut next: HashMap<MetaNum, MetaNum> = HashMap::new();
        let mut referenced: HashSet<MetaNum> = HashSet::new();
        for ar in &ars {
            let ar_uri = omid_uri(EntityKind::Ar, *ar);
            if let Some(n) = self
                .objects(&ar_uri, HAS_NEXT)?
                .first()
                .and_then(|t| t.as_uri())
                .and_then(parse_omid_uri)
                .and_then(|(k, m)| (k == EntityKind::Ar && ar_set.contains(&m)).then_some(m))
            {
                next.insert(*ar, n);
                referenced.insert(n);
            }
        }

        let starts: Vec<MetaNum> = ars
            .iter()
            .filter(|a| !referenced.contains(*a))
            .cloned()
            .collect();
        if starts.is_empty() {
            warn!(
                "role chain on br/{} ({}) has no start: cycle in store data",
                br_meta, role
            );
            return Ok(vec![]);
        }
        if starts.len() > 1 {
            warn!(
                "role chain on br/{} ({}) has {} heads, keeping the best",
                br_meta,
                role,
                starts.len()
            );
        }

        let mut best: Vec<MetaNum> = vec![];
        for start in starts {
            match self.walk_chain(start, &next) {
                Some(chain) => {
                    // longest wins; ties go to the lexicographically
                    // smallest ar sequence, so the smallest head
                    if chain.len() > best.len() || (chain.len() == best.len() && chain < best) {
                        best = chain;
                    }
                }
                None => {
                    warn!("role chain on br/{} ({}) blew the iteration cap", br_meta, role);
                    return Ok(vec![]);
                }
            }
        }

        let mut out = vec![];
        for ar in best {
            let ar_uri = omid_uri(EntityKind::Ar, ar);
            let ra = match self
                .objects(&ar_uri, IS_HELD_BY)?
                .first()
                .and_then(|t| t.as_uri())
                .and_then(parse_omid_uri)
            {
                Some((EntityKind::Ra, m)) => m,
                _ => {
                    warn!("ar/{} has no held-by agent, skipping", ar);
                    continue;
                }
            };
            let (name, ids, _) = self.retrieve_ra_from_meta(ra)?;
            out.push(ChainLink { ar, ra, name, ids });
        }
        Ok(out)
    }

    fn walk_chain(&self, start: MetaNum, next: &HashMap<MetaNum, MetaNum>) -> Option<Vec<MetaNum>> {
        let mut chain = vec![start];
        let mut seen: HashSet<MetaNum> = HashSet::new();
        seen.insert(start);
        let mut cur = start;
        let mut iters = 0usize;
        while let Some(n) = next.get(&cur) {
            iters += 1;
            if iters > CHAIN_ITER_CAP || !seen.insert(*n) {
                return None;
            }
            chain.push(*n);
            cur = *n;
        }
        Some(chain)
    }

    /// Page range of the br's embodiment, single bounds duplicated.
    pub fn retrieve_re_from_br_meta(
        &mut self,
        br_meta: MetaNum,
    ) -> Result<Option<(MetaNum, String)>, StoreError> {
        let br_uri = omid_uri(EntityKind::Br, br_meta);
        let re_meta = match self
            .objects(&br_uri, EMBODIMENT)?
            .first()
            .and_then(|t| t.as_uri())
            .and_then(parse_omid_uri)
        {
            Some((EntityKind::Re, m)) => m,
            _ => return Ok(None),
        };
        let re_uri = omid_uri(EntityKind::Re, re_meta);
        let start = self.one_value(&re_uri, STARTING_PAGE)?;
        let end = self.one_value(&re_uri, ENDING_PAGE)?;
        let range = match (start.is_empty(), end.is_empty()) {
            (true, true) => return Ok(None),
            (false, true) => format!("{}-{}", start, start),
            (true, false) => format!("{}-{}", end, end),
            (false, false) => format!("{}-{}", start, end),
        };
        Ok(Some((re_meta, range)))
    }

    pub fn retrieve_br_info_from_meta(&mut self, br_meta: MetaNum) -> Result<BrInfo, StoreError> {
        let br_uri = omid_uri(EntityKind::Br, br_meta);
        let mut info = BrInfo {
            pub_date: self.one_value(&br_uri, PRISM_PUB_DATE)?,
            rtype: self.br_type(&br_uri)?,
            ..Default::default()
        };
        if let Some((_, range)) = self.retrieve_re_from_br_meta(br_meta)? {
            info.page = range;
        }

        // walk the containment chain: issue -> volume -> venue
        let mut cur = self.part_of(&br_uri)?;
        let mut hops = 0;
        while let Some(uri) = cur {
            hops += 1;
            if hops > 3 {
                break;
            }
            match BrType::from_label(&self.br_type(&uri)?) {
                Some(BrType::JournalIssue) => {
                    info.issue = self.one_value(&uri, SEQUENCE_IDENTIFIER)?;
                    cur = self.part_of(&uri)?;
                }
                Some(BrType::JournalVolume) => {
                    info.volume = self.one_value(&uri, SEQUENCE_IDENTIFIER)?;
                    cur = self.part_of(&uri)?;
                }
                _ => {
                    info.venue = self.format_venue(&uri)?;
                    break;
                }
            }
        }
        Ok(info)
    }

    fn br_type(&mut self, uri: &str) -> Result<String, StoreError> {
        for t in self.objects(uri, RDF_TYPE)? {
            if let Some(bt) = t.as_uri().and_then(BrType::from_class_uri) {
                return Ok(bt.label().to_string());
            }
        }
        Ok(String::new())
    }

    fn part_of(&mut self, uri: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .objects(uri, PART_OF)?
            .first()
            .and_then(|t| t.as_uri())
            .map(|u| u.to_string()))
    }

    /// `Title [omid:br/N scheme:literal ...]`
    fn format_venue(&mut self, uri: &str) -> Result<String, StoreError> {
        let title = self.one_value(uri, DCTERMS_TITLE)?;
        let meta = parse_omid_uri(uri).map(|(_, m)| m).unwrap_or_default();
        let mut tokens = vec![format!("omid:br/{}", meta)];
        tokens.extend(self.ids_of(uri)?.into_iter().map(|(_, lit)| lit));
        Ok(format!("{} [{}]", title, tokens.join(" ")))
    }

    pub fn retrieve_venue_from_meta(
        &mut self,
        venue_meta: MetaNum,
    ) -> Result<VenueStructure, StoreError> {
        let venue_uri = omid_uri(EntityKind::Br, venue_meta);
        let mut out = VenueStructure::default();
        for child in self.subjects_with(PART_OF, &venue_uri)? {
            let child_meta = match parse_omid_uri(&child) {
                Some((EntityKind::Br, m)) => m,
                _ => continue,
            };
            let seq = self.one_value(&child, SEQUENCE_IDENTIFIER)?;
            if seq.is_empty() {
                continue;
            }
            match BrType::from_label(&self.br_type(&child)?) {
                Some(BrType::JournalVolume) => {
                    let mut issues = HashMap::new();
                    for grandchild in self.subjects_with(PART_OF, &child)? {
                        let gc_meta = match parse_omid_uri(&grandchild) {
                            Some((EntityKind::Br, m)) => m,
                            _ => continue,
                        };
                        if BrType::from_label(&self.br_type(&grandchild)?)
                            != Some(BrType::JournalIssue)
                        {
                            continue;
                        }
                        let gseq = self.one_value(&grandchild, SEQUENCE_IDENTIFIER)?;
                        if !gseq.is_empty() {
                            issues.insert(gseq, gc_meta);
                        }
                    }
                    out.volumes.insert(seq, (child_meta, issues));
                }
                Some(BrType::JournalIssue) => {
                    out.issues.insert(seq, child_meta);
                }
                _ => {}
            }
        }
        Ok(out)
    }

    /// Bulk pre-fetch of everything the batch will touch.
    pub fn get_everything_about_res(
        &mut self,
        metavals: &[(EntityKind, MetaNum)],
        identifiers: &[(String, String)],
        vvis: &[MetaNum],
    ) -> Result<(), StoreError> {
        let mut seeds: Vec<String> = vec![];
        for (kind, meta) in metavals {
            seeds.push(omid_uri(*kind, *meta));
        }
        for (scheme, literal) in identifiers {
            for id_uri in self.id_entities(scheme, literal)? {
                seeds.extend(self.client.subjects_with(HAS_IDENTIFIER, &id_uri)?);
                seeds.push(id_uri);
            }
        }
        for venue_meta in vvis {
            let venue_uri = omid_uri(EntityKind::Br, *venue_meta);
            seeds.extend(self.client.subjects_with(PART_OF, &venue_uri)?);
            seeds.push(venue_uri);
        }
        seeds.sort();
        seeds.dedup();
        prefetch(
            self.client.as_ref(),
            seeds,
            &mut self.cache,
            self.workers,
            self.batch_size,
            self.depth,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Triple;
    use crate::store::{DumpStore, ProvSnapshot, StoreDump};

    fn id_triples(n: MetaNum, scheme: &str, literal: &str) -> Vec<Triple> {
        let uri = omid_uri(EntityKind::Id, n);
        vec![
            Triple::new(uri.clone(), USES_SCHEME, Term::uri(scheme_uri(scheme))),
            Triple::new(uri, HAS_LITERAL_VALUE, Term::lit(literal)),
        ]
    }

    fn finder_over(triples: Vec<Triple>) -> ResourceFinder {
        ResourceFinder::new(Box::new(DumpStore::from_dump(StoreDump {
            triples,
            prov: HashMap::new(),
        })))
    }

    #[test]
    fn br_lookup_by_id() {
        let br = omid_uri(EntityKind::Br, 100);
        let mut triples = id_triples(1, "doi", "10.1/a");
        triples.push(Triple::new(
            br.clone(),
            HAS_IDENTIFIER,
            Term::uri(omid_uri(EntityKind::Id, 1)),
        ));
        triples.push(Triple::new(br, DCTERMS_TITLE, Term::lit("X")));
        let mut finder = finder_over(triples);

        let hits = finder.retrieve_br_from_id("doi", "10.1/a").unwrap();
        assert_eq!(hits.len(), 1);
        let (meta, title, ids) = &hits[0];
        assert_eq!(*meta, 100);
        assert_eq!(title, "X");
        assert_eq!(ids[0], ("id/1".to_string(), "doi:10.1/a".to_string()));

        assert!(finder.retrieve_br_from_id("doi", "10.1/b").unwrap().is_empty());
        assert!(finder.retrieve_br_from_id("isbn", "10.1/a").unwrap().is_empty());
    }

    #[test]
    fn ra_name_formatting() {
        let ra = omid_uri(EntityKind::Ra, 7);
        let mut finder = finder_over(vec![
            Triple::new(ra.clone(), FAMILY_NAME, Term::lit("Smith")),
            Triple::new(ra, GIVEN_NAME, Term::lit("Alice")),
        ]);
        let (name, _, exists) = finder.retrieve_ra_from_meta(7).unwrap();
        assert!(exists);
        assert_eq!(name, "Smith, Alice");
        let (_, _, exists) = finder.retrieve_ra_from_meta(8).unwrap();
        assert!(!exists);
    }

    fn ar_triples(br: MetaNum, ar: MetaNum, ra: MetaNum, next: Option<MetaNum>) -> Vec<Triple> {
        let ar_uri = omid_uri(EntityKind::Ar, ar);
        let mut out = vec![
            Triple::new(
                omid_uri(EntityKind::Br, br),
                IS_DOCUMENT_CONTEXT_FOR,
                Term::uri(ar_uri.clone()),
            ),
            Triple::new(ar_uri.clone(), WITH_ROLE, Term::uri(role_uri("author"))),
            Triple::new(
                ar_uri.clone(),
                IS_HELD_BY,
                Term::uri(omid_uri(EntityKind::Ra, ra)),
            ),
            Triple::new(
                omid_uri(EntityKind::Ra, ra),
                FOAF_NAME,
                Term::lit(format!("Agent {}", ra)),
            ),
        ];
        if let Some(n) = next {
            out.push(Triple::new(
                ar_uri,
                HAS_NEXT,
                Term::uri(omid_uri(EntityKind::Ar, n)),
            ));
        }
        out
    }

    #[test]
    fn chain_reconstruction_in_order() {
        let mut triples = ar_triples(10, 1, 21, Some(2));
        triples.extend(ar_triples(10, 2, 22, Some(3)));
        triples.extend(ar_triples(10, 3, 23, None));
        let mut finder = finder_over(triples);
        let chain = finder.retrieve_ra_sequence_from_br_meta(10, "author").unwrap();
        assert_eq!(
            chain.iter().map(|l| (l.ar, l.ra)).collect::<Vec<_>>(),
            vec![(1, 21), (2, 22), (3, 23)]
        );
    }

    #[test]
    fn chain_cycle_returns_empty() {
        let mut triples = ar_triples(10, 1, 21, Some(2));
        triples.extend(ar_triples(10, 2, 22, Some(3)));
        triples.extend(ar_triples(10, 3, 23, Some(1)));
        let mut finder = finder_over(triples);
        let chain = finder.retrieve_ra_sequence_from_br_meta(10, "author").unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn forked_chain_picks_longest_then_smallest_start() {
        // two heads: 5 -> 3 and 1 -> 3; equal length, head 1 wins
        let mut triples = ar_triples(10, 5, 25, Some(3));
        triples.extend(ar_triples(10, 1, 21, Some(3)));
        triples.extend(ar_triples(10, 3, 23, None));
        let mut finder = finder_over(triples);
        let chain = finder.retrieve_ra_sequence_from_br_meta(10, "author").unwrap();
        assert_eq!(chain.iter().map(|l| l.ar).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn re_single_bound_duplicated() {
        let br = omid_uri(EntityKind::Br, 4);
        let re = omid_uri(EntityKind::Re, 9);
        let mut finder = finder_over(vec![
            Triple::new(br, EMBODIMENT, Term::uri(re.clone())),
            Triple::new(re, STARTING_PAGE, Term::lit("33")),
        ]);
        let (re_meta, range) = finder.retrieve_re_from_br_meta(4).unwrap().unwrap();
        assert_eq!(re_meta, 9);
        assert_eq!(range, "33-33");
    }

    #[test]
    fn merged_entity_redirect() {
        let old = omid_uri(EntityKind::Ra, 50);
        let new = omid_uri(EntityKind::Ra, 60);
        let mut prov = HashMap::new();
        prov.insert(
            old.clone(),
            vec![
                ProvSnapshot {
                    derived_from: vec![new.clone()],
                },
                ProvSnapshot::default(),
            ],
        );
        let mut finder = ResourceFinder::new(Box::new(DumpStore::from_dump(StoreDump {
            triples: vec![Triple::new(new, FOAF_NAME, Term::lit("Survivor"))],
            prov,
        })));
        assert_eq!(
            finder
                .retrieve_metaid_from_merged_entity(EntityKind::Ra, 50)
                .unwrap(),
            Some(60)
        );
        assert_eq!(
            finder
                .retrieve_metaid_from_merged_entity(EntityKind::Ra, 99)
                .unwrap(),
            None
        );
    }

    #[test]
    fn venue_structure() {
        let venue = omid_uri(EntityKind::Br, 1);
        let vol = omid_uri(EntityKind::Br, 2);
        let iss = omid_uri(EntityKind::Br, 3);
        let direct_iss = omid_uri(EntityKind::Br, 4);
        let triples = vec![
            Triple::new(vol.clone(), PART_OF, Term::uri(venue.clone())),
            Triple::new(
                vol.clone(),
                RDF_TYPE,
                Term::uri(BrType::JournalVolume.class_uri()),
            ),
            Triple::new(vol.clone(), SEQUENCE_IDENTIFIER, Term::lit("10")),
            Triple::new(iss.clone(), PART_OF, Term::uri(vol)),
            Triple::new(
                iss.clone(),
                RDF_TYPE,
                Term::uri(BrType::JournalIssue.class_uri()),
            ),
            Triple::new(iss, SEQUENCE_IDENTIFIER, Term::lit("4")),
            Triple::new(direct_iss.clone(), PART_OF, Term::uri(venue)),
            Triple::new(
                direct_iss.clone(),
                RDF_TYPE,
                Term::uri(BrType::JournalIssue.class_uri()),
            ),
            Triple::new(direct_iss, SEQUENCE_IDENTIFIER, Term::lit("7")),
        ];
        let mut finder = finder_over(triples);
        let vs = finder.retrieve_venue_from_meta(1).unwrap();
        let (vol_meta, vol_issues) = vs.volumes.get("10").unwrap();
        assert_eq!(*vol_meta, 2);
        assert_eq!(vol_issues.get("4"), Some(&3));
        assert_eq!(vs.issues.get("7"), Some(&4));
    }
}
