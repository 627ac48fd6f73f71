use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const DCTERMS_TITLE: &str = "http://purl.org/dc/terms/title";
pub const PRISM_PUB_DATE: &str =
    "http://prismstandard.org/namespaces/basic/2.0/publicationDate";
pub const STARTING_PAGE: &str = "http://prismstandard.org/namespaces/basic/2.0/startingPage";
pub const ENDING_PAGE: &str = "http://prismstandard.org/namespaces/basic/2.0/endingPage";
pub const HAS_IDENTIFIER: &str = "http://purl.org/spar/datacite/hasIdentifier";
pub const USES_SCHEME: &str = "http://purl.org/spar/datacite/usesIdentifierScheme";
pub const HAS_LITERAL_VALUE: &str =
    "http://www.essepuntato.it/2010/06/literalreification/hasLiteralValue";
pub const DATACITE_NS: &str = "http://purl.org/spar/datacite/";
pub const PART_OF: &str = "http://purl.org/vocab/frbr/core#partOf";
pub const EMBODIMENT: &str = "http://purl.org/vocab/frbr/core#embodiment";
pub const IS_DOCUMENT_CONTEXT_FOR: &str = "http://purl.org/spar/pro/isDocumentContextFor";
pub const IS_HELD_BY: &str = "http://purl.org/spar/pro/isHeldBy";
pub const WITH_ROLE: &str = "http://purl.org/spar/pro/withRole";
pub const HAS_NEXT: &str = "https://w3id.org/oc/ontology/hasNext";
pub const SEQUENCE_IDENTIFIER: &str = "http://purl.org/spar/fabio/hasSequenceIdentifier";
pub const GIVEN_NAME: &str = "http://xmlns.com/foaf/0.1/givenName";
pub const FAMILY_NAME: &str = "http://xmlns.com/foaf/0.1/familyName";
pub const FOAF_NAME: &str = "http://xmlns.com/foaf/0.1/name";
pub const PRO_NS: &str = "http://purl.org/spar/pro/";
pub const FABIO_NS: &str = "http://purl.org/spar/fabio/";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

pub fn scheme_uri(scheme: &str) -> String {
    format!("{}{}", DATACITE_NS, scheme)
}

pub fn role_uri(role: &str) -> String {
    format!("{}{}", PRO_NS, role)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Term {
    Uri {
        uri: String,
    },
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
}

impl Term {
    pub fn uri<S: Into<String>>(s: S) -> Self {
        Term::Uri { uri: s.into() }
    }

    pub fn lit<S: Into<String>>(s: S) -> Self {
        Term::Literal {
            value: s.into(),
            datatype: None,
        }
    }

    pub fn as_uri(&self) -> Option<&str> {
        match self {
            Term::Uri { uri } => Some(uri),
            Term::Literal { .. } => None,
        }
    }

    /// The comparable face of a term: the URI, or the literal value with
    /// the datatype stripped. Typed and plain strings match each other.
    pub fn face(&self) -> &str {
        match self {
            Term::Uri { uri } => uri,
            Term::Literal { value, .. } => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub s: String,
    pub p: String,
    pub o: Term,
}

impl Triple {
    pub fn new<S: Into<String>, P: Into<String>>(s: S, p: P, o: Term) -> Self {
        Self {
            s: s.into(),
            p: p.into(),
            o,
        }
    }
}

/// In-memory triple set with subject and predicate-object indexes.
#[derive(Default, Clone)]
pub struct Graph {
    spo: HashMap<String, Vec<(String, Term)>>,
    po_subjects: HashMap<(String, String), Vec<String>>,
    size: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triples(triples: Vec<Triple>) -> Self {
        let mut g = Self::new();
        for t in triples {
            g.add(t);
        }
        g
    }

    pub fn add(&mut self, t: Triple) {
        let entry = self.spo.entry(t.s.clone()).or_default();
        if entry.iter().any(|(p, o)| *p == t.p && *o == t.o) {
            return;
        }
        entry.push((t.p.clone(), t.o.clone()));
        self.po_subjects
            .entry((t.p, t.o.face().to_string()))
            .or_default()
            .push(t.s);
        self.size += 1;
    }

    pub fn merge(&mut self, other: Graph) {
        for (s, pos) in other.spo {
            for (p, o) in pos {
                self.add(Triple::new(s.clone(), p, o));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn has_subject(&self, s: &str) -> bool {
        self.spo.contains_key(s)
    }

    pub fn objects(&self, s: &str, p: &str) -> Vec<&Term> {
        match self.spo.get(s) {
            Some(pos) => pos.iter().filter(|(pp, _)| pp == p).map(|(_, o)| o).collect(),
            None => vec![],
        }
    }

    pub fn one_object(&self, s: &str, p: &str) -> Option<&Term> {
        self.objects(s, p).into_iter().next()
    }

    /// Subjects holding (p, o) for any datatype flavour of o.
    pub fn subjects_with(&self, p: &str, object_face: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .po_subjects
            .get(&(p.to_string(), object_face.to_string()))
            .map(|v| v.clone())
            .unwrap_or_default();
        out.sort();
        out.dedup();
        out
    }

    pub fn triples_for_subject(&self, s: &str) -> Vec<Triple> {
        match self.spo.get(s) {
            Some(pos) => pos
                .iter()
                .map(|(p, o)| Triple::new(s, p.clone(), o.clone()))
                .collect(),
            None => vec![],
        }
    }

    /// URI objects reachable from `s`, skipping the given predicates.
    pub fn linked_uris(&self, s: &str, skip: &HashSet<&str>) -> Vec<String> {
        match self.spo.get(s) {
            Some(pos) => pos
                .iter()
                .filter(|(p, _)| !skip.contains(p.as_str()))
                .filter_map(|(_, o)| o.as_uri().map(|u| u.to_string()))
                .collect(),
            None => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_and_plain_literals_match() {
        let mut g = Graph::new();
        g.add(Triple::new("s1", HAS_LITERAL_VALUE, Term::lit("10.1/a")));
        g.add(Triple::new(
            "s2",
            HAS_LITERAL_VALUE,
            Term::Literal {
                value: "10.1/a".to_string(),
                datatype: Some(XSD_STRING.to_string()),
            },
        ));
        let subs = g.subjects_with(HAS_LITERAL_VALUE, "10.1/a");
        assert_eq!(subs, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn add_is_idempotent() {
        let mut g = Graph::new();
        let t = Triple::new("s", RDF_TYPE, Term::uri("t"));
        g.add(t.clone());
        g.add(t);
        assert_eq!(g.len(), 1);
        assert_eq!(g.subjects_with(RDF_TYPE, "t").len(), 1);
    }

    #[test]
    fn merge_unions() {
        let mut a = Graph::new();
        a.add(Triple::new("s", DCTERMS_TITLE, Term::lit("T")));
        let mut b = Graph::new();
        b.add(Triple::new("s", DCTERMS_TITLE, Term::lit("T")));
        b.add(Triple::new("s", PRISM_PUB_DATE, Term::lit("2020")));
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.one_object("s", PRISM_PUB_DATE).unwrap().face(), "2020");
    }

    #[test]
    fn linked_uris_skip() {
        let mut g = Graph::new();
        g.add(Triple::new("s", RDF_TYPE, Term::uri("klass")));
        g.add(Triple::new("s", PART_OF, Term::uri("container")));
        g.add(Triple::new("s", DCTERMS_TITLE, Term::lit("T")));
        let mut skip = HashSet::new();
        skip.insert(RDF_TYPE);
        assert_eq!(g.linked_uris("s", &skip), vec!["container".to_string()]);
    }
}
