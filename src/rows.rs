use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::graph::FABIO_NS;

/// One pre-cleaned input row. Field cleaning (dates, casing, check
/// digits) happens upstream; here the strings are taken as given.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanedRow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub editor: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub page: String,
    #[serde(default)]
    pub pub_date: String,
    #[serde(rename = "type", default)]
    pub rtype: String,
}

impl CleanedRow {
    pub fn is_blank(&self) -> bool {
        self.id.is_empty()
            && self.title.is_empty()
            && self.author.is_empty()
            && self.editor.is_empty()
            && self.publisher.is_empty()
            && self.venue.is_empty()
            && self.volume.is_empty()
            && self.issue.is_empty()
            && self.page.is_empty()
            && self.pub_date.is_empty()
            && self.rtype.is_empty()
    }
}

macro_rules! br_types {
    ($($variant:ident => $label:literal / $class:literal),*,) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum BrType {
            $($variant,)*
        }

        impl BrType {
            pub fn label(&self) -> &'static str {
                match self {
                    $(BrType::$variant => $label,)*
                }
            }

            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some(BrType::$variant),)*
                    _ => None,
                }
            }

            pub fn class_uri(&self) -> String {
                match self {
                    $(BrType::$variant => format!("{}{}", FABIO_NS, $class),)*
                }
            }

            pub fn from_class_uri(uri: &str) -> Option<Self> {
                let tail = uri.strip_prefix(FABIO_NS)?;
                match tail {
                    $($class => Some(BrType::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

br_types!(
    Journal => "journal" / "Journal",
    JournalArticle => "journal article" / "JournalArticle",
    JournalVolume => "journal volume" / "JournalVolume",
    JournalIssue => "journal issue" / "JournalIssue",
    Book => "book" / "Book",
    BookChapter => "book chapter" / "BookChapter",
    BookPart => "book part" / "Part",
    BookSection => "book section" / "ExpressionCollection",
    BookSeries => "book series" / "BookSeries",
    BookSet => "book set" / "BookSet",
    Proceedings => "proceedings" / "AcademicProceedings",
    ProceedingsArticle => "proceedings article" / "ProceedingsPaper",
    Series => "series" / "Series",
    Report => "report" / "ReportDocument",
    ReportSeries => "report series" / "ReportSeries",
    Standard => "standard" / "SpecificationDocument",
    ReferenceBook => "reference book" / "ReferenceBook",
    ReferenceEntry => "reference entry" / "ReferenceEntry",
    Dissertation => "dissertation" / "Thesis",
    Dataset => "dataset" / "Dataset",
    DataFile => "data file" / "DataFile",
    WebContent => "web content" / "WebContent",
    PeerReview => "peer review" / "PeerReview",
    Preprint => "preprint" / "Preprint",
    Editorial => "editorial" / "Editorial",
    RetractionNotice => "retraction notice" / "RetractionNotice",
);

impl BrType {
    /// Top-level containers that need only a title to be valid.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            BrType::Journal
                | BrType::BookSeries
                | BrType::BookSet
                | BrType::Proceedings
                | BrType::Series
                | BrType::Standard
                | BrType::ReportSeries
        )
    }

    /// Parts living inside a host publication, valid with title + venue.
    pub fn is_sub_part(&self) -> bool {
        matches!(
            self,
            BrType::BookChapter | BrType::BookPart | BrType::BookSection | BrType::ReferenceEntry
        )
    }
}

pub const SCHEMES: [&str; 15] = [
    "doi", "orcid", "isbn", "issn", "pmid", "pmcid", "url", "wikidata", "wikipedia", "crossref",
    "viaf", "ror", "openalex", "arxiv", "jid",
];

pub fn is_known_scheme(scheme: &str) -> bool {
    SCHEMES.contains(&scheme)
}

const HYPHEN_VARIANTS: [char; 10] = [
    '\u{00AD}', '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}',
    '\u{2212}', '\u{FE63}', '\u{FF0D}',
];

pub fn normalize_hyphens(s: &str) -> String {
    s.chars()
        .map(|c| if HYPHEN_VARIANTS.contains(&c) { '-' } else { c })
        .collect()
}

/// Space-separated identifier tokens, empties dropped.
pub fn split_identifiers(field: &str) -> Vec<String> {
    field
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Split on `sep` outside square brackets, so id lists survive intact.
pub fn split_outside_brackets(s: &str, sep: char) -> Vec<String> {
    let mut out = vec![];
    let mut depth = 0usize;
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '[' => {
                depth += 1;
                cur.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                cur.push(c);
            }
            c if c == sep && depth == 0 => {
                out.push(cur.trim().to_string());
                cur = String::new();
            }
            _ => cur.push(c),
        }
    }
    let last = cur.trim().to_string();
    if !last.is_empty() || !out.is_empty() {
        out.push(last);
    }
    out.into_iter().filter(|e| !e.is_empty()).collect()
}

lazy_static! {
    static ref BRACKET_FIELD: Regex = Regex::new(r"^\s*(.*?)\s*\[\s*(.*?)\s*\]\s*$").unwrap();
}

/// `Name [id1 id2]` -> (name, ids); tolerates `[ ]` and plain names.
pub fn parse_bracket_field(entry: &str) -> (String, Vec<String>) {
    match BRACKET_FIELD.captures(entry) {
        Some(caps) => {
            let name = caps.get(1).unwrap().as_str().to_string();
            let ids = split_identifiers(caps.get(2).unwrap().as_str());
            (name, ids)
        }
        None => (entry.trim().to_string(), vec![]),
    }
}

/// Full-name formatting shared with the finder: `family, given` with
/// the comma kept when only one half is known.
pub fn format_name(given: &str, family: &str, name: &str) -> String {
    match (family.is_empty(), given.is_empty()) {
        (false, false) => format!("{}, {}", family, given),
        (false, true) => format!("{},", family),
        (true, false) => format!(", {}", given),
        (true, true) => name.to_string(),
    }
}

/// Inverse of the above on row data: a comma means `family, given`.
pub fn split_family_given(name: &str) -> (String, String) {
    match name.split_once(',') {
        Some((family, given)) => (family.trim().to_string(), given.trim().to_string()),
        None => (String::new(), String::new()),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RowValidity {
    Valid,
    DropSilently,
    Invalid(&'static str),
}

/// §minimum-field rules: an id always carries the row; otherwise the
/// type decides what must be present.
pub fn row_validity(row: &CleanedRow) -> RowValidity {
    if !row.id.is_empty() {
        return RowValidity::Valid;
    }
    if row.is_blank() {
        return RowValidity::DropSilently;
    }
    let has_title = !row.title.is_empty();
    let has_venue = !row.venue.is_empty();
    match BrType::from_label(&row.rtype) {
        Some(t) if t.is_container() => {
            if has_title {
                RowValidity::Valid
            } else {
                RowValidity::Invalid("container row without title")
            }
        }
        Some(t) if t.is_sub_part() => {
            if has_title && has_venue {
                RowValidity::Valid
            } else {
                RowValidity::Invalid("sub-part row without title and venue")
            }
        }
        Some(BrType::JournalVolume) => {
            if has_venue && (!row.volume.is_empty() || has_title) {
                RowValidity::Valid
            } else {
                RowValidity::Invalid("volume row without venue and number")
            }
        }
        Some(BrType::JournalIssue) => {
            if has_venue && (!row.issue.is_empty() || has_title) {
                RowValidity::Valid
            } else {
                RowValidity::Invalid("issue row without venue and number")
            }
        }
        _ => {
            if has_title
                && !row.pub_date.is_empty()
                && (!row.author.is_empty() || !row.editor.is_empty())
            {
                RowValidity::Valid
            } else {
                RowValidity::Invalid("row without title, date and contributor")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_labels_round_trip() {
        for label in ["journal article", "book set", "retraction notice"] {
            let t = BrType::from_label(label).unwrap();
            assert_eq!(t.label(), label);
            assert_eq!(BrType::from_class_uri(&t.class_uri()), Some(t));
        }
        assert_eq!(BrType::from_label("poem"), None);
    }

    #[test]
    fn bracket_split_respects_brackets() {
        let field = "Smith, A [orcid:0000-0001-0000-0000]; Doe; J [ ]";
        let parts = split_outside_brackets(field, ';');
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "Smith, A [orcid:0000-0001-0000-0000]");
        let (name, ids) = parse_bracket_field(&parts[0]);
        assert_eq!(name, "Smith, A");
        assert_eq!(ids, vec!["orcid:0000-0001-0000-0000"]);
        let (name, ids) = parse_bracket_field(&parts[2]);
        assert_eq!(name, "J");
        assert!(ids.is_empty());
    }

    #[test]
    fn name_formatting_rules() {
        assert_eq!(format_name("Alice", "Smith", ""), "Smith, Alice");
        assert_eq!(format_name("", "Smith", ""), "Smith,");
        assert_eq!(format_name("Alice", "", ""), ", Alice");
        assert_eq!(format_name("", "", "ACME Press"), "ACME Press");
        assert_eq!(format_name("", "", ""), "");
    }

    #[test]
    fn hyphen_variants_normalised() {
        assert_eq!(normalize_hyphens("12\u{2013}15"), "12-15");
        assert_eq!(normalize_hyphens("10.1/a"), "10.1/a");
    }

    #[test]
    fn validity_rules() {
        let mut row = CleanedRow::default();
        assert_eq!(row_validity(&row), RowValidity::DropSilently);
        row.id = "doi:10.1/a".to_string();
        assert_eq!(row_validity(&row), RowValidity::Valid);

        let mut article = CleanedRow {
            title: "X".to_string(),
            pub_date: "2020".to_string(),
            rtype: "journal article".to_string(),
            ..Default::default()
        };
        assert!(matches!(row_validity(&article), RowValidity::Invalid(_)));
        article.author = "Doe".to_string();
        assert_eq!(row_validity(&article), RowValidity::Valid);

        let journal = CleanedRow {
            title: "J".to_string(),
            rtype: "journal".to_string(),
            ..Default::default()
        };
        assert_eq!(row_validity(&journal), RowValidity::Valid);

        let volume = CleanedRow {
            venue: "J [issn:0000-0001]".to_string(),
            volume: "10".to_string(),
            rtype: "journal volume".to_string(),
            ..Default::default()
        };
        assert_eq!(row_validity(&volume), RowValidity::Valid);
    }
}
