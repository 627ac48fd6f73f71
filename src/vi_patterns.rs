use lazy_static::lazy_static;
use regex::Regex;

/// Strategy tags for the invalid volume/issue table. The patterns are
/// configuration; only the dispatch below is logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    Del,
    DoNothing,
    VolIss,
    IssVol,
    Year,
    Sep,
    SClose,
    All,
}

lazy_static! {
    static ref TABLE: Vec<(Regex, Strategy)> = {
        use Strategy::*;
        let rows: Vec<(&str, Strategy)> = vec![
            (r"(?i)^(?:n/?\.?a\.?|not available|not applicable|none|null|undefined|unknown|tba|tbd)$", All),
            (r"^\u{FFFD}+$", All),
            (r"^[\xBF\xA1?]+$", All),
            (r"^[-\u{2013}\u{2014}.,;:/\\\s]+$", Sep),
            (r"^[\[\](){}<>]+$", Sep),
            (r"(?i)^vol(?:ume)?\.?\s*([\w./-]+?)[\s,;]+iss(?:ue)?\.?\s*([\w./-]+)$", VolIss),
            (r"(?i)^iss(?:ue)?\.?\s*([\w./-]+?)[\s,;]+vol(?:ume)?\.?\s*([\w./-]+)$", IssVol),
            // year stripping outranks the parenthetical vol(iss) split
            (r"(?i)^([\w./-]+?)\s*[\s(]\s*(1[6-9]\d{2}|20\d{2})\)?$", Year),
            (r"^(\d+)\s*\((\d+[\w/-]*)\)$", VolIss),
            (r"^(1[6-9]\d{2}|20\d{2})$", Del),
            (r"^([\w./-]+)\)$", SClose),
            (r"^\(([\w./-]+)$", SClose),
            (r"(?i)^(?:suppl(?:ement)?|special issue)\.?\s*[\w./-]*$", DoNothing),
            (r"^[\w./-]+$", DoNothing),
        ];
        rows.into_iter()
            .map(|(p, s)| (Regex::new(p).unwrap(), s))
            .collect()
    };

    // Column routing: values that announce themselves as a volume or an
    // issue, whichever column they sit in.
    static ref VOL_MARKER: Regex =
        Regex::new(r"(?i)^(?:vol(?:ume)?|v)\.?\s*:?\s*([\w./-]+)$").unwrap();
    static ref ISS_MARKER: Regex =
        Regex::new(r"(?i)^(?:iss(?:ue)?|no|n)\.?\s*:?\s*([\w./-]+)$").unwrap();
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Classified {
    Keep(String),
    Clear,
    Both { volume: String, issue: String },
}

fn classify(raw: &str) -> Classified {
    let value = raw.trim();
    if value.is_empty() {
        return Classified::Clear;
    }
    for (re, strategy) in TABLE.iter() {
        if let Some(caps) = re.captures(value) {
            return match strategy {
                Strategy::Del | Strategy::Sep | Strategy::All => Classified::Clear,
                Strategy::DoNothing => Classified::Keep(value.to_string()),
                Strategy::VolIss => Classified::Both {
                    volume: caps[1].to_string(),
                    issue: caps[2].to_string(),
                },
                Strategy::IssVol => Classified::Both {
                    volume: caps[2].to_string(),
                    issue: caps[1].to_string(),
                },
                Strategy::Year | Strategy::SClose => {
                    let kept = caps[1].trim().to_string();
                    if kept.is_empty() {
                        Classified::Clear
                    } else {
                        Classified::Keep(kept)
                    }
                }
            };
        }
    }
    Classified::Keep(value.to_string())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViOutcome {
    pub volume: String,
    pub issue: String,
    /// Set when a marker re-routed the row's own kind, e.g. a
    /// `journal volume` row whose number turned out to be an issue.
    pub new_type: Option<&'static str>,
}

/// Normalise the volume/issue pair of one row. Marker prefixes re-route
/// values between columns; the pattern table clears or splits the rest.
pub fn normalise_vi(volume: &str, issue: &str, rtype: &str) -> ViOutcome {
    let mut out = ViOutcome::default();

    let (mut vol_raw, mut iss_raw) = (
        normariz(volume),
        normariz(issue),
    );

    // An issue marker in the volume column moves over, and vice versa.
    if let Some(caps) = ISS_MARKER.captures(&vol_raw) {
        let moved = caps[1].to_string();
        vol_raw = String::new();
        if iss_raw.is_empty() {
            iss_raw = moved;
        }
        if rtype == "journal volume" {
            out.new_type = Some("journal issue");
        }
    } else if let Some(caps) = VOL_MARKER.captures(&vol_raw) {
        vol_raw = caps[1].to_string();
    }
    if let Some(caps) = VOL_MARKER.captures(&iss_raw) {
        let moved = caps[1].to_string();
        iss_raw = String::new();
        if vol_raw.is_empty() {
            vol_raw = moved;
        }
        if rtype == "journal issue" {
            out.new_type = Some("journal volume");
        }
    } else if let Some(caps) = ISS_MARKER.captures(&iss_raw) {
        iss_raw = caps[1].to_string();
    }

    match classify(&vol_raw) {
        Classified::Keep(v) => out.volume = v,
        Classified::Clear => {}
        Classified::Both { volume, issue } => {
            out.volume = volume;
            if out.issue.is_empty() {
                out.issue = issue;
            }
        }
    }
    match classify(&iss_raw) {
        Classified::Keep(v) => out.issue = v,
        Classified::Clear => {}
        Classified::Both { volume, issue } => {
            out.issue = issue;
            if out.volume.is_empty() {
                out.volume = volume;
            }
        }
    }
    out
}

fn normariz(s: &str) -> String {
    crate::rows::normalize_hyphens(s.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_cleared() {
        for garbage in ["N/A", "n.a.", "-", "–", "...", "none", "()", "\u{FFFD}"] {
            let out = normalise_vi(garbage, "", "journal article");
            assert_eq!(out.volume, "", "{:?}", garbage);
        }
    }

    #[test]
    fn embedded_vol_iss_split() {
        let out = normalise_vi("Vol. 10, Iss. 4", "", "journal article");
        assert_eq!(out.volume, "10");
        assert_eq!(out.issue, "4");

        let out = normalise_vi("10(2)", "", "journal article");
        assert_eq!(out.volume, "10");
        assert_eq!(out.issue, "2");

        let out = normalise_vi("", "Issue 4, Volume 10", "journal article");
        assert_eq!(out.volume, "10");
        assert_eq!(out.issue, "4");
    }

    #[test]
    fn year_stripped() {
        let out = normalise_vi("12 (2020)", "", "journal article");
        assert_eq!(out.volume, "12");
        assert_eq!(out.issue, "");
        let out = normalise_vi("3(1999)", "", "journal article");
        assert_eq!(out.volume, "3");
        assert_eq!(out.issue, "");
        let out = normalise_vi("2020", "", "journal article");
        assert_eq!(out.volume, "");
    }

    #[test]
    fn stray_paren_trimmed() {
        let out = normalise_vi("10)", "(4", "journal article");
        assert_eq!(out.volume, "10");
        assert_eq!(out.issue, "4");
    }

    #[test]
    fn issue_marker_reroutes_and_swaps_type() {
        let out = normalise_vi("Iss. 4", "", "journal volume");
        assert_eq!(out.volume, "");
        assert_eq!(out.issue, "4");
        assert_eq!(out.new_type, Some("journal issue"));

        let out = normalise_vi("", "vol. 7", "journal issue");
        assert_eq!(out.volume, "7");
        assert_eq!(out.issue, "");
        assert_eq!(out.new_type, Some("journal volume"));
    }

    #[test]
    fn plain_numbers_untouched() {
        let out = normalise_vi("10", "4", "journal article");
        assert_eq!(out.volume, "10");
        assert_eq!(out.issue, "4");
        assert_eq!(out.new_type, None);
    }

    #[test]
    fn supplement_kept_verbatim() {
        let out = normalise_vi("", "Suppl. 2", "journal article");
        assert_eq!(out.issue, "Suppl. 2");
    }
}
