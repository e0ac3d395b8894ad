//! Artist name reconciliation
//!
//! Scans the artist dictionary for names that look like spelling variants of
//! one another, collaborations credited as a single artist ("A & B"), or
//! collaborations that hide an artist nobody has scrobbled on their own.
//!
//! Names are processed shortest first. Each name is compared against every
//! name at most as long as itself; per candidate the first matching rule wins:
//!
//! 1. Same name, or same name with a leading "the"/"a" → duplicate
//! 2. Candidate appears as a space-separated component → remove it, keep going
//! 3. Candidate equals what is left → collaboration of all components, stop
//! 4. Candidate covers more than half of what is left → duplicate
//!
//! Whatever is left afterwards (minus connector words) decides the rest.
//! Names on the confirmed-real list never produce collaboration or
//! new-artist suggestions.

use crate::store::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Words joining artists in a collaboration credit
const CONNECTORS: [&str; 3] = ["&", "and", "with"];

/// Leftovers shorter than this are treated as noise, not as an artist
const MIN_ARTIST_LEN: usize = 5;

/// A name that is the same artist as another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateArtist {
    pub name: String,
    pub duplicate_of: String,
}

/// A name that is really several artists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedArtist {
    pub name: String,
    pub components: Vec<String>,
}

/// An artist that only appears inside a collaboration credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArtist {
    pub name: String,
    pub found_in: String,
    pub components: Vec<String>,
}

/// Data-quality suggestions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueReport {
    pub duplicates: Vec<DuplicateArtist>,
    pub combined: Vec<CombinedArtist>,
    pub new_artists: Vec<NewArtist>,
}

impl IssueReport {
    pub fn is_empty(&self) -> bool {
        self.duplicates.is_empty() && self.combined.is_empty() && self.new_artists.is_empty()
    }

    pub fn len(&self) -> usize {
        self.duplicates.len() + self.combined.len() + self.new_artists.len()
    }

    fn duplicate(&mut self, name: &str, duplicate_of: &str) {
        let entry = DuplicateArtist {
            name: name.to_string(),
            duplicate_of: duplicate_of.to_string(),
        };
        if !self.duplicates.contains(&entry) {
            self.duplicates.push(entry);
        }
    }

    fn combined(&mut self, name: &str, components: &[String]) {
        if self.combined.iter().any(|c| c.name == name) {
            return;
        }
        self.combined.push(CombinedArtist {
            name: name.to_string(),
            components: components.to_vec(),
        });
    }

    fn new_artist(&mut self, name: &str, found_in: &str, components: &[String]) {
        self.new_artists.push(NewArtist {
            name: name.to_string(),
            found_in: found_in.to_string(),
            components: components.to_vec(),
        });
    }
}

/// Outcome of comparing one candidate against the unexplained rest of a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateMatch {
    SameArtist,
    Component,
    Remainder,
    Overlap,
    Unrelated,
}

fn classify(name: &str, remaining: &str, candidate: &str) -> CandidateMatch {
    let name_lower = name.to_lowercase();
    let candidate_lower = candidate.to_lowercase();

    if candidate_lower == name_lower
        || format!("the {}", candidate_lower) == name_lower
        || format!("a {}", candidate_lower) == name_lower
    {
        return CandidateMatch::SameArtist;
    }
    if remaining.contains(&format!("{} ", candidate)) || remaining.contains(&format!(" {}", candidate))
    {
        return CandidateMatch::Component;
    }
    if remaining == candidate {
        return CandidateMatch::Remainder;
    }
    if remaining.contains(candidate) && candidate.chars().count() * 2 > remaining.chars().count() {
        return CandidateMatch::Overlap;
    }
    CandidateMatch::Unrelated
}

/// Remove `part` from `text` and collapse the whitespace left behind
fn cut(text: &str, part: &str) -> String {
    text.replace(part, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_connectors(text: &str) -> String {
    text.split_whitespace()
        .filter(|word| !CONNECTORS.contains(&word.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic artist-dictionary analysis
#[derive(Debug, Clone, Default)]
pub struct ArtistReconciler {
    /// Normalized names
    confirmed_real: HashSet<String>,
}

impl ArtistReconciler {
    pub fn new<S: AsRef<str>>(confirmed_real: impl IntoIterator<Item = S>) -> Self {
        Self {
            confirmed_real: confirmed_real
                .into_iter()
                .map(|name| normalize_name(name.as_ref()))
                .collect(),
        }
    }

    fn is_confirmed_real(&self, name: &str) -> bool {
        self.confirmed_real.contains(&normalize_name(name))
    }

    /// Analyze a set of artist names
    ///
    /// The result depends only on the set of names, not their order.
    pub fn analyze<S: AsRef<str>>(&self, artists: &[S]) -> IssueReport {
        let mut names: Vec<&str> = artists.iter().map(|a| a.as_ref()).collect();
        names.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        names.dedup();

        let mut report = IssueReport::default();
        for (index, name) in names.iter().enumerate().rev() {
            self.examine(name, &names[index + 1..], &mut report);
        }

        debug!(
            artists = names.len(),
            duplicates = report.duplicates.len(),
            combined = report.combined.len(),
            new_artists = report.new_artists.len(),
            "Artist analysis complete"
        );
        report
    }

    /// Compare `name` against `candidates` (no longer than `name`, longest first)
    fn examine(&self, name: &str, candidates: &[&str], report: &mut IssueReport) {
        let confirmed = self.is_confirmed_real(name);
        let mut remaining = name.to_string();
        let mut components: Vec<String> = Vec::new();

        for candidate in candidates {
            match classify(name, &remaining, candidate) {
                CandidateMatch::SameArtist => {
                    report.duplicate(candidate, name);
                    return;
                }
                CandidateMatch::Component => {
                    components.push(candidate.to_string());
                    remaining = cut(&remaining, candidate);
                }
                CandidateMatch::Remainder => {
                    components.push(candidate.to_string());
                    if !confirmed {
                        report.combined(name, &components);
                    }
                    return;
                }
                CandidateMatch::Overlap => report.duplicate(name, candidate),
                CandidateMatch::Unrelated => {}
            }
        }

        if components.is_empty() {
            return;
        }

        let rest = strip_connectors(&remaining);
        let rest_len = rest.chars().count();

        if rest.is_empty() {
            if !confirmed {
                report.combined(name, &components);
            }
        } else if rest != name {
            if rest_len < MIN_ARTIST_LEN {
                if components.len() == 1 {
                    report.duplicate(name, &components[0]);
                } else if !confirmed {
                    report.combined(name, &components);
                }
            } else if !confirmed
                && (name.contains(&format!(" {} ", rest))
                    || name.ends_with(&format!(" {}", rest))
                    || name.starts_with(&format!("{} ", rest)))
            {
                report.new_artist(&rest, name, &components);
            }
        }
    }
}
