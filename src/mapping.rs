//! Header to target column resolution.
//!
//! Each spreadsheet column tries, in order: the curated dictionary, an exact
//! match of normalized names, then keyword overlap. A target column claimed
//! by an earlier spreadsheet column is never offered again, so the result is
//! injective.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
};

use log::{debug, info};
use serde::Serialize;

use crate::{
    config::{FuzzyConfig, IngestConfig},
    normalize::{normalize_header, split_tokens},
    store::TargetColumn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Manual,
    Exact,
    Keywords,
    PartialOverlap,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchStrategy::Manual => "manual",
            MatchStrategy::Exact => "exact",
            MatchStrategy::Keywords => "keywords",
            MatchStrategy::PartialOverlap => "partial overlap",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnmappedReason {
    EmptyHeader,
    NoMatch,
    TargetAlreadyClaimed { target: String },
}

impl fmt::Display for UnmappedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmappedReason::EmptyHeader => f.write_str("empty header"),
            UnmappedReason::NoMatch => f.write_str("no matching column"),
            UnmappedReason::TargetAlreadyClaimed { target } => {
                write!(f, "column '{target}' is already mapped to an earlier header")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedColumn {
    pub index: usize,
    pub header: String,
    pub target: String,
    pub strategy: MatchStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmappedColumn {
    pub index: usize,
    pub header: String,
    pub reason: UnmappedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMapping {
    /// Ordered by spreadsheet column index.
    pub mapped: Vec<MappedColumn>,
    pub unmapped: Vec<UnmappedColumn>,
}

impl ColumnMapping {
    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mapped.len()
    }

    pub fn target_for(&self, index: usize) -> Option<&str> {
        self.mapped
            .iter()
            .find(|column| column.index == index)
            .map(|column| column.target.as_str())
    }

    pub fn index_map(&self) -> BTreeMap<usize, String> {
        self.mapped
            .iter()
            .map(|column| (column.index, column.target.clone()))
            .collect()
    }
}

pub struct ColumnMapper {
    dictionary: HashMap<String, String>,
    fuzzy: FuzzyConfig,
}

impl ColumnMapper {
    pub fn new(config: &IngestConfig) -> Self {
        Self::with_dictionary(&config.manual_mapping, config.fuzzy.clone())
    }

    /// Dictionary keys are normalized once here. When two raw keys collapse
    /// to the same normalized key the first one (in key order) is kept.
    pub fn with_dictionary(dictionary: &BTreeMap<String, String>, fuzzy: FuzzyConfig) -> Self {
        let mut normalized = HashMap::with_capacity(dictionary.len());
        for (raw, target) in dictionary {
            match normalize_header(raw) {
                Some(key) => {
                    normalized.entry(key).or_insert_with(|| target.clone());
                }
                None => debug!("Ignoring manual mapping entry with empty header -> '{target}'"),
            }
        }
        Self {
            dictionary: normalized,
            fuzzy,
        }
    }

    pub fn map(&self, headers: &[String], targets: &[TargetColumn]) -> ColumnMapping {
        let candidates: Vec<Candidate<'_>> = targets
            .iter()
            .map(|target| Candidate {
                name: &target.name,
                normalized: normalize_header(&target.name),
                keywords: self.keywords(normalize_header(&target.name).as_deref()),
                fuzzy_eligible: !self.is_excluded(&target.name),
            })
            .collect();

        let mut claimed: HashSet<&str> = HashSet::new();
        let mut mapping = ColumnMapping::default();

        for (index, header) in headers.iter().enumerate() {
            let Some(normalized) = normalize_header(header) else {
                mapping.unmapped.push(UnmappedColumn {
                    index,
                    header: header.clone(),
                    reason: UnmappedReason::EmptyHeader,
                });
                continue;
            };

            let mut blocked: Option<String> = None;
            let resolved = self
                .manual_match(&normalized, &candidates, &claimed, &mut blocked)
                .or_else(|| exact_match(&normalized, &candidates, &claimed, &mut blocked))
                .or_else(|| self.fuzzy_match(&normalized, &candidates, &claimed));

            match resolved {
                Some((target, strategy)) => {
                    debug!("Mapped '{header}' (column {index}) -> '{target}' via {strategy}");
                    claimed.insert(target);
                    mapping.mapped.push(MappedColumn {
                        index,
                        header: header.clone(),
                        target: target.to_string(),
                        strategy,
                    });
                }
                None => {
                    let reason = match blocked {
                        Some(target) => UnmappedReason::TargetAlreadyClaimed { target },
                        None => UnmappedReason::NoMatch,
                    };
                    debug!("Left '{header}' (column {index}) unmapped: {reason}");
                    mapping.unmapped.push(UnmappedColumn {
                        index,
                        header: header.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            "Mapped {} of {} spreadsheet column(s); {} unmapped",
            mapping.mapped.len(),
            headers.len(),
            mapping.unmapped.len()
        );
        mapping
    }

    fn manual_match<'t>(
        &self,
        normalized: &str,
        candidates: &[Candidate<'t>],
        claimed: &HashSet<&str>,
        blocked: &mut Option<String>,
    ) -> Option<(&'t str, MatchStrategy)> {
        let wanted = self.dictionary.get(normalized)?;
        let wanted_key = normalize_header(wanted);
        let candidate = candidates.iter().find(|candidate| {
            candidate.name == wanted.as_str()
                || (wanted_key.is_some() && candidate.normalized == wanted_key)
        })?;
        if claimed.contains(candidate.name) {
            blocked.get_or_insert_with(|| candidate.name.to_string());
            return None;
        }
        Some((candidate.name, MatchStrategy::Manual))
    }

    fn fuzzy_match<'t>(
        &self,
        normalized: &str,
        candidates: &[Candidate<'t>],
        claimed: &HashSet<&str>,
    ) -> Option<(&'t str, MatchStrategy)> {
        let keywords = self.keywords(Some(normalized));
        if keywords.is_empty() {
            return None;
        }
        candidates
            .iter()
            .filter(|candidate| candidate.fuzzy_eligible && !claimed.contains(candidate.name))
            .find_map(|candidate| {
                if candidate.keywords.is_empty() {
                    return None;
                }
                let overlapping = keywords
                    .iter()
                    .filter(|keyword| {
                        candidate
                            .keywords
                            .iter()
                            .any(|target| overlaps(keyword, target))
                    })
                    .count();
                if overlapping == keywords.len() {
                    return Some((candidate.name, MatchStrategy::Keywords));
                }
                let ratio =
                    overlapping as f64 / keywords.len().min(candidate.keywords.len()) as f64;
                (ratio >= self.fuzzy.threshold)
                    .then_some((candidate.name, MatchStrategy::PartialOverlap))
            })
    }

    fn keywords(&self, normalized: Option<&str>) -> Vec<String> {
        let Some(normalized) = normalized else {
            return Vec::new();
        };
        split_tokens(normalized)
            .filter(|token| token.chars().count() >= self.fuzzy.min_keyword_len)
            .filter(|token| !self.fuzzy.stop_words.iter().any(|stop| stop.as_str() == *token))
            .map(str::to_string)
            .collect()
    }

    fn is_excluded(&self, column: &str) -> bool {
        self.fuzzy
            .excluded_columns
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(column))
    }
}

struct Candidate<'t> {
    name: &'t str,
    normalized: Option<String>,
    keywords: Vec<String>,
    fuzzy_eligible: bool,
}

fn exact_match<'t>(
    normalized: &str,
    candidates: &[Candidate<'t>],
    claimed: &HashSet<&str>,
    blocked: &mut Option<String>,
) -> Option<(&'t str, MatchStrategy)> {
    let candidate = candidates
        .iter()
        .find(|candidate| candidate.normalized.as_deref() == Some(normalized))?;
    if claimed.contains(candidate.name) {
        blocked.get_or_insert_with(|| candidate.name.to_string());
        return None;
    }
    Some((candidate.name, MatchStrategy::Exact))
}

fn overlaps(left: &str, right: &str) -> bool {
    left.contains(right) || right.contains(left)
}
