//! Running a query against one generation.
//!
//! The query tree is compiled into a tree of [`PostList`]s which is then
//! walked in ascending docid order. Every matching document is weighed,
//! filtered and offered to a bounded result heap:
//!
//! ```text
//!            Query ──► Builder ──► Box<dyn PostList>
//!                                        │ next()
//!                                        ▼
//!   weight ─► decider ─► cutoff ─► spies ─► heap(first + maxitems) ─► MSet
//!                                    (collapse / percent: collect all)
//! ```
//!
//! Nothing survives between calls: each match builds a fresh tree.

mod branch;
mod builder;
mod leaf;
mod positional;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::Arc;

use crate::document::Document;
use crate::enquire::decider::MatchDecider;
use crate::enquire::mset::{MSet, MSetItem, TermInfo};
use crate::enquire::sort::{Order, SortKey};
use crate::enquire::spy::MatchSpy;
use crate::enquire::RSet;
use crate::error::{QuarryError, Result};
use crate::query::Query;
use crate::storage::Generation;
use crate::weight::{Weight, WeightStats};
use crate::{DocCount, DocId, TermCount, TermPos, ValueNo};

pub(crate) use builder::Builder;

// ── PostList ──────────────────────────────────────────────────────────

/// A cursor over the documents matching one subtree of a query.
///
/// A fresh postlist sits before its first document: `at_end()` is false
/// and `docid()` is 0 until the first `next()` or `skip_to()`.
pub(crate) trait PostList: Send {
    fn termfreq_min(&self) -> DocCount;

    fn termfreq_est(&self) -> DocCount;

    fn termfreq_max(&self) -> DocCount;

    /// Upper bound on [`weight`](Self::weight).
    fn max_weight(&self) -> f64;

    fn docid(&self) -> DocId;

    fn at_end(&self) -> bool;

    fn next(&mut self) -> Result<()>;

    /// Move to the first document `>= docid`. Never moves backwards.
    fn skip_to(&mut self, docid: DocId) -> Result<()>;

    /// Weight of the current document.
    fn weight(&self) -> Result<f64>;

    /// Number of weighted leaves matching the current document.
    fn count_matching_subqs(&self) -> usize;

    /// Combined wdf of the leaves matching the current document.
    fn wdf(&self) -> TermCount {
        0
    }

    /// Positions of the current document, merged over matching leaves.
    fn positions(&self) -> Result<Vec<TermPos>> {
        Err(QuarryError::unimplemented(
            "positional queries only support term and OR subqueries",
        ))
    }
}

/// Estimate for documents matching all of several independent lists.
pub(crate) fn and_estimate(estimates: impl Iterator<Item = DocCount>, dbsize: DocCount) -> DocCount {
    if dbsize == 0 {
        return 0;
    }
    let n = dbsize as f64;
    let fraction: f64 = estimates.map(|est| est as f64 / n).product();
    (fraction * n + 0.5) as DocCount
}

/// Estimate for documents matching any of several independent lists.
pub(crate) fn or_estimate(estimates: impl Iterator<Item = DocCount>, dbsize: DocCount) -> DocCount {
    if dbsize == 0 {
        return 0;
    }
    let n = dbsize as f64;
    let missing: f64 = estimates.map(|est| 1.0 - (est as f64 / n).min(1.0)).product();
    ((1.0 - missing) * n + 0.5) as DocCount
}

// ── Matching ──────────────────────────────────────────────────────────

/// Everything a single match needs from [`Enquire`](crate::Enquire).
pub(crate) struct MatchOptions<'a> {
    pub first: usize,
    pub maxitems: usize,
    pub weight: &'a dyn Weight,
    pub rset: Option<&'a RSet>,
    pub decider: Option<&'a dyn MatchDecider>,
    pub spies: &'a [Arc<dyn MatchSpy>],
    pub order: Order,
    pub sort_key: Option<&'a SortKey>,
    pub collapse: Option<(ValueNo, DocCount)>,
    pub percent_cutoff: u32,
    pub weight_cutoff: f64,
}

/// A matching document waiting for its rank.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub docid: DocId,
    pub weight: f64,
    pub sort_key: Vec<u8>,
    pub collapse_key: Vec<u8>,
}

/// Heap entry ordered so the worst candidate sits on top.
struct Ranked {
    candidate: Candidate,
    order: Order,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.candidate, &other.candidate)
    }
}

/// Match `query` against `generation`.
pub(crate) fn run(generation: Arc<Generation>, query: &Query, options: &MatchOptions<'_>) -> Result<MSet> {
    let mut builder = Builder::new(&generation, options.weight, options.rset, query.get_length());
    let mut root = builder.build(query, 1.0)?;
    let total_subqs = builder.total_subqs();
    let terms = builder.into_term_info();

    let mut extra = options.weight.clone_box();
    extra.init(
        &WeightStats {
            collection_size: generation.doc_count(),
            rset_size: options.rset.map_or(0, |rset| rset.size() as DocCount),
            average_length: generation.avlength(),
            query_length: query.get_length(),
            doclength_lower_bound: generation.doclen_lower,
            ..Default::default()
        },
        1.0,
    );
    let max_possible = root.max_weight() + extra.maxextra();

    log::debug!(
        "matching {} (first={}, maxitems={}, max_possible={max_possible:.4})",
        query.get_description(),
        options.first,
        options.maxitems
    );

    if options.maxitems == 0 && options.spies.is_empty() {
        let filtered = options.decider.is_some() || options.collapse.is_some() || options.weight_cutoff > 0.0 || options.percent_cutoff > 0;
        let lower = if filtered { 0 } else { root.termfreq_min() };
        return Ok(MSet::new(
            generation,
            options.first,
            Vec::new(),
            Bounds {
                lower,
                estimated: root.termfreq_est(),
                upper: root.termfreq_max(),
            },
            max_possible,
            0.0,
            0.0,
            terms,
        ));
    }

    let collect_all = options.collapse.is_some() || options.percent_cutoff > 0;
    let capacity = options.first.saturating_add(options.maxitems);
    let mut heap: BinaryHeap<Ranked> = BinaryHeap::new();
    let mut all: Vec<Candidate> = Vec::new();
    let mut matched: DocCount = 0;
    let mut max_attained = 0.0f64;
    let mut best_subqs = 0usize;

    loop {
        root.next()?;
        if root.at_end() {
            break;
        }
        let docid = root.docid();
        let doclength = generation.doclength(docid)?;
        let weight = root.weight()? + extra.sumextra(doclength);

        let needs_document = options.decider.is_some()
            || !options.spies.is_empty()
            || matches!(options.sort_key, Some(SortKey::Maker(_)));
        let document = if needs_document {
            let content = Arc::clone(&generation.doc(docid)?.content);
            Some(Document::from_stored(docid, content, Arc::clone(&generation)))
        } else {
            None
        };

        if let (Some(decider), Some(doc)) = (options.decider, &document) {
            if !decider.accept(doc)? {
                continue;
            }
        }
        if weight < options.weight_cutoff {
            continue;
        }
        if let Some(doc) = &document {
            for spy in options.spies {
                spy.observe(doc, weight)?;
            }
        }

        matched += 1;
        if weight > max_attained {
            max_attained = weight;
            best_subqs = root.count_matching_subqs();
        }

        let sort_key = match options.sort_key {
            Some(SortKey::Value(slot)) => generation.value(docid, *slot).unwrap_or_default().to_vec(),
            Some(SortKey::Maker(maker)) => match &document {
                Some(doc) => maker.make_key(doc)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        let collapse_key = match options.collapse {
            Some((slot, _)) => generation.value(docid, slot).unwrap_or_default().to_vec(),
            None => Vec::new(),
        };
        let candidate = Candidate {
            docid,
            weight,
            sort_key,
            collapse_key,
        };

        if collect_all {
            all.push(candidate);
        } else if capacity > 0 {
            heap.push(Ranked {
                candidate,
                order: options.order,
            });
            if heap.len() > capacity {
                heap.pop();
            }
        }
    }

    let percent_scale = if max_attained > 0.0 && total_subqs > 0 {
        (best_subqs as f64 / total_subqs as f64) / max_attained
    } else {
        0.0
    };

    let mut uncollapsed = matched;
    let ordered: Vec<Candidate> = if collect_all {
        all.sort_by(|a, b| options.order.compare(a, b));
        if options.percent_cutoff > 0 {
            let cutoff = options.percent_cutoff as i32;
            all.retain(|c| percent(c.weight, percent_scale) >= cutoff);
            matched = all.len() as DocCount;
            uncollapsed = matched;
        }
        match options.collapse {
            Some((_, collapse_max)) => {
                let (kept, suppressed) = collapse(all, collapse_max);
                matched -= suppressed.values().sum::<DocCount>();
                return finish(
                    generation,
                    options,
                    kept,
                    suppressed,
                    Counts { matched, uncollapsed },
                    max_possible,
                    max_attained,
                    percent_scale,
                    terms,
                );
            }
            None => all,
        }
    } else {
        heap.into_sorted_vec().into_iter().map(|ranked| ranked.candidate).collect()
    };

    finish(
        generation,
        options,
        ordered,
        HashMap::new(),
        Counts { matched, uncollapsed },
        max_possible,
        max_attained,
        percent_scale,
        terms,
    )
}

/// Match counts reported by an [`MSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub lower: DocCount,
    pub estimated: DocCount,
    pub upper: DocCount,
}

struct Counts {
    matched: DocCount,
    uncollapsed: DocCount,
}

#[allow(clippy::too_many_arguments)]
fn finish(
    generation: Arc<Generation>,
    options: &MatchOptions<'_>,
    ordered: Vec<Candidate>,
    suppressed: HashMap<Vec<u8>, DocCount>,
    counts: Counts,
    max_possible: f64,
    max_attained: f64,
    percent_scale: f64,
    terms: BTreeMap<Vec<u8>, TermInfo>,
) -> Result<MSet> {
    let items: Vec<MSetItem> = ordered
        .into_iter()
        .skip(options.first)
        .take(options.maxitems)
        .enumerate()
        .map(|(idx, candidate)| MSetItem {
            docid: candidate.docid,
            rank: options.first + idx,
            weight: candidate.weight,
            percent: percent(candidate.weight, percent_scale),
            collapse_count: suppressed.get(&candidate.collapse_key).copied().unwrap_or(0),
            collapse_key: candidate.collapse_key,
            sort_key: candidate.sort_key,
        })
        .collect();
    log::debug!(
        "matched {} documents, returning {} (max_attained={max_attained:.4})",
        counts.matched,
        items.len()
    );
    let mut mset = MSet::new(
        generation,
        options.first,
        items,
        Bounds {
            lower: counts.matched,
            estimated: counts.matched,
            upper: counts.matched,
        },
        max_possible,
        max_attained,
        percent_scale,
        terms,
    );
    mset.set_uncollapsed(Bounds {
        lower: counts.uncollapsed,
        estimated: counts.uncollapsed,
        upper: counts.uncollapsed,
    });
    Ok(mset)
}

/// Keep the best `collapse_max` candidates per collapse key. `ordered` must
/// already be in rank order. Candidates without a key are never collapsed.
fn collapse(
    ordered: Vec<Candidate>,
    collapse_max: DocCount,
) -> (Vec<Candidate>, HashMap<Vec<u8>, DocCount>) {
    let collapse_max = collapse_max.max(1);
    let mut seen: HashMap<Vec<u8>, DocCount> = HashMap::new();
    let mut suppressed: HashMap<Vec<u8>, DocCount> = HashMap::new();
    let mut kept = Vec::with_capacity(ordered.len());
    for candidate in ordered {
        if candidate.collapse_key.is_empty() {
            kept.push(candidate);
            continue;
        }
        let count = seen.entry(candidate.collapse_key.clone()).or_insert(0);
        if *count < collapse_max {
            *count += 1;
            kept.push(candidate);
        } else {
            *suppressed.entry(candidate.collapse_key).or_insert(0) += 1;
        }
    }
    (kept, suppressed)
}

/// Percentage for `weight` given the scale of the match.
pub(crate) fn percent(weight: f64, percent_scale: f64) -> i32 {
    if percent_scale == 0.0 {
        return 100;
    }
    if weight <= 0.0 {
        return 0;
    }
    let percent = (weight * percent_scale * 100.0 + 100.0 * f64::EPSILON) as i32;
    percent.clamp(1, 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimates() {
        assert_eq!(and_estimate([50, 50].into_iter(), 100), 25);
        assert_eq!(or_estimate([50, 50].into_iter(), 100), 75);
        assert_eq!(or_estimate([200].into_iter(), 100), 100);
        assert_eq!(and_estimate([1].into_iter(), 0), 0);
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(3.0, 0.0), 100);
        assert_eq!(percent(0.0, 0.5), 0);
        assert_eq!(percent(2.0, 0.5), 100);
        assert_eq!(percent(1.0, 0.5), 50);
        assert_eq!(percent(1e-9, 0.5), 1);
    }

    #[test]
    fn test_collapse_keeps_best_per_key() {
        let candidate = |docid, key: &str| Candidate {
            docid,
            weight: 1.0,
            sort_key: Vec::new(),
            collapse_key: key.as_bytes().to_vec(),
        };
        let ordered = vec![
            candidate(1, "a"),
            candidate(2, "b"),
            candidate(3, "a"),
            candidate(4, ""),
            candidate(5, "a"),
            candidate(6, ""),
        ];
        let (kept, suppressed) = collapse(ordered, 1);
        let docids: Vec<DocId> = kept.iter().map(|c| c.docid).collect();
        assert_eq!(docids, vec![1, 2, 4, 6]);
        assert_eq!(suppressed.get(b"a".as_slice()), Some(&2));
        assert_eq!(suppressed.get(b"b".as_slice()), None);
    }
}
