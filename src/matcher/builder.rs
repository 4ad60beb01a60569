//! Compiling a [`Query`] into a postlist tree.
//!
//! Weight factors flow down the tree: `SCALE_WEIGHT` multiplies them and
//! the unweighted side of `FILTER` and `AND_NOT` resets them to 0. A leaf
//! reached with a non-zero factor gets its own initialised weight object and
//! counts towards the total used for percentages.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::database::Database;
use crate::enquire::RSet;
use crate::enquire::mset::TermInfo;
use crate::error::{QuarryError, Result};
use crate::matcher::PostList;
use crate::matcher::branch::{
    AndMaybePostList, AndNotPostList, AndPostList, Combine, OrPostList, SynonymPostList,
    XorPostList,
};
use crate::matcher::leaf::{EmptyPostList, SourcePostList, TermPostList, ValueRangePostList};
use crate::matcher::positional::Positional;
use crate::query::{Node, Op, Query, Wildcard, WildcardLimit};
use crate::storage::Generation;
use crate::util::escape::escape_bytes;
use crate::weight::{Weight, WeightStats};
use crate::{DocCount, TermCount, ValueNo};

type Sub = Box<dyn PostList>;

/// Builds postlists for one match.
pub(crate) struct Builder<'a> {
    generation: &'a Arc<Generation>,
    weight: &'a dyn Weight,
    rset: Option<&'a RSet>,
    query_length: TermCount,
    total_subqs: usize,
    terms: BTreeMap<Vec<u8>, TermInfo>,
}

impl<'a> Builder<'a> {
    pub fn new(
        generation: &'a Arc<Generation>,
        weight: &'a dyn Weight,
        rset: Option<&'a RSet>,
        query_length: TermCount,
    ) -> Self {
        Builder {
            generation,
            weight,
            rset,
            query_length,
            total_subqs: 0,
            terms: BTreeMap::new(),
        }
    }

    /// Weighted leaves seen so far.
    pub fn total_subqs(&self) -> usize {
        self.total_subqs
    }

    /// Frequencies and maximum weights of the query terms.
    pub fn into_term_info(self) -> BTreeMap<Vec<u8>, TermInfo> {
        self.terms
    }

    fn dbsize(&self) -> DocCount {
        self.generation.doc_count()
    }

    pub fn build(&mut self, query: &Query, factor: f64) -> Result<Sub> {
        let Some(node) = query.node() else {
            return Ok(Box::new(EmptyPostList));
        };
        match node {
            Node::Term { term, .. } if term.is_empty() => Ok(self.all_documents()),
            Node::Term { term, wqf, .. } => Ok(self.term(term, *wqf, factor)),
            Node::Source(source) => {
                let mut source = source.clone_box();
                source.init(&Database::snapshot(Arc::clone(self.generation)))?;
                if factor != 0.0 {
                    self.total_subqs += 1;
                }
                Ok(Box::new(SourcePostList::new(source, factor)))
            }
            Node::Scale {
                factor: scale,
                subquery,
            } => self.build(subquery, factor * scale),
            Node::ValueRange { slot, begin, end } => {
                Ok(self.value_range(*slot, Some(begin.clone()), Some(end.clone())))
            }
            Node::ValueGe { slot, limit } => Ok(self.value_range(*slot, Some(limit.clone()), None)),
            Node::ValueLe { slot, limit } => Ok(self.value_range(*slot, None, Some(limit.clone()))),
            Node::Wildcard(wildcard) => self.wildcard(wildcard, factor),
            Node::Branch {
                op,
                parameter,
                subqueries,
            } => self.branch(*op, *parameter, subqueries, factor),
        }
    }

    fn build_all(&mut self, subqueries: &[Query], factor: f64) -> Result<Vec<Sub>> {
        subqueries.iter().map(|q| self.build(q, factor)).collect()
    }

    /// OR of `subqueries`, or the single subquery itself.
    fn union(&mut self, subqueries: &[Query], factor: f64) -> Result<Sub> {
        if let [single] = subqueries {
            return self.build(single, factor);
        }
        let subs = self.build_all(subqueries, factor)?;
        Ok(Box::new(OrPostList::new(subs, self.dbsize(), Combine::Sum)))
    }

    // ── Leaves ──────────────────────────────────────────────────────

    fn all_documents(&self) -> Sub {
        match self.generation.postlist(b"") {
            Some(list) => Box::new(TermPostList::new(Arc::clone(self.generation), Vec::new(), list, None)),
            None => Box::new(EmptyPostList),
        }
    }

    fn term(&mut self, term: &[u8], wqf: TermCount, factor: f64) -> Sub {
        let list = self.generation.postlist(term);
        let termfreq = list.as_ref().map_or(0, |list| list.termfreq());
        let wdf_upper = list.as_ref().map_or(0, |list| list.wdf_upper);
        let stats = self.stats(termfreq, self.reltermfreq(&[term.to_vec()]), wqf, wdf_upper);
        let weight = self.make_weight(&stats, factor);

        let info = self.terms.entry(term.to_vec()).or_default();
        info.termfreq = termfreq;
        info.termweight += weight.as_ref().map_or(0.0, |w| w.maxpart());

        match list {
            Some(list) => Box::new(TermPostList::new(
                Arc::clone(self.generation),
                term.to_vec(),
                list,
                weight,
            )),
            None => Box::new(EmptyPostList),
        }
    }

    fn value_range(&self, slot: ValueNo, lower: Option<Vec<u8>>, upper: Option<Vec<u8>>) -> Sub {
        match ValueRangePostList::new(self.generation, slot, lower, upper) {
            Some(list) => Box::new(list),
            None => Box::new(EmptyPostList),
        }
    }

    fn stats(
        &self,
        termfreq: DocCount,
        reltermfreq: DocCount,
        wqf: TermCount,
        wdf_upper_bound: TermCount,
    ) -> WeightStats {
        WeightStats {
            collection_size: self.dbsize(),
            rset_size: self.rset.map_or(0, |rset| rset.size() as DocCount),
            average_length: self.generation.avlength(),
            termfreq,
            reltermfreq,
            wqf: wqf.max(1),
            query_length: self.query_length,
            wdf_upper_bound,
            doclength_lower_bound: self.generation.doclen_lower,
        }
    }

    fn make_weight(&mut self, stats: &WeightStats, factor: f64) -> Option<Box<dyn Weight>> {
        if factor == 0.0 {
            return None;
        }
        self.total_subqs += 1;
        let mut weight = self.weight.clone_box();
        weight.init(stats, factor);
        Some(weight)
    }

    /// Relevant documents indexed by any of `terms`.
    fn reltermfreq(&self, terms: &[Vec<u8>]) -> DocCount {
        let Some(rset) = self.rset else {
            return 0;
        };
        rset.iter()
            .filter(|docid| {
                self.generation
                    .docs
                    .get(docid)
                    .is_some_and(|doc| terms.iter().any(|t| doc.content.terms.contains_key(t)))
            })
            .count() as DocCount
    }

    // ── Wildcards and synonyms ──────────────────────────────────────

    /// Terms matching `wildcard`, honouring its expansion limit.
    fn expand(&self, wildcard: &Wildcard) -> Result<Vec<Vec<u8>>> {
        let mut terms: Vec<(Vec<u8>, DocCount)> = self
            .generation
            .terms_with_prefix(&wildcard.pattern)
            .map(|(term, list)| (term.clone(), list.termfreq()))
            .collect();
        let max = wildcard.max_expansion as usize;
        if max > 0 && terms.len() > max {
            let pattern = escape_bytes(&wildcard.pattern);
            match wildcard.limit {
                WildcardLimit::Error => {
                    return Err(QuarryError::wildcard(format!(
                        "Wildcard {pattern}* expands to more than {max} terms"
                    )));
                }
                WildcardLimit::First => terms.truncate(max),
                WildcardLimit::MostFrequent => {
                    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                    terms.truncate(max);
                    terms.sort();
                }
            }
            log::debug!("wildcard {pattern}* limited to {max} terms");
        }
        Ok(terms.into_iter().map(|(term, _)| term).collect())
    }

    fn wildcard(&mut self, wildcard: &Wildcard, factor: f64) -> Result<Sub> {
        let terms = self.expand(wildcard)?;
        let dbsize = self.dbsize();
        match wildcard.combiner {
            Op::Synonym => {
                let subs = terms.iter().map(|t| self.term(t, 1, 0.0)).collect();
                Ok(self.synonym(subs, &terms, 1, factor))
            }
            combiner => {
                let subs = terms.iter().map(|t| self.term(t, 1, factor)).collect();
                let combine = if combiner == Op::Max { Combine::Max } else { Combine::Sum };
                Ok(Box::new(OrPostList::new(subs, dbsize, combine)))
            }
        }
    }

    /// Weigh the union of `subs` as one term made of `terms`.
    fn synonym(&mut self, subs: Vec<Sub>, terms: &[Vec<u8>], wqf: TermCount, factor: f64) -> Sub {
        let inner = OrPostList::new(subs, self.dbsize(), Combine::Sum);
        let termfreq = inner.termfreq_est().max(inner.termfreq_min());
        let wdf_upper: TermCount = terms
            .iter()
            .filter_map(|t| self.generation.postings.get(t))
            .map(|list| list.wdf_upper)
            .fold(0, TermCount::saturating_add);
        let doclen_upper = TermCount::try_from(self.generation.doclen_upper).unwrap_or(TermCount::MAX);
        let stats = self.stats(termfreq, self.reltermfreq(terms), wqf, wdf_upper.min(doclen_upper));
        let weight = self.make_weight(&stats, factor);
        Box::new(SynonymPostList::new(inner, weight, Arc::clone(self.generation)))
    }

    // ── Branches ────────────────────────────────────────────────────

    fn branch(&mut self, op: Op, parameter: TermCount, subqueries: &[Query], factor: f64) -> Result<Sub> {
        let dbsize = self.dbsize();
        let Some((first, rest)) = subqueries.split_first() else {
            return Ok(Box::new(EmptyPostList));
        };
        let list: Sub = match op {
            Op::And => Box::new(AndPostList::new(self.build_all(subqueries, factor)?, dbsize, None)),
            Op::Or => Box::new(OrPostList::new(
                self.build_all(subqueries, factor)?,
                dbsize,
                Combine::Sum,
            )),
            Op::Max => Box::new(OrPostList::new(
                self.build_all(subqueries, factor)?,
                dbsize,
                Combine::Max,
            )),
            Op::Xor => Box::new(XorPostList::new(self.build_all(subqueries, factor)?, dbsize)),
            Op::Filter => {
                let mut subs = vec![self.build(first, factor)?];
                subs.extend(self.build_all(rest, 0.0)?);
                Box::new(AndPostList::new(subs, dbsize, None))
            }
            Op::AndNot => {
                let left = self.build(first, factor)?;
                let right = self.union(rest, 0.0)?;
                Box::new(AndNotPostList::new(left, right, dbsize))
            }
            Op::AndMaybe => {
                let left = self.build(first, factor)?;
                let right = self.union(rest, factor)?;
                Box::new(AndMaybePostList::new(left, right))
            }
            Op::Near | Op::Phrase => {
                let subs = self.build_all(subqueries, factor)?;
                // Without positional data the best we can do is AND.
                let positional = if !self.generation.has_positions() {
                    None
                } else if op == Op::Phrase {
                    Some(Positional::Phrase(parameter))
                } else {
                    Some(Positional::Near(parameter))
                };
                Box::new(AndPostList::new(subs, dbsize, positional))
            }
            Op::EliteSet => {
                let mut subs = self.build_all(subqueries, factor)?;
                let size = parameter as usize;
                if subs.len() > size {
                    subs.sort_by(|a, b| b.max_weight().total_cmp(&a.max_weight()));
                    subs.truncate(size);
                }
                Box::new(OrPostList::new(subs, dbsize, Combine::Sum))
            }
            Op::Synonym => {
                let subs = self.build_all(subqueries, 0.0)?;
                let mut terms: Vec<Vec<u8>> =
                    subqueries.iter().flat_map(Query::unique_terms).collect();
                terms.sort();
                terms.dedup();
                let wqf = subqueries.iter().map(Query::get_length).sum();
                self.synonym(subs, &terms, wqf, factor)
            }
            _ => {
                return Err(QuarryError::invalid_operation(format!(
                    "{op:?} can't combine subqueries"
                )));
            }
        };
        Ok(list)
    }
}
