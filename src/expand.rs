//! Query expansion: suggesting terms from a set of relevant documents.
//!
//! Every term indexing a document of the [`RSet`] is a candidate. With
//! `N` documents, `R` relevant ones, `n` documents indexing the term and
//! `r` relevant documents indexing it, a candidate is weighed as
//!
//! ```text
//! tw     = (r + ½)(N − n − R + r + ½) / ((R − r + ½)(n − r + ½))
//! weight = ln(tw) · (k + 1) · rcf / (k · rtotlen / (avlen · r) + rcf)
//! ```
//!
//! where `rcf` is the term's total wdf over the relevant documents (a zero
//! wdf counts as 1), `rtotlen` their total length and `k` is 1.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;

use crate::enquire::RSet;
use crate::error::Result;
use crate::storage::Generation;
use crate::util::escape::escape_bytes;
use crate::DocCount;

const EXPAND_K: f64 = 1.0;

/// Options for [`Enquire::get_eset_with`](crate::Enquire::get_eset_with).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpandFlags(u32);

impl ExpandFlags {
    pub const NONE: ExpandFlags = ExpandFlags(0);
    /// Also suggest terms which are already in the query.
    pub const INCLUDE_QUERY_TERMS: ExpandFlags = ExpandFlags(1);
    /// Use exact term frequencies. Frequencies are always exact for a
    /// single database, so this only exists for compatibility.
    pub const USE_EXACT_TERMFREQ: ExpandFlags = ExpandFlags(2);

    pub fn contains(self, other: ExpandFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ExpandFlags {
    type Output = ExpandFlags;

    fn bitor(self, rhs: ExpandFlags) -> ExpandFlags {
        ExpandFlags(self.0 | rhs.0)
    }
}

/// Filters the terms offered for expansion. Errors abort the expansion.
pub trait ExpandDecider: Send + Sync {
    fn accept(&self, term: &[u8]) -> Result<bool>;
}

impl<F> ExpandDecider for F
where
    F: Fn(&[u8]) -> Result<bool> + Send + Sync,
{
    fn accept(&self, term: &[u8]) -> Result<bool> {
        self(term)
    }
}

/// Accepts only terms starting with a prefix.
#[derive(Debug, Clone)]
pub struct ExpandDeciderFilterPrefix {
    prefix: Vec<u8>,
}

impl ExpandDeciderFilterPrefix {
    pub fn new<P: Into<Vec<u8>>>(prefix: P) -> Self {
        ExpandDeciderFilterPrefix {
            prefix: prefix.into(),
        }
    }
}

impl ExpandDecider for ExpandDeciderFilterPrefix {
    fn accept(&self, term: &[u8]) -> Result<bool> {
        Ok(term.starts_with(&self.prefix))
    }
}

/// A suggested term.
#[derive(Debug, Clone, PartialEq)]
pub struct ESetItem {
    term: Vec<u8>,
    weight: f64,
}

impl ESetItem {
    pub fn term(&self) -> &[u8] {
        &self.term
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// Expansion terms, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ESet {
    items: Vec<ESetItem>,
    ebound: DocCount,
}

impl ESet {
    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ESetItem> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ESetItem> {
        self.items.get(index)
    }

    /// Number of candidate terms considered.
    pub fn get_ebound(&self) -> DocCount {
        self.ebound
    }

    pub fn get_description(&self) -> String {
        let items: Vec<String> = self
            .items
            .iter()
            .map(|item| format!("{}:{:.4}", escape_bytes(&item.term), item.weight))
            .collect();
        format!("ESet(ebound={}, items=[{}])", self.ebound, items.join(", "))
    }
}

impl<'a> IntoIterator for &'a ESet {
    type Item = &'a ESetItem;
    type IntoIter = std::slice::Iter<'a, ESetItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Display for ESet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_description())
    }
}

#[derive(Debug, Default)]
struct RelevantStats {
    rtermfreq: DocCount,
    rcollection_freq: u64,
    rtotlen: u64,
}

/// Parameters of one expansion.
pub(crate) struct ExpandRequest<'a> {
    pub maxitems: usize,
    pub flags: ExpandFlags,
    pub decider: Option<&'a dyn ExpandDecider>,
    pub min_weight: f64,
    /// Sorted terms of the current query.
    pub query_terms: &'a [Vec<u8>],
}

pub(crate) fn expand(generation: &Generation, rset: &RSet, request: &ExpandRequest<'_>) -> Result<ESet> {
    let mut stats: BTreeMap<&[u8], RelevantStats> = BTreeMap::new();
    for docid in rset.iter() {
        let doc = generation.doc(docid)?;
        for (term, entry) in &doc.content.terms {
            let stat = stats.entry(term.as_slice()).or_default();
            stat.rtermfreq += 1;
            stat.rcollection_freq += u64::from(entry.wdf.max(1));
            stat.rtotlen += doc.length;
        }
    }

    let dbsize = generation.doc_count() as f64;
    let rsize = rset.size() as f64;
    let avlen = generation.avlength();
    let include_query_terms = request.flags.contains(ExpandFlags::INCLUDE_QUERY_TERMS);

    let mut ebound: DocCount = 0;
    let mut items = Vec::new();
    for (term, stat) in stats {
        if !include_query_terms && request.query_terms.binary_search_by(|t| t.as_slice().cmp(term)).is_ok() {
            continue;
        }
        if let Some(decider) = request.decider {
            if !decider.accept(term)? {
                continue;
            }
        }
        ebound += 1;

        let n = generation.termfreq(term) as f64;
        let r = stat.rtermfreq as f64;
        let tw = ((r + 0.5) * (dbsize - n - rsize + r + 0.5)) / ((rsize - r + 0.5) * (n - r + 0.5));
        if tw <= 0.0 || avlen <= 0.0 {
            continue;
        }
        let rcf = stat.rcollection_freq as f64;
        let multiplier =
            (EXPAND_K + 1.0) * rcf / (EXPAND_K * stat.rtotlen as f64 / (avlen * r) + rcf);
        let weight = tw.ln() * multiplier;
        if weight > request.min_weight {
            items.push(ESetItem {
                term: term.to_vec(),
                weight,
            });
        }
    }

    items.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.term.cmp(&b.term)));
    items.truncate(request.maxitems);
    log::debug!("expanded {} relevant documents into {} terms", rset.size(), items.len());
    Ok(ESet { items, ebound })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::Document;
    use crate::error::QuarryError;
    use uuid::Uuid;

    fn generation() -> Generation {
        let mut generation = Generation::new(Uuid::new_v4());
        let docs = [
            (1, "rust borrow checker rust"),
            (2, "rust cargo"),
            (3, "python pip"),
            (4, "python rust"),
            (5, "java maven"),
        ];
        for (docid, text) in docs {
            let mut doc = Document::new();
            for word in text.split(' ') {
                doc.add_term(word, 1).unwrap();
            }
            generation.put_document(docid, Arc::clone(doc.content()));
        }
        generation
    }

    fn request<'a>(query_terms: &'a [Vec<u8>], flags: ExpandFlags) -> ExpandRequest<'a> {
        ExpandRequest {
            maxitems: 10,
            flags,
            decider: None,
            min_weight: 0.0,
            query_terms,
        }
    }

    fn terms(eset: &ESet) -> Vec<String> {
        eset.iter()
            .map(|item| String::from_utf8_lossy(item.term()).into_owned())
            .collect()
    }

    #[test]
    fn test_query_terms_excluded_by_default() {
        let generation = generation();
        let mut rset = RSet::new();
        rset.add_document(1);
        rset.add_document(2);
        let query_terms = vec![b"rust".to_vec()];

        let eset = expand(&generation, &rset, &request(&query_terms, ExpandFlags::NONE)).unwrap();
        assert!(!terms(&eset).contains(&"rust".to_string()));
        assert_eq!(eset.get_ebound(), 3);

        let with = expand(
            &generation,
            &rset,
            &request(&query_terms, ExpandFlags::INCLUDE_QUERY_TERMS | ExpandFlags::USE_EXACT_TERMFREQ),
        )
        .unwrap();
        assert!(terms(&with).contains(&"rust".to_string()));
        let weights: Vec<f64> = with.iter().map(ESetItem::weight).collect();
        assert!(weights.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_decider_and_errors() {
        let generation = generation();
        let mut rset = RSet::new();
        rset.add_document(1);
        let decider = ExpandDeciderFilterPrefix::new("b");
        let mut req = request(&[], ExpandFlags::NONE);
        req.decider = Some(&decider);
        let eset = expand(&generation, &rset, &req).unwrap();
        assert_eq!(terms(&eset), vec!["borrow"]);

        let failing = |_: &[u8]| -> Result<bool> { Err(QuarryError::callback("no")) };
        req.decider = Some(&failing);
        assert!(matches!(expand(&generation, &rset, &req), Err(QuarryError::Callback(_))));

        rset.add_document(99);
        req.decider = None;
        assert!(matches!(expand(&generation, &rset, &req), Err(QuarryError::DocNotFound(99))));
    }
}
