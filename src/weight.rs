//! Weighting schemes.
//!
//! A scheme is handed to [`Enquire`](crate::Enquire) as a prototype. For
//! each weighted leaf of the query the matcher clones the prototype and
//! initialises the clone with that leaf's statistics, then asks it for a
//! per-document contribution:
//!
//! ```text
//! weight(doc) = Σ leaves sumpart(wdf, doclen) + sumextra(doclen)
//! bound       = Σ leaves maxpart()            + maxextra()
//! ```

use std::fmt;

use crate::{DocCount, TermCount};

/// Statistics about one query leaf and the collection it is matched against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightStats {
    /// Number of documents in the database.
    pub collection_size: DocCount,
    /// Number of documents in the relevance set.
    pub rset_size: DocCount,
    pub average_length: f64,
    /// Documents indexed by the term.
    pub termfreq: DocCount,
    /// Relevant documents indexed by the term.
    pub reltermfreq: DocCount,
    /// Within-query frequency of the term.
    pub wqf: TermCount,
    /// Total length of the query.
    pub query_length: TermCount,
    pub wdf_upper_bound: TermCount,
    pub doclength_lower_bound: u64,
}

/// A weighting scheme.
pub trait Weight: Send + Sync {
    /// A fresh copy of this scheme with the same parameters.
    fn clone_box(&self) -> Box<dyn Weight>;

    /// Prepare to weight one leaf. `factor` is the product of the
    /// `SCALE_WEIGHT` factors above the leaf.
    fn init(&mut self, stats: &WeightStats, factor: f64);

    /// Contribution of the leaf to a document's weight.
    fn sumpart(&self, wdf: TermCount, doclength: u64) -> f64;

    /// Upper bound on [`sumpart`](Self::sumpart).
    fn maxpart(&self) -> f64;

    /// Per-document weight independent of the leaves.
    fn sumextra(&self, _doclength: u64) -> f64 {
        0.0
    }

    fn maxextra(&self) -> f64 {
        0.0
    }

    fn name(&self) -> &str;
}

impl fmt::Debug for dyn Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── BM25 ──────────────────────────────────────────────────────────────

/// Parameters of [`BM25Weight`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BM25Params {
    /// How quickly wdf saturates.
    pub k1: f64,
    /// Weight given to the document length correction.
    pub k2: f64,
    /// How quickly wqf saturates.
    pub k3: f64,
    /// Strength of document length normalisation, in `[0, 1]`.
    pub b: f64,
    /// Floor on the normalised document length.
    pub min_normlen: f64,
}

impl Default for BM25Params {
    fn default() -> Self {
        BM25Params {
            k1: 1.0,
            k2: 0.0,
            k3: 1.0,
            b: 0.5,
            min_normlen: 0.5,
        }
    }
}

impl BM25Params {
    pub fn with_k1(mut self, k1: f64) -> Self {
        self.k1 = k1;
        self
    }

    pub fn with_k2(mut self, k2: f64) -> Self {
        self.k2 = k2;
        self
    }

    pub fn with_k3(mut self, k3: f64) -> Self {
        self.k3 = k3;
        self
    }

    pub fn with_b(mut self, b: f64) -> Self {
        self.b = b;
        self
    }

    pub fn with_min_normlen(mut self, min_normlen: f64) -> Self {
        self.min_normlen = min_normlen;
        self
    }

    /// Negative values become 0 and `b` is clamped to `[0, 1]`.
    fn sanitised(self) -> Self {
        BM25Params {
            k1: self.k1.max(0.0),
            k2: self.k2.max(0.0),
            k3: self.k3.max(0.0),
            b: self.b.clamp(0.0, 1.0),
            min_normlen: self.min_normlen.max(0.0),
        }
    }
}

/// Okapi BM25.
#[derive(Debug, Clone)]
pub struct BM25Weight {
    params: BM25Params,
    termweight: f64,
    len_factor: f64,
    wdf_upper_bound: f64,
    doclength_lower_bound: f64,
    query_length: f64,
}

impl Default for BM25Weight {
    fn default() -> Self {
        BM25Weight::new(BM25Params::default())
    }
}

impl BM25Weight {
    pub fn new(params: BM25Params) -> Self {
        BM25Weight {
            params: params.sanitised(),
            termweight: 0.0,
            len_factor: 0.0,
            wdf_upper_bound: 0.0,
            doclength_lower_bound: 0.0,
            query_length: 0.0,
        }
    }

    pub fn params(&self) -> &BM25Params {
        &self.params
    }

    fn normlen(&self, doclength: f64) -> f64 {
        (doclength * self.len_factor).max(self.params.min_normlen)
    }
}

impl Weight for BM25Weight {
    fn clone_box(&self) -> Box<dyn Weight> {
        Box::new(BM25Weight::new(self.params))
    }

    fn init(&mut self, stats: &WeightStats, factor: f64) {
        let p = self.params;
        let n = stats.collection_size as f64;
        let tf = stats.termfreq as f64;

        let mut tw = if stats.rset_size != 0 {
            let r = stats.reltermfreq as f64;
            let reldocs_not_indexed = (stats.rset_size - stats.reltermfreq.min(stats.rset_size)) as f64;
            let q = n - reldocs_not_indexed;
            let nonreldocs_indexed = tf - r;
            ((r + 0.5) * (q - tf + 0.5)) / ((reldocs_not_indexed + 0.5) * (nonreldocs_indexed + 0.5))
        } else {
            (n - tf + 0.5) / (tf + 0.5)
        };
        // Keep terms indexing most of the collection slightly positive.
        if tw < 2.0 {
            tw = tw * 0.5 + 1.0;
        }

        let mut termweight = tw.ln() * factor;
        if p.k3 != 0.0 {
            let wqf = f64::from(stats.wqf);
            termweight *= (p.k3 + 1.0) * wqf / (p.k3 + wqf);
        }
        self.termweight = termweight * (p.k1 + 1.0);

        self.len_factor = if p.k2 == 0.0 && (p.b == 0.0 || p.k1 == 0.0) {
            0.0
        } else if stats.average_length > 0.0 {
            1.0 / stats.average_length
        } else {
            0.0
        };
        self.wdf_upper_bound = f64::from(stats.wdf_upper_bound);
        self.doclength_lower_bound = stats.doclength_lower_bound as f64;
        self.query_length = f64::from(stats.query_length);
    }

    fn sumpart(&self, wdf: TermCount, doclength: u64) -> f64 {
        let p = &self.params;
        let wdf = f64::from(wdf);
        let normlen = self.normlen(doclength as f64);
        let denom = p.k1 * (normlen * p.b + (1.0 - p.b)) + wdf;
        if denom <= 0.0 {
            return 0.0;
        }
        self.termweight * (wdf / denom)
    }

    fn maxpart(&self) -> f64 {
        let p = &self.params;
        let mut denom = p.k1;
        if p.k1 != 0.0 && p.b != 0.0 {
            let normlen = self.normlen(self.wdf_upper_bound.max(self.doclength_lower_bound));
            denom *= normlen * p.b + (1.0 - p.b);
        }
        denom += self.wdf_upper_bound;
        if denom <= 0.0 {
            return 0.0;
        }
        self.termweight * (self.wdf_upper_bound / denom)
    }

    fn sumextra(&self, doclength: u64) -> f64 {
        if self.params.k2 == 0.0 {
            return 0.0;
        }
        2.0 * self.params.k2 * self.query_length / (1.0 + self.normlen(doclength as f64))
    }

    fn maxextra(&self) -> f64 {
        if self.params.k2 == 0.0 {
            return 0.0;
        }
        2.0 * self.params.k2 * self.query_length / (1.0 + self.normlen(self.doclength_lower_bound))
    }

    fn name(&self) -> &str {
        "BM25Weight"
    }
}

// ── Boolean ───────────────────────────────────────────────────────────

/// Gives every match weight 0, so results come out in docid order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolWeight;

impl Weight for BoolWeight {
    fn clone_box(&self) -> Box<dyn Weight> {
        Box::new(BoolWeight)
    }

    fn init(&mut self, _stats: &WeightStats, _factor: f64) {}

    fn sumpart(&self, _wdf: TermCount, _doclength: u64) -> f64 {
        0.0
    }

    fn maxpart(&self) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "BoolWeight"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> WeightStats {
        WeightStats {
            collection_size: 100,
            average_length: 10.0,
            termfreq: 5,
            wqf: 1,
            query_length: 1,
            wdf_upper_bound: 4,
            doclength_lower_bound: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_bm25_sumpart() {
        let mut weight = BM25Weight::default();
        weight.init(&stats(), 1.0);
        let tw = ((100.0 - 5.0 + 0.5) / 5.5f64).ln() * 2.0;
        let expected = tw * (2.0 / (1.0 * (1.0 * 0.5 + 0.5) + 2.0));
        assert!((weight.sumpart(2, 10) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_bm25_maxpart_bounds_sumpart() {
        let mut weight = BM25Weight::default();
        weight.init(&stats(), 1.0);
        let max = weight.maxpart();
        for wdf in 1..=4 {
            for len in [2, 5, 10, 40] {
                assert!(weight.sumpart(wdf, len) <= max + 1e-12);
            }
        }
    }

    #[test]
    fn test_bm25_factor_scales_exactly() {
        let mut plain = BM25Weight::default();
        plain.init(&stats(), 1.0);
        let mut scaled = BM25Weight::default();
        scaled.init(&stats(), 2.5);
        assert!((scaled.sumpart(3, 7) - plain.sumpart(3, 7) * 2.5).abs() < 1e-12);
        let mut zero = BM25Weight::default();
        zero.init(&stats(), 0.0);
        assert_eq!(zero.sumpart(3, 7), 0.0);
    }

    #[test]
    fn test_common_terms_stay_positive() {
        let mut weight = BM25Weight::default();
        let mut common = stats();
        common.termfreq = 90;
        weight.init(&common, 1.0);
        assert!(weight.sumpart(1, 10) > 0.0);
    }

    #[test]
    fn test_params_are_sanitised() {
        let weight = BM25Weight::new(BM25Params::default().with_b(3.0).with_k1(-1.0));
        assert_eq!(weight.params().b, 1.0);
        assert_eq!(weight.params().k1, 0.0);
    }

    #[test]
    fn test_bool_weight() {
        let mut weight = BoolWeight;
        weight.init(&stats(), 3.0);
        assert_eq!(weight.sumpart(5, 5), 0.0);
        assert_eq!(weight.clone_box().name(), "BoolWeight");
    }
}
