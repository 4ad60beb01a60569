//! The query tree.
//!
//! A [`Query`] is an immutable, cheaply cloneable expression. Construction
//! normalises as it goes, so the tree you get back is already in canonical
//! form:
//!
//! ```text
//! a AND MatchNothing          → MatchNothing
//! a OR MatchNothing           → a
//! MatchNothing AND_NOT b      → MatchNothing
//! a AND_NOT (2 * b)           → (a AND_NOT b)
//! OR of a single subquery     → the subquery
//! 3 * MatchNothing            → MatchNothing
//! VALUE_RANGE with lo > hi    → MatchNothing
//! ```
//!
//! Descriptions are stable and round out the canonical form, e.g.
//! `Query((a OR b))`, `Query(5 * foo)`, `Query(VALUE_RANGE 1 a b)`.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor};
use std::sync::Arc;

use crate::error::{QuarryError, Result};
use crate::iterator::TermIterator;
use crate::posting_source::{PostingSource, Registry};
use crate::util::escape::escape_bytes;
use crate::util::pack::{Packer, Unpacker};
use crate::{TermCount, TermPos, ValueNo};

/// Query operators, plus the leaf types reported by [`Query::get_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    And,
    Or,
    AndNot,
    Xor,
    AndMaybe,
    Filter,
    Near,
    Phrase,
    ValueRange,
    ScaleWeight,
    EliteSet,
    ValueGe,
    ValueLe,
    Synonym,
    Max,
    Wildcard,
    LeafTerm,
    LeafPostingSource,
    LeafMatchAll,
    LeafMatchNothing,
}

impl Op {
    const ALL: [Op; 20] = [
        Op::And,
        Op::Or,
        Op::AndNot,
        Op::Xor,
        Op::AndMaybe,
        Op::Filter,
        Op::Near,
        Op::Phrase,
        Op::ValueRange,
        Op::ScaleWeight,
        Op::EliteSet,
        Op::ValueGe,
        Op::ValueLe,
        Op::Synonym,
        Op::Max,
        Op::Wildcard,
        Op::LeafTerm,
        Op::LeafPostingSource,
        Op::LeafMatchAll,
        Op::LeafMatchNothing,
    ];

    fn code(self) -> u8 {
        Op::ALL.iter().position(|op| *op == self).unwrap_or(0) as u8
    }

    fn from_code(code: u8) -> Result<Op> {
        Op::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| QuarryError::serialisation(format!("Unknown query operator {code}")))
    }

    fn separator(self) -> &'static str {
        match self {
            Op::And => " AND ",
            Op::Or => " OR ",
            Op::AndNot => " AND_NOT ",
            Op::Xor => " XOR ",
            Op::AndMaybe => " AND_MAYBE ",
            Op::Filter => " FILTER ",
            Op::Near => " NEAR ",
            Op::Phrase => " PHRASE ",
            Op::EliteSet => " ELITE_SET ",
            Op::Synonym => " SYNONYM ",
            Op::Max => " MAX ",
            _ => " ",
        }
    }

    fn is_and_like(self) -> bool {
        matches!(self, Op::And | Op::Filter | Op::Near | Op::Phrase)
    }

    fn is_positional(self) -> bool {
        matches!(self, Op::Near | Op::Phrase)
    }
}

/// What to do when a wildcard matches more terms than `max_expansion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WildcardLimit {
    /// Fail the match with a wildcard error.
    #[default]
    Error,
    /// Use the first `max_expansion` terms in byte order.
    First,
    /// Use the `max_expansion` terms with the highest term frequency.
    MostFrequent,
}

impl WildcardLimit {
    fn code(self) -> u8 {
        match self {
            WildcardLimit::Error => 0,
            WildcardLimit::First => 1,
            WildcardLimit::MostFrequent => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(WildcardLimit::Error),
            1 => Ok(WildcardLimit::First),
            2 => Ok(WildcardLimit::MostFrequent),
            _ => Err(QuarryError::serialisation("Bad wildcard limit")),
        }
    }
}

/// Parameters of a wildcard leaf.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Wildcard {
    pub pattern: Vec<u8>,
    /// 0 means unlimited.
    pub max_expansion: TermCount,
    pub limit: WildcardLimit,
    pub combiner: Op,
}

pub(crate) enum Node {
    /// The empty term is MatchAll.
    Term {
        term: Vec<u8>,
        wqf: TermCount,
        pos: TermPos,
    },
    Source(Arc<dyn PostingSource>),
    Scale {
        factor: f64,
        subquery: Query,
    },
    ValueRange {
        slot: ValueNo,
        begin: Vec<u8>,
        end: Vec<u8>,
    },
    ValueGe {
        slot: ValueNo,
        limit: Vec<u8>,
    },
    ValueLe {
        slot: ValueNo,
        limit: Vec<u8>,
    },
    Wildcard(Wildcard),
    Branch {
        op: Op,
        parameter: TermCount,
        subqueries: Vec<Query>,
    },
}

/// Default set size of `ELITE_SET`.
const DEFAULT_ELITE_SET_SIZE: TermCount = 10;

/// Deepest operator nesting accepted by [`Query::unserialise`].
const MAX_UNPACK_DEPTH: usize = 512;

/// A query expression. The default query is MatchNothing.
#[derive(Clone, Default)]
pub struct Query {
    node: Option<Arc<Node>>,
}

impl Query {
    fn from_node(node: Node) -> Query {
        Query {
            node: Some(Arc::new(node)),
        }
    }

    pub(crate) fn node(&self) -> Option<&Node> {
        self.node.as_deref()
    }

    // ── Leaves ──────────────────────────────────────────────────────

    /// Matches every document, with zero weight.
    pub fn match_all() -> Query {
        Query::term(b"")
    }

    /// Matches nothing.
    pub fn match_nothing() -> Query {
        Query::default()
    }

    pub fn term<T: AsRef<[u8]>>(term: T) -> Query {
        Query::term_with(term, 1, 0)
    }

    /// A term with a within-query frequency and a query position (0 for
    /// none).
    pub fn term_with<T: AsRef<[u8]>>(term: T, wqf: TermCount, pos: TermPos) -> Query {
        Query::from_node(Node::Term {
            term: term.as_ref().to_vec(),
            wqf,
            pos,
        })
    }

    pub fn posting_source<S: PostingSource + 'static>(source: S) -> Query {
        Query::from_node(Node::Source(Arc::new(source)))
    }

    pub(crate) fn from_source(source: Arc<dyn PostingSource>) -> Query {
        Query::from_node(Node::Source(source))
    }

    /// Documents whose value in `slot` lies in `[begin, end]`.
    ///
    /// An empty `begin` is the same as [`value_le`](Self::value_le); a range
    /// with `begin > end` matches nothing.
    pub fn value_range<B: AsRef<[u8]>, E: AsRef<[u8]>>(slot: ValueNo, begin: B, end: E) -> Query {
        let (begin, end) = (begin.as_ref(), end.as_ref());
        if begin.is_empty() {
            return Query::value_le(slot, end);
        }
        if begin > end {
            return Query::match_nothing();
        }
        Query::from_node(Node::ValueRange {
            slot,
            begin: begin.to_vec(),
            end: end.to_vec(),
        })
    }

    /// Documents whose value in `slot` is `>= limit`. An empty limit matches
    /// every document.
    pub fn value_ge<L: AsRef<[u8]>>(slot: ValueNo, limit: L) -> Query {
        if limit.as_ref().is_empty() {
            return Query::match_all();
        }
        Query::from_node(Node::ValueGe {
            slot,
            limit: limit.as_ref().to_vec(),
        })
    }

    pub fn value_le<L: AsRef<[u8]>>(slot: ValueNo, limit: L) -> Query {
        Query::from_node(Node::ValueLe {
            slot,
            limit: limit.as_ref().to_vec(),
        })
    }

    /// Terms starting with `prefix`, combined with `SYNONYM`, unlimited.
    pub fn wildcard<P: AsRef<[u8]>>(prefix: P) -> Query {
        Query::from_node(Node::Wildcard(Wildcard {
            pattern: prefix.as_ref().to_vec(),
            max_expansion: 0,
            limit: WildcardLimit::Error,
            combiner: Op::Synonym,
        }))
    }

    /// Wildcard with an expansion limit. `combiner` must be `Synonym`, `Max`
    /// or `Or`.
    pub fn wildcard_with<P: AsRef<[u8]>>(
        prefix: P,
        max_expansion: TermCount,
        limit: WildcardLimit,
        combiner: Op,
    ) -> Result<Query> {
        if !matches!(combiner, Op::Synonym | Op::Max | Op::Or) {
            return Err(QuarryError::invalid_argument(
                "combiner must be OP_SYNONYM or OP_MAX or OP_OR",
            ));
        }
        Ok(Query::from_node(Node::Wildcard(Wildcard {
            pattern: prefix.as_ref().to_vec(),
            max_expansion,
            limit,
            combiner,
        })))
    }

    // ── Operators ───────────────────────────────────────────────────

    /// Combine `subqueries` with `op`.
    pub fn new<I>(op: Op, subqueries: I) -> Result<Query>
    where
        I: IntoIterator<Item = Query>,
    {
        Query::with_parameter(op, subqueries, 0)
    }

    /// Combine with a window size (`Near`, `Phrase`) or set size
    /// (`EliteSet`).
    pub fn with_parameter<I>(op: Op, subqueries: I, parameter: TermCount) -> Result<Query>
    where
        I: IntoIterator<Item = Query>,
    {
        if parameter > 0 && !matches!(op, Op::Near | Op::Phrase | Op::EliteSet) {
            return Err(QuarryError::invalid_argument(
                "parameter only valid with OP_NEAR, OP_PHRASE or OP_ELITE_SET",
            ));
        }
        if !matches!(
            op,
            Op::And
                | Op::Or
                | Op::AndNot
                | Op::Xor
                | Op::AndMaybe
                | Op::Filter
                | Op::Near
                | Op::Phrase
                | Op::EliteSet
                | Op::Synonym
                | Op::Max
        ) {
            return Err(QuarryError::invalid_argument(
                "op not valid with a list of subqueries",
            ));
        }

        let mut accepted = Vec::new();
        for subquery in subqueries {
            if op.is_positional() {
                match subquery.get_type() {
                    Op::LeafTerm | Op::Or => {}
                    Op::LeafPostingSource | Op::LeafMatchAll | Op::LeafMatchNothing => {
                        add_subquery(op, &mut accepted, Query::match_nothing());
                        continue;
                    }
                    _ => {
                        return Err(QuarryError::unimplemented(
                            "OP_NEAR and OP_PHRASE only currently support leaf subqueries",
                        ));
                    }
                }
            }
            add_subquery(op, &mut accepted, subquery);
        }
        Ok(finish_branch(op, parameter, accepted))
    }

    /// Multiply the weight of `subquery` by `factor`, which must be `>= 0`.
    pub fn scale_weight(factor: f64, subquery: Query) -> Result<Query> {
        if factor.is_nan() || factor < 0.0 {
            return Err(QuarryError::invalid_argument(
                "OP_SCALE_WEIGHT requires factor >= 0",
            ));
        }
        Ok(match subquery.get_type() {
            Op::LeafMatchNothing => Query::match_nothing(),
            // These always weigh 0.
            Op::ValueRange | Op::ValueGe | Op::ValueLe => subquery,
            _ => Query::from_node(Node::Scale { factor, subquery }),
        })
    }

    /// `self AND_NOT other`.
    pub fn and_not(self, other: Query) -> Query {
        build(Op::AndNot, 0, [self, other])
    }

    /// `self AND_MAYBE other`.
    pub fn and_maybe(self, other: Query) -> Query {
        build(Op::AndMaybe, 0, [self, other])
    }

    /// `self FILTER other`.
    pub fn filter(self, other: Query) -> Query {
        build(Op::Filter, 0, [self, other])
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Whether this is MatchNothing.
    pub fn is_empty(&self) -> bool {
        self.node.is_none()
    }

    pub fn get_type(&self) -> Op {
        match self.node() {
            None => Op::LeafMatchNothing,
            Some(Node::Term { term, .. }) if term.is_empty() => Op::LeafMatchAll,
            Some(Node::Term { .. }) => Op::LeafTerm,
            Some(Node::Source(_)) => Op::LeafPostingSource,
            Some(Node::Scale { .. }) => Op::ScaleWeight,
            Some(Node::ValueRange { .. }) => Op::ValueRange,
            Some(Node::ValueGe { .. }) => Op::ValueGe,
            Some(Node::ValueLe { .. }) => Op::ValueLe,
            Some(Node::Wildcard(_)) => Op::Wildcard,
            Some(Node::Branch { op, .. }) => *op,
        }
    }

    pub fn get_num_subqueries(&self) -> usize {
        match self.node() {
            Some(Node::Branch { subqueries, .. }) => subqueries.len(),
            Some(Node::Scale { .. }) => 1,
            _ => 0,
        }
    }

    pub fn get_subquery(&self, n: usize) -> Option<Query> {
        match self.node() {
            Some(Node::Branch { subqueries, .. }) => subqueries.get(n).cloned(),
            Some(Node::Scale { subquery, .. }) if n == 0 => Some(subquery.clone()),
            _ => None,
        }
    }

    /// Sum of the within-query frequencies of the terms.
    pub fn get_length(&self) -> TermCount {
        match self.node() {
            Some(Node::Term { wqf, .. }) => *wqf,
            Some(Node::Scale { subquery, .. }) => subquery.get_length(),
            Some(Node::Branch { subqueries, .. }) => {
                subqueries.iter().map(Query::get_length).sum()
            }
            _ => 0,
        }
    }

    fn gather_terms(&self, out: &mut Vec<(TermPos, Vec<u8>)>) {
        match self.node() {
            Some(Node::Term { term, pos, .. }) if !term.is_empty() => {
                out.push((*pos, term.clone()));
            }
            Some(Node::Scale { subquery, .. }) => subquery.gather_terms(out),
            Some(Node::Branch { subqueries, .. }) => {
                for subquery in subqueries {
                    subquery.gather_terms(out);
                }
            }
            _ => {}
        }
    }

    /// Distinct leaf terms in ascending byte order.
    pub fn terms(&self) -> TermIterator {
        TermIterator::plain(self.unique_terms())
    }

    pub(crate) fn unique_terms(&self) -> Vec<Vec<u8>> {
        let mut terms = Vec::new();
        self.gather_terms(&mut terms);
        let mut terms: Vec<Vec<u8>> = terms.into_iter().map(|(_, term)| term).collect();
        terms.sort();
        terms.dedup();
        terms
    }

    /// Leaf terms ordered by query position, then term. A term repeated
    /// at the same position appears once.
    pub fn terms_by_position(&self) -> TermIterator {
        let mut terms = Vec::new();
        self.gather_terms(&mut terms);
        terms.sort();
        terms.dedup();
        TermIterator::plain(terms.into_iter().map(|(_, term)| term).collect())
    }

    /// Distinct leaf terms in order of first appearance by position.
    pub(crate) fn terms_in_query_order(&self) -> Vec<Vec<u8>> {
        let mut terms = Vec::new();
        self.gather_terms(&mut terms);
        terms.sort();
        let mut seen = std::collections::HashSet::new();
        terms
            .into_iter()
            .filter_map(|(_, term)| seen.insert(term.clone()).then_some(term))
            .collect()
    }

    // ── Description ─────────────────────────────────────────────────

    pub fn get_description(&self) -> String {
        format!("Query({})", self.describe())
    }

    fn describe(&self) -> String {
        let Some(node) = self.node() else {
            return String::new();
        };
        match node {
            Node::Term { term, wqf, pos } => {
                let mut desc = if term.is_empty() {
                    "<alldocuments>".to_string()
                } else {
                    escape_bytes(term)
                };
                if *wqf != 1 {
                    desc.push_str(&format!("#{wqf}"));
                }
                if *pos != 0 {
                    desc.push_str(&format!("@{pos}"));
                }
                desc
            }
            Node::Source(source) => format!("PostingSource({})", source.description()),
            Node::Scale { factor, subquery } => format!("{factor} * {}", subquery.describe()),
            Node::ValueRange { slot, begin, end } => format!(
                "VALUE_RANGE {slot} {} {}",
                escape_bytes(begin),
                escape_bytes(end)
            ),
            Node::ValueGe { slot, limit } => format!("VALUE_GE {slot} {}", escape_bytes(limit)),
            Node::ValueLe { slot, limit } => format!("VALUE_LE {slot} {}", escape_bytes(limit)),
            Node::Wildcard(wildcard) => {
                let combiner = match wildcard.combiner {
                    Op::Synonym => "SYNONYM",
                    Op::Max => "MAX",
                    _ => "OR",
                };
                format!("WILDCARD {combiner} {}", escape_bytes(&wildcard.pattern))
            }
            Node::Branch {
                op,
                parameter,
                subqueries,
            } => {
                if *op == Op::Synonym && subqueries.len() == 1 {
                    return format!("(SYNONYM {})", subqueries[0].describe());
                }
                let mut separator = op.separator().to_string();
                if *parameter > 0 {
                    separator.push_str(&format!("{parameter} "));
                }
                let parts: Vec<String> = subqueries.iter().map(Query::describe).collect();
                format!("({})", parts.join(&separator))
            }
        }
    }

    // ── Serialisation ───────────────────────────────────────────────

    /// Opaque bytes which [`unserialise`](Self::unserialise) turns back into
    /// an identical query. Fails for posting sources without a name.
    pub fn serialise(&self) -> Result<Vec<u8>> {
        let mut packer = Packer::new();
        self.pack(&mut packer)?;
        Ok(packer.into_inner())
    }

    fn pack(&self, packer: &mut Packer) -> Result<()> {
        let Some(node) = self.node() else {
            packer.u8(Op::LeafMatchNothing.code());
            return Ok(());
        };
        match node {
            Node::Term { term, wqf, pos } => {
                packer
                    .u8(Op::LeafTerm.code())
                    .bytes(term)
                    .uint(u64::from(*wqf))
                    .uint(u64::from(*pos));
            }
            Node::Source(source) => {
                let name = source.name().ok_or_else(|| {
                    QuarryError::unimplemented(format!(
                        "{} has no name() so can't be serialised",
                        source.description()
                    ))
                })?;
                let params = source.serialise()?;
                packer
                    .u8(Op::LeafPostingSource.code())
                    .bytes(name.as_bytes())
                    .bytes(&params);
            }
            Node::Scale { factor, subquery } => {
                packer.u8(Op::ScaleWeight.code()).f64(*factor);
                subquery.pack(packer)?;
            }
            Node::ValueRange { slot, begin, end } => {
                packer
                    .u8(Op::ValueRange.code())
                    .uint(u64::from(*slot))
                    .bytes(begin)
                    .bytes(end);
            }
            Node::ValueGe { slot, limit } => {
                packer.u8(Op::ValueGe.code()).uint(u64::from(*slot)).bytes(limit);
            }
            Node::ValueLe { slot, limit } => {
                packer.u8(Op::ValueLe.code()).uint(u64::from(*slot)).bytes(limit);
            }
            Node::Wildcard(wildcard) => {
                packer
                    .u8(Op::Wildcard.code())
                    .bytes(&wildcard.pattern)
                    .uint(u64::from(wildcard.max_expansion))
                    .u8(wildcard.limit.code())
                    .u8(wildcard.combiner.code());
            }
            Node::Branch {
                op,
                parameter,
                subqueries,
            } => {
                packer
                    .u8(op.code())
                    .uint(u64::from(*parameter))
                    .uint(subqueries.len() as u64);
                for subquery in subqueries {
                    subquery.pack(packer)?;
                }
            }
        }
        Ok(())
    }

    /// Decode a serialised query, resolving posting sources with the
    /// built-in [`Registry`].
    pub fn unserialise(bytes: &[u8]) -> Result<Query> {
        Query::unserialise_with(bytes, &Registry::default())
    }

    pub fn unserialise_with(bytes: &[u8], registry: &Registry) -> Result<Query> {
        if bytes.is_empty() {
            return Ok(Query::match_nothing());
        }
        let mut unpacker = Unpacker::new(bytes);
        let query = Query::unpack(&mut unpacker, registry, 0)?;
        unpacker.finish()?;
        Ok(query)
    }

    fn unpack(unpacker: &mut Unpacker<'_>, registry: &Registry, depth: usize) -> Result<Query> {
        if depth > MAX_UNPACK_DEPTH {
            return Err(QuarryError::serialisation("Serialised query nested too deeply"));
        }
        let op = Op::from_code(unpacker.u8()?)?;
        let node = match op {
            Op::LeafMatchNothing => return Ok(Query::match_nothing()),
            Op::LeafTerm => Node::Term {
                term: unpacker.bytes()?.to_vec(),
                wqf: unpacker.u32()?,
                pos: unpacker.u32()?,
            },
            Op::LeafPostingSource => {
                let name = String::from_utf8_lossy(unpacker.bytes()?).into_owned();
                let params = unpacker.bytes()?;
                Node::Source(Arc::from(registry.posting_source(&name, params)?))
            }
            Op::ScaleWeight => {
                let factor = unpacker.f64()?;
                let subquery = Query::unpack(unpacker, registry, depth + 1)?;
                return Query::scale_weight(factor, subquery).map_err(|_| {
                    QuarryError::serialisation(format!("Bad OP_SCALE_WEIGHT factor {factor}"))
                });
            }
            Op::ValueRange => Node::ValueRange {
                slot: unpacker.u32()?,
                begin: unpacker.bytes()?.to_vec(),
                end: unpacker.bytes()?.to_vec(),
            },
            Op::ValueGe => Node::ValueGe {
                slot: unpacker.u32()?,
                limit: unpacker.bytes()?.to_vec(),
            },
            Op::ValueLe => Node::ValueLe {
                slot: unpacker.u32()?,
                limit: unpacker.bytes()?.to_vec(),
            },
            Op::Wildcard => Node::Wildcard(Wildcard {
                pattern: unpacker.bytes()?.to_vec(),
                max_expansion: unpacker.u32()?,
                limit: WildcardLimit::from_code(unpacker.u8()?)?,
                combiner: Op::from_code(unpacker.u8()?)?,
            }),
            Op::LeafMatchAll => {
                return Err(QuarryError::serialisation("Unexpected MatchAll marker"));
            }
            branch => {
                let parameter = unpacker.u32()?;
                let count = unpacker.uint()?;
                let mut subqueries = Vec::new();
                for _ in 0..count {
                    subqueries.push(Query::unpack(unpacker, registry, depth + 1)?);
                }
                Node::Branch {
                    op: branch,
                    parameter,
                    subqueries,
                }
            }
        };
        Ok(Query::from_node(node))
    }
}

/// Append `subquery` to a branch under construction, dropping or
/// collapsing MatchNothing operands.
fn add_subquery(op: Op, subqueries: &mut Vec<Query>, subquery: Query) {
    match op {
        _ if op.is_and_like() => {
            if subqueries.len() == 1 && subqueries[0].is_empty() {
                return;
            }
            if subquery.is_empty() {
                subqueries.clear();
            }
            subqueries.push(subquery);
        }
        Op::AndNot => {
            if let Some(left) = subqueries.first() {
                if left.is_empty() || subquery.is_empty() {
                    return;
                }
                // No weight is taken from the right-hand side.
                if let Some(Node::Scale { subquery: inner, .. }) = subquery.node() {
                    subqueries.push(inner.clone());
                    return;
                }
            }
            subqueries.push(subquery);
        }
        Op::AndMaybe => {
            if subqueries.len() == 1 && subqueries[0].is_empty() {
                return;
            }
            if !subquery.is_empty() || subqueries.is_empty() {
                subqueries.push(subquery);
            }
        }
        _ => {
            if !subquery.is_empty() {
                subqueries.push(subquery);
            }
        }
    }
}

fn finish_branch(op: Op, parameter: TermCount, mut subqueries: Vec<Query>) -> Query {
    match subqueries.len() {
        0 => return Query::match_nothing(),
        1 if op != Op::Synonym => return subqueries.remove(0),
        1 => {
            if let Some(Node::Wildcard(wildcard)) = subqueries[0].node() {
                return Query::from_node(Node::Wildcard(Wildcard {
                    combiner: Op::Synonym,
                    ..wildcard.clone()
                }));
            }
            if matches!(
                subqueries[0].get_type(),
                Op::LeafTerm | Op::LeafMatchAll | Op::Synonym
            ) {
                return subqueries.remove(0);
            }
        }
        _ => {}
    }
    let parameter = match op {
        Op::Near | Op::Phrase if parameter == 0 => subqueries.len() as TermCount,
        Op::EliteSet if parameter == 0 => DEFAULT_ELITE_SET_SIZE,
        _ => parameter,
    };
    Query::from_node(Node::Branch {
        op,
        parameter,
        subqueries,
    })
}

/// Build a branch for operators which can't fail.
fn build<const N: usize>(op: Op, parameter: TermCount, subqueries: [Query; N]) -> Query {
    let mut accepted = Vec::new();
    for subquery in subqueries {
        add_subquery(op, &mut accepted, subquery);
    }
    finish_branch(op, parameter, accepted)
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        build(Op::And, 0, [self, rhs])
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        build(Op::Or, 0, [self, rhs])
    }
}

impl BitXor for Query {
    type Output = Query;

    fn bitxor(self, rhs: Query) -> Query {
        build(Op::Xor, 0, [self, rhs])
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_description())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posting_source::{FixedWeightPostingSource, ValueWeightPostingSource};

    fn terms(list: &[&str]) -> Vec<Query> {
        list.iter().map(|t| Query::term(t)).collect()
    }

    fn collected(iter: TermIterator) -> Vec<String> {
        iter.map(|item| String::from_utf8_lossy(item.term()).into_owned())
            .collect()
    }

    #[test]
    fn test_descriptions() {
        let q = Query::new(Op::Or, terms(&["a", "b"])).unwrap();
        assert_eq!(q.get_description(), "Query((a OR b))");
        let q = Query::scale_weight(5.0, Query::term("foo")).unwrap();
        assert_eq!(q.get_description(), "Query(5 * foo)");
        let q = Query::value_range(1, "a", "b");
        assert_eq!(q.get_description(), "Query(VALUE_RANGE 1 a b)");
        assert_eq!(Query::match_all().get_description(), "Query(<alldocuments>)");
        assert_eq!(Query::match_nothing().get_description(), "Query()");
        assert_eq!(Query::term_with("x", 2, 3).get_description(), "Query(x#2@3)");
        let q = Query::with_parameter(Op::Phrase, terms(&["a", "b"]), 2).unwrap();
        assert_eq!(q.get_description(), "Query((a PHRASE 2 b))");
        assert_eq!(
            Query::wildcard("te").get_description(),
            "Query(WILDCARD SYNONYM te)"
        );
    }

    #[test]
    fn test_match_nothing_normalisation() {
        let nothing = Query::match_nothing();
        let a = Query::term("a");
        assert!((a.clone() & nothing.clone()).is_empty());
        assert_eq!((a.clone() | nothing.clone()).get_description(), "Query(a)");
        assert!(nothing.clone().and_not(a.clone()).is_empty());
        assert_eq!(a.clone().and_not(nothing.clone()).get_description(), "Query(a)");
        assert!(nothing.clone().and_maybe(a.clone()).is_empty());
        assert!(Query::scale_weight(3.0, nothing).unwrap().is_empty());
        assert!(Query::value_range(0, "z", "a").is_empty());
        assert!(Query::new(Op::And, Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_and_not_strips_scale() {
        let right = Query::scale_weight(2.0, Query::term("b")).unwrap();
        let q = Query::term("a").and_not(right);
        assert_eq!(q.get_description(), "Query((a AND_NOT b))");
    }

    #[test]
    fn test_scale_weight_rules() {
        assert!(matches!(
            Query::scale_weight(-1.0, Query::term("a")),
            Err(QuarryError::InvalidArgument(_))
        ));
        let range = Query::value_range(0, "a", "b");
        let scaled = Query::scale_weight(2.0, range).unwrap();
        assert_eq!(scaled.get_type(), Op::ValueRange);
        let zero = Query::scale_weight(0.0, Query::term("a")).unwrap();
        assert_eq!(zero.get_description(), "Query(0 * a)");
    }

    #[test]
    fn test_value_queries() {
        assert_eq!(Query::value_range(2, "", "m").get_description(), "Query(VALUE_LE 2 m)");
        assert_eq!(Query::value_ge(2, "").get_type(), Op::LeafMatchAll);
        assert_eq!(Query::value_ge(2, "m").get_description(), "Query(VALUE_GE 2 m)");
    }

    #[test]
    fn test_parameter_validation() {
        assert!(matches!(
            Query::with_parameter(Op::And, terms(&["a", "b"]), 3),
            Err(QuarryError::InvalidArgument(_))
        ));
        assert!(matches!(
            Query::new(Op::ValueRange, terms(&["a"])),
            Err(QuarryError::InvalidArgument(_))
        ));
        let inner = Query::new(Op::And, terms(&["a", "b"])).unwrap();
        assert!(matches!(
            Query::new(Op::Phrase, vec![inner, Query::term("c")]),
            Err(QuarryError::Unimplemented(_))
        ));
        let q = Query::new(Op::Near, vec![Query::term("a"), Query::match_all()]).unwrap();
        assert!(q.is_empty());
    }

    #[test]
    fn test_elite_set_default_size() {
        let q = Query::new(Op::EliteSet, terms(&["a", "b"])).unwrap();
        assert_eq!(q.get_description(), "Query((a ELITE_SET 10 b))");
    }

    #[test]
    fn test_synonym_single() {
        let q = Query::new(Op::Synonym, terms(&["a"])).unwrap();
        assert_eq!(q.get_description(), "Query(a)");
        let inner = Query::new(Op::And, terms(&["a", "b"])).unwrap();
        let q = Query::new(Op::Synonym, vec![inner]).unwrap();
        assert_eq!(q.get_description(), "Query((SYNONYM (a AND b)))");
        let wild = Query::wildcard_with("x", 5, WildcardLimit::First, Op::Or).unwrap();
        let q = Query::new(Op::Synonym, vec![wild]).unwrap();
        assert_eq!(q.get_description(), "Query(WILDCARD SYNONYM x)");
    }

    #[test]
    fn test_terms_and_structure() {
        let q = Query::new(
            Op::Or,
            vec![
                Query::term_with("c", 1, 1),
                Query::term_with("a", 1, 2),
                Query::term_with("c", 1, 3),
                Query::match_all(),
            ],
        )
        .unwrap();
        assert_eq!(collected(q.terms()), vec!["a", "c"]);
        assert_eq!(collected(q.terms_by_position()), vec!["c", "a", "c"]);
        assert_eq!(q.terms_in_query_order(), vec![b"c".to_vec(), b"a".to_vec()]);
        assert_eq!(q.get_length(), 4);
        assert_eq!(q.get_num_subqueries(), 4);
        assert_eq!(q.get_subquery(1).unwrap().get_description(), "Query(a@2)");
        assert!(q.get_subquery(9).is_none());
        assert_eq!(q.get_type(), Op::Or);
    }

    #[test]
    fn test_serialise_round_trip() {
        let q = Query::new(
            Op::AndMaybe,
            vec![
                Query::with_parameter(Op::Near, terms(&["x", "y"]), 4).unwrap(),
                Query::scale_weight(0.5, Query::term_with("\u{0}bin", 3, 1)).unwrap(),
                Query::value_range(7, "aa", "zz"),
                Query::wildcard_with("pre", 10, WildcardLimit::MostFrequent, Op::Max).unwrap(),
                Query::posting_source(ValueWeightPostingSource::new(3)),
                Query::match_all(),
            ],
        )
        .unwrap();
        let bytes = q.serialise().unwrap();
        let back = Query::unserialise(&bytes).unwrap();
        assert_eq!(back.get_description(), q.get_description());
        assert!(Query::unserialise(&Query::match_nothing().serialise().unwrap())
            .unwrap()
            .is_empty());
        assert!(Query::unserialise(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_unserialise_rejects_bad_scale_factor() {
        let leaf = Query::term("a").serialise().unwrap();
        for factor in [-1.0, f64::NAN] {
            let mut packer = Packer::new();
            packer.u8(Op::ScaleWeight.code()).f64(factor).raw(&leaf);
            let err = Query::unserialise(&packer.into_inner()).unwrap_err();
            assert!(matches!(err, QuarryError::Serialisation(_)), "{err}");
        }

        let mut packer = Packer::new();
        packer.u8(Op::ScaleWeight.code()).f64(2.0).raw(&leaf);
        let q = Query::unserialise(&packer.into_inner()).unwrap();
        assert_eq!(q.get_description(), "Query(2 * a)");
    }

    #[test]
    fn test_unserialise_rejects_deep_nesting() {
        let leaf = Query::term("a").serialise().unwrap();
        let nested = |levels: usize| {
            let mut packer = Packer::new();
            for _ in 0..levels {
                packer.u8(Op::Or.code()).uint(0).uint(1);
            }
            packer.raw(&leaf);
            packer.into_inner()
        };

        assert!(Query::unserialise(&nested(50)).is_ok());
        let err = Query::unserialise(&nested(100_000)).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"), "{err}");
    }

    #[test]
    fn test_unnamed_source_does_not_serialise() {
        struct Anonymous(FixedWeightPostingSource);
        impl PostingSource for Anonymous {
            fn init(&mut self, db: &crate::Database) -> Result<()> {
                self.0.init(db)
            }
            fn termfreq_min(&self) -> crate::DocCount {
                self.0.termfreq_min()
            }
            fn termfreq_est(&self) -> crate::DocCount {
                self.0.termfreq_est()
            }
            fn termfreq_max(&self) -> crate::DocCount {
                self.0.termfreq_max()
            }
            fn docid(&self) -> crate::DocId {
                self.0.docid()
            }
            fn next(&mut self, min_weight: f64) -> Result<()> {
                self.0.next(min_weight)
            }
            fn at_end(&self) -> bool {
                self.0.at_end()
            }
            fn clone_box(&self) -> Box<dyn PostingSource> {
                Box::new(Anonymous(FixedWeightPostingSource::new(1.0)))
            }
        }

        let q = Query::posting_source(Anonymous(FixedWeightPostingSource::new(1.0)));
        assert_eq!(q.get_description(), "Query(PostingSource(PostingSource()))");
        assert!(matches!(q.serialise(), Err(QuarryError::Unimplemented(_))));
    }
}
