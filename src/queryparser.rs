//! Parsing free text queries into [`Query`] trees.
//!
//! The query string is split into lexemes by a pest grammar, then parsed by
//! recursive descent. Operator precedence, loosest first:
//!
//! ```text
//! expr   := xor (OR xor)*
//! xor    := and (XOR and)*
//! and    := unary ((AND | NOT | AND NOT) unary)*
//! unary  := NOT unary            (FLAG_PURE_NOT only)
//!         | clause
//! clause := (["+" | "-" | "~"] item)*
//! item   := word | "phrase" | field:item | ( expr ) | a..b | word NEAR word
//! ```
//!
//! Within a clause, loved (`+`) items are ANDed, plain items are combined
//! with the default operator and hated (`-`) items are subtracted:
//!
//! ```text
//! (AND of loved) AND_MAYBE (plain items) FILTER (boolean filters) AND_NOT (OR of hated)
//! ```

mod lexer;
pub mod value_range;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use unicode_normalization::UnicodeNormalization;

use crate::database::Database;
use crate::error::{QuarryError, Result};
use crate::iterator::TermIterator;
use crate::query::{Op, Query, WildcardLimit};
use crate::text::stem::Stem;
use crate::text::stopper::Stopper;
use crate::text::{StemStrategy, Word, should_stem, words};
use crate::{TermCount, TermPos, ValueNo};
use lexer::{Lexeme, Token, tokenize};
use value_range::ValueRangeProcessor;

/// Window used by `NEAR` and `ADJ` without an explicit `/n`.
const DEFAULT_POSITIONAL_WINDOW: TermCount = 10;

/// Default limit on terms a partial word expands to.
const DEFAULT_MAX_PARTIAL_EXPANSION: TermCount = 100;

/// Maximum edit distance of spelling corrections.
const SPELLING_EDIT_DISTANCE: u32 = 2;

/// Deepest nesting of groups and `NOT` prefixes accepted in a query.
const MAX_NESTING: usize = 100;

/// Characters which join words into a phrase (`e-mail`, `a/b`).
fn is_phrase_generator(ch: char) -> bool {
    matches!(ch, '.' | '-' | '/' | ':' | '\\' | '@')
}

// ── Flags ─────────────────────────────────────────────────────────────

/// Features enabled for one [`QueryParser::parse_query`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseFlags(u32);

impl ParseFlags {
    pub const NONE: ParseFlags = ParseFlags(0);
    /// `AND`, `OR`, `NOT`, `XOR`, `NEAR`, `ADJ` and parentheses.
    pub const BOOLEAN: ParseFlags = ParseFlags(1);
    /// Quoted phrases.
    pub const PHRASE: ParseFlags = ParseFlags(1 << 1);
    /// `+word` and `-word`.
    pub const LOVEHATE: ParseFlags = ParseFlags(1 << 2);
    /// Recognise boolean operators in any case.
    pub const BOOLEAN_ANY_CASE: ParseFlags = ParseFlags(1 << 3);
    /// Trailing `*` wildcards.
    pub const WILDCARD: ParseFlags = ParseFlags(1 << 4);
    /// A leading `NOT` subtracts from all documents.
    pub const PURE_NOT: ParseFlags = ParseFlags(1 << 5);
    /// Treat the final word as a prefix of what the user is still typing.
    pub const PARTIAL: ParseFlags = ParseFlags(1 << 6);
    /// Build a corrected query string from the spelling dictionary.
    pub const SPELLING_CORRECTION: ParseFlags = ParseFlags(1 << 7);
    /// Expand `~word` to its synonyms.
    pub const SYNONYM: ParseFlags = ParseFlags(1 << 8);
    /// Expand every word to its synonyms.
    pub const AUTO_SYNONYMS: ParseFlags = ParseFlags(1 << 9);
    pub const DEFAULT: ParseFlags = ParseFlags(Self::PHRASE.0 | Self::BOOLEAN.0 | Self::LOVEHATE.0);

    pub fn contains(self, other: ParseFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ParseFlags {
    fn default() -> Self {
        ParseFlags::DEFAULT
    }
}

impl BitOr for ParseFlags {
    type Output = ParseFlags;

    fn bitor(self, rhs: ParseFlags) -> ParseFlags {
        ParseFlags(self.0 | rhs.0)
    }
}

// ── Field processors ──────────────────────────────────────────────────

/// Builds the query for `field:text` on a field registered with
/// [`QueryParser::add_field_processor`].
pub trait FieldProcessor: Send + Sync {
    fn process(&self, text: &str) -> Result<Query>;
}

impl<F> FieldProcessor for F
where
    F: Fn(&str) -> Result<Query> + Send + Sync,
{
    fn process(&self, text: &str) -> Result<Query> {
        self(text)
    }
}

#[derive(Clone)]
enum Field {
    /// Free text, indexed under each of the prefixes.
    Text(Vec<String>),
    /// An exact value filtered on, under each of the prefixes.
    Boolean(Vec<String>),
    Processor(Arc<dyn FieldProcessor>),
}

// ── QueryParser ───────────────────────────────────────────────────────

/// Turns a user's query string into a [`Query`].
///
/// ```
/// use quarry::{ParseFlags, QueryParser, Stem, StemStrategy};
///
/// let mut parser = QueryParser::new();
/// parser.set_stemmer(Stem::new("en").unwrap());
/// parser.set_stemming_strategy(StemStrategy::Some);
/// let query = parser.parse_query("running dogs", ParseFlags::DEFAULT).unwrap();
/// assert_eq!(query.get_description(), "Query((Zrun@1 OR Zdog@2))");
/// ```
pub struct QueryParser {
    stemmer: Stem,
    stem_strategy: StemStrategy,
    stopper: Option<Arc<dyn Stopper>>,
    default_op: Op,
    db: Option<Database>,
    fields: HashMap<String, Field>,
    range_processors: Vec<Arc<dyn ValueRangeProcessor>>,
    max_wildcard_expansion: TermCount,
    wildcard_limit: WildcardLimit,
    max_partial_expansion: TermCount,
    stoplist: Vec<String>,
    unstem: BTreeMap<String, BTreeSet<String>>,
    corrected: String,
}

impl Default for QueryParser {
    fn default() -> Self {
        QueryParser {
            stemmer: Stem::none(),
            stem_strategy: StemStrategy::Some,
            stopper: None,
            default_op: Op::Or,
            db: None,
            fields: HashMap::new(),
            range_processors: Vec::new(),
            max_wildcard_expansion: 0,
            wildcard_limit: WildcardLimit::Error,
            max_partial_expansion: DEFAULT_MAX_PARTIAL_EXPANSION,
            stoplist: Vec::new(),
            unstem: BTreeMap::new(),
            corrected: String::new(),
        }
    }
}

impl QueryParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stemmer(&mut self, stemmer: Stem) {
        self.stemmer = stemmer;
    }

    pub fn set_stemming_strategy(&mut self, strategy: StemStrategy) {
        self.stem_strategy = strategy;
    }

    pub fn set_stopper(&mut self, stopper: Option<Arc<dyn Stopper>>) {
        self.stopper = stopper;
    }

    /// Operator combining plain words: `Or` (the default), `And`, `Near`,
    /// `Phrase`, `EliteSet`, `Synonym` or `Max`.
    pub fn set_default_op(&mut self, op: Op) -> Result<()> {
        if !matches!(
            op,
            Op::Or | Op::And | Op::Near | Op::Phrase | Op::EliteSet | Op::Synonym | Op::Max
        ) {
            return Err(QuarryError::invalid_argument(format!(
                "{op:?} is not a valid default operator"
            )));
        }
        self.default_op = op;
        Ok(())
    }

    pub fn get_default_op(&self) -> Op {
        self.default_op
    }

    /// Database used for wildcard and partial expansion, spelling
    /// correction and synonyms.
    pub fn set_database(&mut self, db: &Database) {
        self.db = Some(db.clone());
    }

    /// Words after `field:` search terms prefixed by `prefix`. Adding a
    /// second prefix to a field searches both.
    pub fn add_prefix(&mut self, field: &str, prefix: &str) -> Result<()> {
        match self.fields.entry(field.to_string()).or_insert_with(|| Field::Text(Vec::new())) {
            Field::Text(prefixes) => {
                prefixes.push(prefix.to_string());
                Ok(())
            }
            _ => Err(QuarryError::invalid_operation(format!(
                "Can't use add_prefix() and add_boolean_prefix() on the same field name, or add_prefix() on a field with a processor ({field})"
            ))),
        }
    }

    /// `field:value` filters on the term `prefix` + `value`, taken
    /// verbatim.
    pub fn add_boolean_prefix(&mut self, field: &str, prefix: &str) -> Result<()> {
        match self.fields.entry(field.to_string()).or_insert_with(|| Field::Boolean(Vec::new())) {
            Field::Boolean(prefixes) => {
                prefixes.push(prefix.to_string());
                Ok(())
            }
            _ => Err(QuarryError::invalid_operation(format!(
                "Can't use add_prefix() and add_boolean_prefix() on the same field name, or add_boolean_prefix() on a field with a processor ({field})"
            ))),
        }
    }

    /// Hand the text after `field:` to `processor`.
    pub fn add_field_processor<P: FieldProcessor + 'static>(&mut self, field: &str, processor: P) -> Result<()> {
        if self.fields.contains_key(field) {
            return Err(QuarryError::invalid_operation(format!(
                "Field {field} already has prefixes or a processor"
            )));
        }
        self.fields
            .insert(field.to_string(), Field::Processor(Arc::new(processor)));
        Ok(())
    }

    /// Processors are tried in the order they were added.
    pub fn add_valuerangeprocessor<V: ValueRangeProcessor + 'static>(&mut self, processor: V) {
        self.range_processors.push(Arc::new(processor));
    }

    /// Limit on terms one wildcard may expand to (0 means no limit).
    pub fn set_max_wildcard_expansion(&mut self, max: TermCount, limit: WildcardLimit) {
        self.max_wildcard_expansion = max;
        self.wildcard_limit = limit;
    }

    pub fn set_max_partial_expansion(&mut self, max: TermCount) {
        self.max_partial_expansion = max;
    }

    /// Stopwords dropped by the last parse, in query order.
    pub fn stoplist(&self) -> TermIterator {
        TermIterator::plain(self.stoplist.iter().map(|w| w.as_bytes().to_vec()).collect())
    }

    /// Words from the last parse which produced `term`.
    pub fn unstem(&self, term: &str) -> TermIterator {
        let forms = self
            .unstem
            .get(term)
            .map(|forms| forms.iter().map(|w| w.as_bytes().to_vec()).collect())
            .unwrap_or_default();
        TermIterator::plain(forms)
    }

    /// The last query with misspelt words corrected, or empty if nothing
    /// was corrected. Needs [`ParseFlags::SPELLING_CORRECTION`].
    pub fn get_corrected_query_string(&self) -> &str {
        &self.corrected
    }

    pub fn parse_query(&mut self, query: &str, flags: ParseFlags) -> Result<Query> {
        self.parse_query_with_prefix(query, flags, "")
    }

    /// As [`parse_query`](Self::parse_query), with unqualified words
    /// searched under `default_prefix`.
    pub fn parse_query_with_prefix(&mut self, query: &str, flags: ParseFlags, default_prefix: &str) -> Result<Query> {
        let input: String = query.nfc().collect();
        let lexemes = tokenize(&input)?;
        let default_prefixes = match (default_prefix.is_empty(), self.fields.get("")) {
            (true, Some(Field::Text(prefixes))) => prefixes.clone(),
            _ => vec![default_prefix.to_string()],
        };

        let mut parse = Parse {
            qp: self,
            flags,
            input: &input,
            lexemes,
            pos: 0,
            termpos: 0,
            default_prefixes,
            group_prefixes: Vec::new(),
            stoplist: Vec::new(),
            unstem: BTreeMap::new(),
            corrections: Vec::new(),
            nesting: 0,
        };
        let outcome = parse.expr(0);
        let Parse {
            stoplist,
            unstem,
            mut corrections,
            ..
        } = parse;

        self.stoplist = stoplist;
        self.unstem = unstem;
        self.corrected = if corrections.is_empty() {
            String::new()
        } else {
            corrections.sort_by_key(|c| c.0);
            let mut corrected = String::with_capacity(input.len());
            let mut last = 0;
            for (start, end, replacement) in corrections {
                corrected.push_str(&input[last..start]);
                corrected.push_str(&replacement);
                last = end;
            }
            corrected.push_str(&input[last..]);
            corrected
        };

        let parsed = outcome?.unwrap_or_default();
        log::debug!("parsed {query:?} into {}", parsed.get_description());
        Ok(parsed)
    }

    pub fn get_description(&self) -> String {
        format!(
            "QueryParser(default_op={:?}, stemmer={}, strategy={:?}, fields={}, range_processors={})",
            self.default_op,
            self.stemmer.get_description(),
            self.stem_strategy,
            self.fields.len(),
            self.range_processors.len()
        )
    }
}

impl fmt::Debug for QueryParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_description())
    }
}

// ── Parsing ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolOp {
    And,
    Or,
    Not,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sign {
    None,
    Love,
    Hate,
}

fn syntax_error(op: &str) -> QuarryError {
    QuarryError::query_parser(format!("Syntax: <expression> {op} <expression>"))
}

fn combine(op: Op, mut queries: Vec<Query>) -> Result<Query> {
    if queries.len() == 1 {
        return Ok(queries.remove(0));
    }
    Query::new(op, queries)
}

enum Item {
    Query(Query),
    /// A stopword, dropped unless the clause has nothing else.
    Stopword(Query, String),
}

/// The items of one clause, sorted by role.
#[derive(Default)]
struct Clause {
    plain: Vec<Item>,
    love: Vec<Query>,
    hate: Vec<Query>,
    /// Boolean filters by field; a field's values are ORed.
    filters: BTreeMap<String, Vec<Query>>,
    /// Value ranges by slot; a slot's ranges are ORed.
    ranges: BTreeMap<ValueNo, Vec<Query>>,
}

impl Clause {
    fn add(&mut self, sign: Sign, query: Query) {
        match sign {
            Sign::None => self.plain.push(Item::Query(query)),
            Sign::Love => self.love.push(query),
            Sign::Hate => self.hate.push(query),
        }
    }
}

struct Parse<'a> {
    qp: &'a QueryParser,
    flags: ParseFlags,
    input: &'a str,
    lexemes: Vec<Lexeme>,
    pos: usize,
    termpos: TermPos,
    default_prefixes: Vec<String>,
    /// Prefixes of enclosing `field:( ... )` groups.
    group_prefixes: Vec<Vec<String>>,
    stoplist: Vec<String>,
    unstem: BTreeMap<String, BTreeSet<String>>,
    corrections: Vec<(usize, usize, String)>,
    /// Open groups and `NOT` prefixes being parsed.
    nesting: usize,
}

impl Parse<'_> {
    fn has(&self, flag: ParseFlags) -> bool {
        self.flags.contains(flag)
    }

    fn peek(&self) -> Option<&Token> {
        self.lexemes.get(self.pos).map(|lexeme| &lexeme.token)
    }

    fn operator_text<'t>(&self, text: &'t str) -> Option<std::borrow::Cow<'t, str>> {
        if !self.has(ParseFlags::BOOLEAN) {
            return None;
        }
        if self.has(ParseFlags::BOOLEAN_ANY_CASE) {
            Some(std::borrow::Cow::Owned(text.to_uppercase()))
        } else {
            Some(std::borrow::Cow::Borrowed(text))
        }
    }

    fn bool_op(&self, text: &str) -> Option<BoolOp> {
        match self.operator_text(text)?.as_ref() {
            "AND" => Some(BoolOp::And),
            "OR" => Some(BoolOp::Or),
            "NOT" => Some(BoolOp::Not),
            "XOR" => Some(BoolOp::Xor),
            _ => None,
        }
    }

    /// `NEAR`, `NEAR/n`, `ADJ` or `ADJ/n`.
    fn positional_op(&self, text: &str) -> Option<(Op, TermCount)> {
        let text = self.operator_text(text)?;
        let (name, window) = match text.split_once('/') {
            Some((name, window)) => (name.to_string(), window.parse().ok()?),
            None => (text.to_string(), DEFAULT_POSITIONAL_WINDOW),
        };
        match name.as_str() {
            "NEAR" => Some((Op::Near, window)),
            "ADJ" => Some((Op::Phrase, window)),
            _ => None,
        }
    }

    fn peek_bool(&self) -> Option<BoolOp> {
        match self.peek()? {
            Token::Text(text) => self.bool_op(text),
            _ => None,
        }
    }

    fn peek_positional(&self) -> Option<(Op, TermCount)> {
        match self.peek()? {
            Token::Text(text) => self.positional_op(text),
            _ => None,
        }
    }

    fn prefixes(&self) -> Vec<String> {
        self.group_prefixes
            .last()
            .cloned()
            .unwrap_or_else(|| self.default_prefixes.clone())
    }

    // ── Operators ───────────────────────────────────────────────────

    fn descend(&mut self) -> Result<()> {
        if self.nesting >= MAX_NESTING {
            return Err(QuarryError::query_parser("Syntax: query nested too deeply"));
        }
        self.nesting += 1;
        Ok(())
    }

    fn expr(&mut self, depth: usize) -> Result<Option<Query>> {
        self.chain(depth, BoolOp::Or)
    }

    /// `OR` and `XOR` chains; `XOR` binds tighter.
    fn chain(&mut self, depth: usize, op: BoolOp) -> Result<Option<Query>> {
        let operand = |parse: &mut Self| match op {
            BoolOp::Or => parse.chain(depth, BoolOp::Xor),
            _ => parse.and_expr(depth),
        };
        let first = operand(self)?;
        if self.peek_bool() != Some(op) {
            return Ok(first);
        }
        let name = if op == BoolOp::Or { "OR" } else { "XOR" };
        let mut operands = vec![first.ok_or_else(|| syntax_error(name))?];
        while self.peek_bool() == Some(op) {
            self.pos += 1;
            operands.push(operand(self)?.ok_or_else(|| syntax_error(name))?);
        }
        let op = if op == BoolOp::Or { Op::Or } else { Op::Xor };
        Query::new(op, operands).map(Some)
    }

    fn and_expr(&mut self, depth: usize) -> Result<Option<Query>> {
        let mut anded: Vec<Query> = self.unary(depth)?.into_iter().collect();
        loop {
            let negate = match self.peek_bool() {
                Some(BoolOp::And) => {
                    self.pos += 1;
                    if self.peek_bool() == Some(BoolOp::Not) {
                        self.pos += 1;
                        Some("AND NOT")
                    } else {
                        None
                    }
                }
                Some(BoolOp::Not) => {
                    self.pos += 1;
                    Some("NOT")
                }
                _ => break,
            };
            let name = negate.unwrap_or("AND");
            let right = self.unary(depth)?;
            let right = match right {
                Some(right) if !anded.is_empty() => right,
                _ => return Err(syntax_error(name)),
            };
            if negate.is_some() {
                let left = combine(Op::And, std::mem::take(&mut anded))?;
                anded.push(left.and_not(right));
            } else {
                anded.push(right);
            }
        }
        if anded.is_empty() {
            return Ok(None);
        }
        combine(Op::And, anded).map(Some)
    }

    fn unary(&mut self, depth: usize) -> Result<Option<Query>> {
        if self.has(ParseFlags::PURE_NOT) && self.peek_bool() == Some(BoolOp::Not) {
            self.pos += 1;
            self.descend()?;
            let operand = self.unary(depth);
            self.nesting -= 1;
            let operand = operand?.ok_or_else(|| syntax_error("NOT"))?;
            return Ok(Some(Query::match_all().and_not(operand)));
        }
        self.clause(depth)
    }

    // ── Clauses ─────────────────────────────────────────────────────

    fn clause(&mut self, depth: usize) -> Result<Option<Query>> {
        let mut clause = Clause::default();
        let mut sign = Sign::None;
        let mut synonym = false;

        while let Some(lexeme) = self.lexemes.get(self.pos).cloned() {
            match lexeme.token {
                Token::Text(ref text) if self.bool_op(text).is_some() => break,
                Token::Close => {
                    if depth > 0 {
                        break;
                    }
                    // Unmatched ')'.
                    self.pos += 1;
                    continue;
                }
                Token::Love | Token::Hate => {
                    self.pos += 1;
                    if self.has(ParseFlags::LOVEHATE) {
                        sign = if lexeme.token == Token::Love { Sign::Love } else { Sign::Hate };
                    }
                    continue;
                }
                Token::Tilde => {
                    self.pos += 1;
                    synonym = self.has(ParseFlags::SYNONYM);
                    continue;
                }
                Token::Open => {
                    self.pos += 1;
                    if let Some(query) = self.group(depth)? {
                        clause.add(sign, query);
                    }
                }
                Token::Phrase(ref body) => {
                    self.pos += 1;
                    let prefixes = self.prefixes();
                    self.phrase(&mut clause, sign, body, lexeme.start + 1, &prefixes)?;
                }
                Token::Range(ref begin, ref end) => {
                    self.pos += 1;
                    self.range(&mut clause, sign, begin, end, &lexeme)?;
                }
                Token::Field(ref name) => {
                    self.pos += 1;
                    self.field(&mut clause, sign, synonym, name, &lexeme, depth)?;
                }
                Token::Text(ref text) => {
                    self.pos += 1;
                    let prefixes = self.prefixes();
                    if self.peek_positional().is_some() {
                        self.positional(&mut clause, sign, text, &prefixes)?;
                    } else {
                        self.text(&mut clause, sign, synonym, text, (lexeme.start, lexeme.end), &prefixes)?;
                    }
                }
            }
            sign = Sign::None;
            synonym = false;
        }
        self.finish(clause)
    }

    /// The inside of `( ... )`; the opening parenthesis is consumed.
    fn group(&mut self, depth: usize) -> Result<Option<Query>> {
        self.descend()?;
        let inner = self.expr(depth + 1);
        self.nesting -= 1;
        let inner = inner?;
        // A missing ')' is tolerated at the end of the query.
        if self.peek() == Some(&Token::Close) {
            self.pos += 1;
        }
        Ok(inner)
    }

    fn finish(&mut self, clause: Clause) -> Result<Option<Query>> {
        let Clause {
            plain,
            mut love,
            mut hate,
            filters,
            ranges,
        } = clause;

        let keep_stopwords = love.is_empty() && plain.iter().all(|item| matches!(item, Item::Stopword(..)));
        let mut plain_queries = Vec::new();
        for item in plain {
            match item {
                Item::Query(query) => plain_queries.push(query),
                Item::Stopword(query, _) if keep_stopwords => plain_queries.push(query),
                Item::Stopword(_, word) => self.stoplist.push(word),
            }
        }

        let default_op = self.qp.default_op;
        if default_op == Op::And && !love.is_empty() {
            love.append(&mut plain_queries);
        }
        let plain = self.combine_default(plain_queries)?;
        let mut query = match (love.is_empty(), plain) {
            (true, plain) => plain,
            (false, None) => Some(combine(Op::And, love)?),
            (false, Some(plain)) => Some(combine(Op::And, love)?.and_maybe(plain)),
        };

        let mut filter_parts = Vec::new();
        for (_, values) in filters {
            filter_parts.push(combine(Op::Or, values)?);
        }
        for (_, values) in ranges {
            filter_parts.push(combine(Op::Or, values)?);
        }
        if !filter_parts.is_empty() {
            let filter = combine(Op::And, filter_parts)?;
            query = Some(match query {
                Some(query) => query.filter(filter),
                None => Query::scale_weight(0.0, filter)?,
            });
        }

        if !hate.is_empty() {
            let hated = combine(Op::Or, std::mem::take(&mut hate))?;
            query = match query {
                Some(query) => Some(query.and_not(hated)),
                None if self.has(ParseFlags::PURE_NOT) => Some(Query::match_all().and_not(hated)),
                None => None,
            };
        }
        Ok(query)
    }

    fn combine_default(&self, queries: Vec<Query>) -> Result<Option<Query>> {
        if queries.is_empty() {
            return Ok(None);
        }
        let query = match self.qp.default_op {
            op @ (Op::Near | Op::Phrase) => {
                if queries.iter().all(|q| q.get_type() == Op::LeafTerm) {
                    let window = if op == Op::Near { DEFAULT_POSITIONAL_WINDOW } else { 0 };
                    Query::with_parameter(op, queries, window)?
                } else {
                    combine(Op::And, queries)?
                }
            }
            op => combine(op, queries)?,
        };
        Ok(Some(query))
    }

    // ── Terms ───────────────────────────────────────────────────────

    fn next_pos(&mut self) -> TermPos {
        self.termpos += 1;
        self.termpos
    }

    /// The term for `word` under `prefix`. Positional terms are only
    /// stemmed when every term is.
    fn term_for(&self, word: &Word, prefix: &str, positional: bool) -> Result<String> {
        let qp = self.qp;
        let plain = format!("{prefix}{}", word.text);
        if qp.stemmer.is_none() {
            return Ok(plain);
        }
        Ok(match qp.stem_strategy {
            StemStrategy::None => plain,
            StemStrategy::Some => {
                let capitalised = word.raw.chars().next().is_some_and(char::is_uppercase);
                if positional || capitalised || !should_stem(&word.text) {
                    plain
                } else {
                    format!("Z{prefix}{}", qp.stemmer.stem_word(&word.text)?)
                }
            }
            StemStrategy::All => format!("{prefix}{}", qp.stemmer.stem_word(&word.text)?),
            StemStrategy::AllZ => format!("Z{prefix}{}", qp.stemmer.stem_word(&word.text)?),
        })
    }

    fn record_unstem(&mut self, term: &str, word: &Word) {
        self.unstem
            .entry(term.to_string())
            .or_default()
            .insert(word.text.clone());
    }

    fn check_spelling(&mut self, word: &Word, base: usize, prefix: &str) -> Result<()> {
        if !self.has(ParseFlags::SPELLING_CORRECTION) {
            return Ok(());
        }
        let Some(db) = &self.qp.db else {
            return Ok(());
        };
        if db.term_exists(format!("{prefix}{}", word.text))? {
            return Ok(());
        }
        let suggestion = db.get_spelling_suggestion(&word.text, SPELLING_EDIT_DISTANCE)?;
        if !suggestion.is_empty() && suggestion != word.text.as_bytes() {
            let start = base + word.offset;
            self.corrections.push((
                start,
                start + word.raw.len(),
                String::from_utf8_lossy(&suggestion).into_owned(),
            ));
        }
        Ok(())
    }

    /// Synonyms of `term` (or of the unstemmed `fallback`) at `pos`.
    fn synonyms(&self, term: &str, fallback: &str, pos: TermPos) -> Result<Vec<Query>> {
        let Some(db) = &self.qp.db else {
            return Ok(Vec::new());
        };
        let mut found: Vec<Vec<u8>> = db.synonyms(term)?.map(|item| item.into_term()).collect();
        if found.is_empty() && fallback != term {
            found = db.synonyms(fallback)?.map(|item| item.into_term()).collect();
        }
        Ok(found
            .into_iter()
            .map(|synonym| Query::term_with(synonym, 1, pos))
            .collect())
    }

    /// A probabilistic term for `word`, ORed over `prefixes`.
    fn word_query(&mut self, word: &Word, pos: TermPos, prefixes: &[String], synonym: bool) -> Result<Query> {
        let expand = synonym || self.has(ParseFlags::AUTO_SYNONYMS);
        let mut alternatives = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let term = self.term_for(word, prefix, false)?;
            self.record_unstem(&term, word);
            let query = Query::term_with(&term, 1, pos);
            let query = if expand {
                let mut synonyms = self.synonyms(&term, &format!("{prefix}{}", word.text), pos)?;
                if synonyms.is_empty() {
                    query
                } else {
                    synonyms.insert(0, query);
                    Query::new(Op::Synonym, synonyms)?
                }
            } else {
                query
            };
            alternatives.push(query);
        }
        combine(Op::Or, alternatives)
    }

    /// Terms matching the prefix `word`, expanded from the database when
    /// one is set, ORed with `word` as a whole word.
    fn partial_query(&mut self, word: &Word, pos: TermPos, prefixes: &[String]) -> Result<Query> {
        let qp = self.qp;
        let mut alternatives = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let root = format!("{prefix}{}", word.text);
            let expansion = match &qp.db {
                Some(db) => {
                    let mut terms: Vec<(Vec<u8>, u64)> = Vec::new();
                    for item in db.allterms(&root)? {
                        let term = item.into_term();
                        let termfreq = db.get_termfreq(&term)?;
                        terms.push((term, termfreq));
                    }
                    let max = qp.max_partial_expansion as usize;
                    if max > 0 && terms.len() > max {
                        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                        terms.truncate(max);
                        terms.sort();
                    }
                    Query::new(
                        Op::Synonym,
                        terms.into_iter().map(|(term, _)| Query::term_with(term, 1, pos)),
                    )?
                }
                None => Query::wildcard_with(&root, qp.max_partial_expansion, WildcardLimit::MostFrequent, Op::Synonym)?,
            };
            let term = self.term_for(word, prefix, false)?;
            self.record_unstem(&term, word);
            alternatives.push(Query::new(Op::Or, [expansion, Query::term_with(&term, 1, pos)])?);
        }
        combine(Op::Or, alternatives)
    }

    fn wildcard_query(&mut self, word: &Word, prefixes: &[String]) -> Result<Query> {
        let qp = self.qp;
        let mut alternatives = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            alternatives.push(Query::wildcard_with(
                format!("{prefix}{}", word.text),
                qp.max_wildcard_expansion,
                qp.wildcard_limit,
                Op::Synonym,
            )?);
        }
        combine(Op::Or, alternatives)
    }

    /// `op` over the words, once per prefix, ORed.
    fn positional_query(&mut self, op: Op, window: TermCount, words: &[(Word, TermPos)], prefixes: &[String]) -> Result<Query> {
        let mut alternatives = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let mut terms = Vec::with_capacity(words.len());
            for (word, pos) in words {
                let term = self.term_for(word, prefix, true)?;
                self.record_unstem(&term, word);
                terms.push(Query::term_with(&term, 1, *pos));
            }
            alternatives.push(Query::with_parameter(op, terms, window)?);
        }
        combine(Op::Or, alternatives)
    }

    fn is_stopword(&self, word: &Word) -> Result<bool> {
        match &self.qp.stopper {
            Some(stopper) => stopper.is_stopword(&word.text),
            None => Ok(false),
        }
    }

    // ── Items ───────────────────────────────────────────────────────

    /// A run of text: words joined by phrase characters form phrases, a
    /// trailing `*` makes a wildcard and the last word of the query may be
    /// partial.
    fn text(
        &mut self,
        clause: &mut Clause,
        sign: Sign,
        synonym: bool,
        text: &str,
        span: (usize, usize),
        prefixes: &[String],
    ) -> Result<()> {
        let wildcard = self.has(ParseFlags::WILDCARD) && text.ends_with('*');
        let body = if wildcard { &text[..text.len() - 1] } else { text };
        let found = words(body);
        let Some(last) = found.last() else {
            return Ok(());
        };
        let ends_at_word = last.offset + last.raw.len() == body.len();
        let partial = self.has(ParseFlags::PARTIAL)
            && !wildcard
            && ends_at_word
            && span.1 == self.input.len()
            && self.pos == self.lexemes.len();

        let mut runs: Vec<Vec<Word>> = Vec::new();
        let mut prev_end = 0;
        for word in found {
            let separator = &body[prev_end..word.offset];
            prev_end = word.offset + word.raw.len();
            match runs.last_mut() {
                Some(run) if !separator.is_empty() && separator.chars().all(is_phrase_generator) => run.push(word),
                _ => runs.push(vec![word]),
            }
        }

        let run_count = runs.len();
        for (idx, run) in runs.into_iter().enumerate() {
            let is_last = idx + 1 == run_count;
            for word in &run {
                if let Some(prefix) = prefixes.first() {
                    self.check_spelling(word, span.0, prefix)?;
                }
            }
            if run.len() > 1 {
                let positioned: Vec<(Word, TermPos)> = run.into_iter().map(|w| (w, self.next_pos())).collect();
                let query = self.positional_query(Op::Phrase, 0, &positioned, prefixes)?;
                clause.add(sign, query);
                continue;
            }
            let Some(word) = run.into_iter().next() else {
                continue;
            };
            let pos = self.next_pos();
            if is_last && wildcard && ends_at_word {
                let query = self.wildcard_query(&word, prefixes)?;
                clause.add(sign, query);
            } else if is_last && partial {
                let query = self.partial_query(&word, pos, prefixes)?;
                clause.add(sign, query);
            } else {
                let query = self.word_query(&word, pos, prefixes, synonym)?;
                if sign == Sign::None && run_count == 1 && self.is_stopword(&word)? {
                    clause.plain.push(Item::Stopword(query, word.text));
                } else {
                    clause.add(sign, query);
                }
            }
        }
        Ok(())
    }

    /// A quoted phrase. Without [`ParseFlags::PHRASE`] the words are read
    /// as ordinary text.
    fn phrase(&mut self, clause: &mut Clause, sign: Sign, body: &str, base: usize, prefixes: &[String]) -> Result<()> {
        if !self.has(ParseFlags::PHRASE) {
            for word in words(body) {
                let pos = self.next_pos();
                let query = self.word_query(&word, pos, prefixes, false)?;
                clause.add(sign, query);
            }
            return Ok(());
        }
        let found = words(body);
        if found.is_empty() {
            return Ok(());
        }
        for word in &found {
            if let Some(prefix) = prefixes.first() {
                self.check_spelling(word, base, prefix)?;
            }
        }
        let positioned: Vec<(Word, TermPos)> = found.into_iter().map(|w| (w, self.next_pos())).collect();
        let query = self.positional_query(Op::Phrase, 0, &positioned, prefixes)?;
        clause.add(sign, query);
        Ok(())
    }

    /// `a NEAR b`, `a ADJ/3 b NEAR c`: the first word has been consumed.
    fn positional(&mut self, clause: &mut Clause, sign: Sign, first: &str, prefixes: &[String]) -> Result<()> {
        let mut chunks = vec![first.to_string()];
        let mut chain: Option<(Op, TermCount)> = None;
        while let Some((op, window)) = self.peek_positional() {
            self.pos += 1;
            let name = if op == Op::Near { "NEAR" } else { "ADJ" };
            let next = match self.peek() {
                Some(Token::Text(text)) if self.bool_op(text).is_none() && self.positional_op(text).is_none() => {
                    text.clone()
                }
                _ => return Err(syntax_error(name)),
            };
            self.pos += 1;
            chunks.push(next);
            chain.get_or_insert((op, window));
        }
        let Some((op, window)) = chain else {
            return Ok(());
        };

        let mut positioned = Vec::new();
        for chunk in &chunks {
            for word in words(chunk) {
                let pos = self.next_pos();
                positioned.push((word, pos));
            }
        }
        if positioned.is_empty() {
            return Ok(());
        }
        let window = window + positioned.len() as TermCount - 1;
        let query = self.positional_query(op, window, &positioned, prefixes)?;
        clause.add(sign, query);
        Ok(())
    }

    fn range(&mut self, clause: &mut Clause, sign: Sign, begin: &str, end: &str, lexeme: &Lexeme) -> Result<()> {
        let qp = self.qp;
        if qp.range_processors.is_empty() {
            let text = format!("{begin}..{end}");
            let prefixes = self.prefixes();
            return self.text(clause, sign, false, &text, (lexeme.start, lexeme.end), &prefixes);
        }
        for processor in &qp.range_processors {
            let Some(range) = processor.process(begin, end)? else {
                continue;
            };
            let query = match (range.begin.is_empty(), range.end.is_empty()) {
                (true, false) => Query::value_le(range.slot, &range.end),
                (false, true) => Query::value_ge(range.slot, &range.begin),
                _ => Query::value_range(range.slot, &range.begin, &range.end),
            };
            if sign == Sign::Hate {
                clause.hate.push(query);
            } else {
                clause.ranges.entry(range.slot).or_default().push(query);
            }
            return Ok(());
        }
        Err(QuarryError::query_parser("Unknown range operation"))
    }

    /// The raw text following a boolean or processed field.
    fn field_value(&mut self) -> Option<String> {
        let value = match self.peek()? {
            Token::Text(text) => text.clone(),
            Token::Phrase(body) => body.clone(),
            _ => return None,
        };
        self.pos += 1;
        Some(value)
    }

    fn field(
        &mut self,
        clause: &mut Clause,
        sign: Sign,
        synonym: bool,
        name: &str,
        lexeme: &Lexeme,
        depth: usize,
    ) -> Result<()> {
        let qp = self.qp;
        match qp.fields.get(name) {
            None => {
                // Not a field after all: read `name:` as text joined to
                // whatever follows it.
                let mut text = format!("{name}:");
                let mut end = lexeme.end;
                if let Some(next) = self.lexemes.get(self.pos) {
                    if let Token::Text(more) = &next.token {
                        if next.start == lexeme.end {
                            text.push_str(more);
                            end = next.end;
                            self.pos += 1;
                        }
                    }
                }
                let prefixes = self.prefixes();
                self.text(clause, sign, synonym, &text, (lexeme.start, end), &prefixes)
            }
            Some(Field::Processor(processor)) => {
                if let Some(value) = self.field_value() {
                    clause.add(sign, processor.process(&value)?);
                }
                Ok(())
            }
            Some(Field::Boolean(prefixes)) => {
                let Some(value) = self.field_value() else {
                    return Ok(());
                };
                let terms = prefixes.iter().map(|prefix| Query::term(format!("{prefix}{value}")));
                let query = combine(Op::Or, terms.collect())?;
                if sign == Sign::Hate {
                    clause.hate.push(query);
                } else {
                    clause.filters.entry(name.to_string()).or_default().push(query);
                }
                Ok(())
            }
            Some(Field::Text(prefixes)) => {
                let Some(next) = self.lexemes.get(self.pos).cloned() else {
                    return Ok(());
                };
                self.pos += 1;
                match next.token {
                    Token::Open => {
                        self.group_prefixes.push(prefixes.clone());
                        let inner = self.group(depth);
                        self.group_prefixes.pop();
                        if let Some(query) = inner? {
                            clause.add(sign, query);
                        }
                        Ok(())
                    }
                    Token::Phrase(body) => self.phrase(clause, sign, &body, next.start + 1, prefixes),
                    Token::Text(text) => {
                        self.text(clause, sign, synonym, &text, (next.start, next.end), prefixes)
                    }
                    _ => {
                        self.pos -= 1;
                        Ok(())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::WritableDatabase;
    use crate::document::Document;
    use crate::text::stopper::SimpleStopper;
    use super::value_range::{DateValueRangeProcessor, NumberValueRangeProcessor};

    fn describe(parser: &mut QueryParser, query: &str, flags: ParseFlags) -> String {
        parser.parse_query(query, flags).unwrap().get_description()
    }

    fn english() -> QueryParser {
        let mut parser = QueryParser::new();
        parser.set_stemmer(Stem::new("en").unwrap());
        parser
    }

    #[test]
    fn test_default_or() {
        let mut parser = QueryParser::new();
        assert_eq!(describe(&mut parser, "foo bar", ParseFlags::DEFAULT), "Query((foo@1 OR bar@2))");
        assert_eq!(describe(&mut parser, "", ParseFlags::DEFAULT), "Query()");
    }

    #[test]
    fn test_dangling_operator() {
        let mut parser = QueryParser::new();
        let err = parser.parse_query("test AND", ParseFlags::DEFAULT).unwrap_err();
        assert_eq!(err.to_string(), "Query parser error: Syntax: <expression> AND <expression>");
        assert!(matches!(
            parser.parse_query("OR test", ParseFlags::DEFAULT),
            Err(QuarryError::QueryParser(ref m)) if m == "Syntax: <expression> OR <expression>"
        ));
        assert!(parser.parse_query("NOT test", ParseFlags::BOOLEAN).is_err());
    }

    #[test]
    fn test_pure_not() {
        let mut parser = QueryParser::new();
        assert_eq!(
            describe(&mut parser, "NOT test", ParseFlags::BOOLEAN | ParseFlags::PURE_NOT),
            "Query((<alldocuments> AND_NOT test@1))"
        );
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let mut parser = QueryParser::new();
        let nested = |levels: usize| format!("{}a{}", "(".repeat(levels), ")".repeat(levels));

        assert_eq!(describe(&mut parser, &nested(50), ParseFlags::BOOLEAN), "Query(a@1)");

        let err = parser
            .parse_query(&nested(200_000), ParseFlags::BOOLEAN)
            .unwrap_err();
        assert_eq!(err.to_string(), "Query parser error: Syntax: query nested too deeply");

        let nots = format!("{}a", "NOT ".repeat(200_000));
        let err = parser
            .parse_query(&nots, ParseFlags::BOOLEAN | ParseFlags::PURE_NOT)
            .unwrap_err();
        assert!(matches!(err, QuarryError::QueryParser(_)), "{err}");

        // The limit counts open groups, not groups seen.
        let siblings = "(a) ".repeat(500);
        assert!(parser.parse_query(&siblings, ParseFlags::BOOLEAN).is_ok());
    }

    #[test]
    fn test_precedence() {
        let mut parser = QueryParser::new();
        assert_eq!(
            describe(&mut parser, "a OR b AND c", ParseFlags::DEFAULT),
            "Query((a@1 OR (b@2 AND c@3)))"
        );
        assert_eq!(
            describe(&mut parser, "a AND NOT b", ParseFlags::DEFAULT),
            "Query((a@1 AND_NOT b@2))"
        );
        assert_eq!(
            describe(&mut parser, "(a OR b) XOR c", ParseFlags::DEFAULT),
            "Query(((a@1 OR b@2) XOR c@3))"
        );
        // Without FLAG_BOOLEAN operators are words.
        assert_eq!(
            describe(&mut parser, "a AND b", ParseFlags::NONE),
            "Query((a@1 OR and@2 OR b@3))"
        );
        assert_eq!(
            describe(&mut parser, "a and b", ParseFlags::BOOLEAN | ParseFlags::BOOLEAN_ANY_CASE),
            "Query((a@1 AND b@3))"
        );
    }

    #[test]
    fn test_love_hate() {
        let mut parser = QueryParser::new();
        assert_eq!(
            describe(&mut parser, "stock -cooking", ParseFlags::DEFAULT),
            "Query((stock@1 AND_NOT cooking@2))"
        );
        assert_eq!(
            describe(&mut parser, "+a b", ParseFlags::DEFAULT),
            "Query((a@1 AND_MAYBE b@2))"
        );
    }

    #[test]
    fn test_stemming_and_stopwords() {
        let mut parser = english();
        parser.set_default_op(Op::And).unwrap();
        let stopper = Arc::new(SimpleStopper::new());
        parser.set_stopper(Some(stopper.clone()));
        assert_eq!(
            describe(&mut parser, "foo bar a", ParseFlags::BOOLEAN),
            "Query((Zfoo@1 AND Zbar@2 AND Za@3))"
        );
        stopper.add("a");
        assert_eq!(
            describe(&mut parser, "foo bar a", ParseFlags::BOOLEAN),
            "Query((Zfoo@1 AND Zbar@2))"
        );
        let stopped: Vec<Vec<u8>> = parser.stoplist().map(|item| item.into_term()).collect();
        assert_eq!(stopped, vec![b"a".to_vec()]);

        // A query of nothing but stopwords keeps them.
        assert_eq!(describe(&mut parser, "a", ParseFlags::BOOLEAN), "Query(Za@1)");
    }

    #[test]
    fn test_unstem_and_strategies() {
        let mut parser = english();
        parser.parse_query("Running runs", ParseFlags::DEFAULT).unwrap();
        let forms: Vec<Vec<u8>> = parser.unstem("Zrun").map(|item| item.into_term()).collect();
        assert_eq!(forms, vec![b"runs".to_vec()]);

        parser.set_stemming_strategy(StemStrategy::All);
        assert_eq!(
            describe(&mut parser, "running dogs", ParseFlags::DEFAULT),
            "Query((run@1 OR dog@2))"
        );
        parser.set_stemming_strategy(StemStrategy::None);
        assert_eq!(describe(&mut parser, "dogs", ParseFlags::DEFAULT), "Query(dogs@1)");
    }

    #[test]
    fn test_phrases() {
        let mut parser = english();
        assert_eq!(
            describe(&mut parser, "\"was it warm\"", ParseFlags::DEFAULT),
            "Query((was@1 PHRASE 3 it@2 PHRASE 3 warm@3))"
        );
        assert_eq!(
            describe(&mut parser, "e-mail", ParseFlags::DEFAULT),
            "Query((e@1 PHRASE 2 mail@2))"
        );
        assert_eq!(
            describe(&mut parser, "cat NEAR/2 dog", ParseFlags::DEFAULT),
            "Query((cat@1 NEAR 3 dog@2))"
        );
        assert!(parser.parse_query("cat NEAR", ParseFlags::DEFAULT).is_err());
    }

    #[test]
    fn test_fields() {
        let mut parser = QueryParser::new();
        parser.add_prefix("title", "S").unwrap();
        parser.add_boolean_prefix("site", "H").unwrap();
        assert!(parser.add_prefix("site", "X").is_err());
        assert_eq!(
            describe(&mut parser, "title:foo bar", ParseFlags::DEFAULT),
            "Query((Sfoo@1 OR bar@2))"
        );
        assert_eq!(
            describe(&mut parser, "foo site:Example.com", ParseFlags::DEFAULT),
            "Query((foo@1 FILTER HExample.com))"
        );
        assert_eq!(
            describe(&mut parser, "site:a.org", ParseFlags::DEFAULT),
            "Query(0 * Ha.org)"
        );
        assert_eq!(
            describe(&mut parser, "title:(a b)", ParseFlags::DEFAULT),
            "Query((Sa@1 OR Sb@2))"
        );
        // Unknown fields read as text.
        assert_eq!(
            describe(&mut parser, "http://x", ParseFlags::DEFAULT),
            "Query((http@1 PHRASE 2 x@2))"
        );

        parser
            .add_field_processor("id", |text: &str| -> Result<Query> { Ok(Query::term(format!("Q{text}"))) })
            .unwrap();
        assert_eq!(describe(&mut parser, "id:42", ParseFlags::DEFAULT), "Query(Q42)");
        parser
            .add_field_processor("bad", |_: &str| -> Result<Query> { Err(QuarryError::callback("nope")) })
            .unwrap();
        assert!(matches!(
            parser.parse_query("bad:x", ParseFlags::DEFAULT),
            Err(QuarryError::Callback(_))
        ));
    }

    #[test]
    fn test_value_ranges() {
        let mut parser = QueryParser::new();
        parser.add_valuerangeprocessor(NumberValueRangeProcessor::with_marker(0, "$", true));
        parser.add_valuerangeprocessor(DateValueRangeProcessor::new(1, false, 1960));
        assert_eq!(
            describe(&mut parser, "12/03/99..12/04/01", ParseFlags::DEFAULT),
            "Query(VALUE_RANGE 1 19991203 20011204)"
        );
        let query = parser.parse_query("foo $10..", ParseFlags::DEFAULT).unwrap();
        assert_eq!(query.get_type(), Op::Filter);
        assert!(matches!(
            parser.parse_query("a..b", ParseFlags::DEFAULT),
            Err(QuarryError::QueryParser(ref m)) if m == "Unknown range operation"
        ));
    }

    fn database() -> Database {
        let db = WritableDatabase::inmemory();
        let mut doc = Document::new();
        doc.add_term("out", 1).unwrap();
        doc.add_term("outsid", 1).unwrap();
        doc.add_term("Zfoo", 1).unwrap();
        db.add_document(doc).unwrap();
        db.add_spelling("mouse", 3).unwrap();
        db.add_synonym("Zfoo", "Zbar").unwrap();
        db.commit().unwrap();
        db.reader().unwrap()
    }

    #[test]
    fn test_partial() {
        let db = database();
        let mut parser = english();
        parser.set_database(&db);
        parser.set_default_op(Op::And).unwrap();
        assert_eq!(
            describe(&mut parser, "foo o", ParseFlags::PARTIAL),
            "Query((Zfoo@1 AND ((out@2 SYNONYM outsid@2) OR Zo@2)))"
        );
        assert_eq!(
            describe(&mut parser, "foo outside", ParseFlags::PARTIAL),
            "Query((Zfoo@1 AND Zoutsid@2))"
        );
        // A trailing space means the last word is complete.
        assert_eq!(
            describe(&mut parser, "foo o ", ParseFlags::PARTIAL),
            "Query((Zfoo@1 AND Zo@2))"
        );
    }

    #[test]
    fn test_wildcard_and_synonyms() {
        let db = database();
        let mut parser = english();
        parser.set_database(&db);
        assert_eq!(
            describe(&mut parser, "ou*", ParseFlags::WILDCARD),
            "Query(WILDCARD SYNONYM ou)"
        );
        assert_eq!(
            describe(&mut parser, "~foo", ParseFlags::SYNONYM),
            "Query((Zfoo@1 SYNONYM Zbar@1))"
        );
        assert_eq!(describe(&mut parser, "foo", ParseFlags::DEFAULT), "Query(Zfoo@1)");
        assert_eq!(
            describe(&mut parser, "foo", ParseFlags::AUTO_SYNONYMS),
            "Query((Zfoo@1 SYNONYM Zbar@1))"
        );
    }

    #[test]
    fn test_spelling_correction() {
        let db = database();
        let mut parser = QueryParser::new();
        parser.set_database(&db);
        parser
            .parse_query("mousse trap", ParseFlags::SPELLING_CORRECTION)
            .unwrap();
        assert_eq!(parser.get_corrected_query_string(), "mouse trap");
        parser.parse_query("out", ParseFlags::SPELLING_CORRECTION).unwrap();
        assert_eq!(parser.get_corrected_query_string(), "");
    }

    #[test]
    fn test_default_op_validation() {
        let mut parser = QueryParser::new();
        assert!(matches!(parser.set_default_op(Op::Xor), Err(QuarryError::InvalidArgument(_))));
        parser.set_default_op(Op::Phrase).unwrap();
        assert_eq!(
            describe(&mut parser, "a b", ParseFlags::DEFAULT),
            "Query((a@1 PHRASE 2 b@2))"
        );
    }
}
