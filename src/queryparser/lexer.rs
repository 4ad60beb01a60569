//! Splitting a query string into lexemes.

use pest::Parser;
use pest_derive::Parser;

use crate::error::{QuarryError, Result};

#[derive(Parser)]
#[grammar = "queryparser/query.pest"]
struct QueryLexer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// A run of characters with no special meaning to the lexer.
    Text(String),
    Phrase(String),
    Range(String, String),
    Field(String),
    Open,
    Close,
    Love,
    Hate,
    Tilde,
}

/// A token and its byte span in the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Lexeme {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

pub(crate) fn tokenize(query: &str) -> Result<Vec<Lexeme>> {
    let pairs = QueryLexer::parse(Rule::query, query)
        .map_err(|e| QuarryError::query_parser(format!("Failed to tokenize query: {e}")))?;

    let mut lexemes = Vec::new();
    for pair in pairs.flatten() {
        let span = pair.as_span();
        let token = match pair.as_rule() {
            Rule::text => Token::Text(pair.as_str().to_string()),
            Rule::phrase => {
                let body = pair
                    .into_inner()
                    .find(|inner| inner.as_rule() == Rule::phrase_body)
                    .map(|inner| inner.as_str().to_string())
                    .unwrap_or_default();
                Token::Phrase(body)
            }
            Rule::range => {
                let text = pair.as_str();
                let (begin, end) = text.split_once("..").unwrap_or((text, ""));
                Token::Range(begin.to_string(), end.to_string())
            }
            Rule::field => {
                let name = pair.as_str().trim_end_matches(':');
                Token::Field(name.to_string())
            }
            Rule::open => Token::Open,
            Rule::close => Token::Close,
            Rule::love => Token::Love,
            Rule::hate => Token::Hate,
            Rule::tilde => Token::Tilde,
            _ => continue,
        };
        lexemes.push(Lexeme {
            token,
            start: span.start(),
            end: span.end(),
        });
    }
    Ok(lexemes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(query: &str) -> Vec<Token> {
        tokenize(query).unwrap().into_iter().map(|l| l.token).collect()
    }

    fn text(s: &str) -> Token {
        Token::Text(s.to_string())
    }

    #[test]
    fn test_words_and_operators() {
        assert_eq!(tokens("test AND foo"), vec![text("test"), text("AND"), text("foo")]);
        assert_eq!(tokens("  c++  "), vec![text("c++")]);
        assert!(tokens("").is_empty());
    }

    #[test]
    fn test_structure() {
        assert_eq!(
            tokens("+love -hate (a b) ~syn"),
            vec![
                Token::Love,
                text("love"),
                Token::Hate,
                text("hate"),
                Token::Open,
                text("a"),
                text("b"),
                Token::Close,
                Token::Tilde,
                text("syn"),
            ]
        );
        // A sign followed by a space is just text.
        assert_eq!(tokens("a - b"), vec![text("a"), text("-"), text("b")]);
    }

    #[test]
    fn test_phrases() {
        assert_eq!(tokens("\"was it warm\""), vec![Token::Phrase("was it warm".to_string())]);
        assert_eq!(tokens("\"open ended"), vec![Token::Phrase("open ended".to_string())]);
    }

    #[test]
    fn test_fields_and_ranges() {
        assert_eq!(
            tokens("title:foo $10..20 ..5"),
            vec![
                Token::Field("title".to_string()),
                text("foo"),
                Token::Range("$10".to_string(), "20".to_string()),
                Token::Range(String::new(), "5".to_string()),
            ]
        );
        let lexemes = tokenize("ab cd").unwrap();
        assert_eq!((lexemes[1].start, lexemes[1].end), (3, 5));
    }
}
