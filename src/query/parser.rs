//! Recursive-descent parser for boolean search queries
//!
//! ```text
//! query   := or
//! or      := and ( OR and )*
//! and     := unary ( [AND] unary )*
//! unary   := NOT unary | primary
//! primary := WORD | PHRASE | '(' or ')'
//! ```
//!
//! Operators missing an operand are dropped instead of rejected, so the only
//! hard failures are unbalanced parentheses and a query without any term.

use super::ast::QueryNode;
use super::error::{ParseError, ParseResult};
use super::lexer::{tokenize, Token};

/// Parse a raw query string into a boolean tree
pub fn parse(text: &str) -> ParseResult<QueryNode> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyQuery);
    }

    let tokens = tokenize(text);
    let mut parser = Parser { tokens, pos: 0 };

    let root = parser.parse_or()?;

    // The only token that can stop the top-level OR early is a stray ')'
    if parser.pos < parser.tokens.len() {
        return Err(ParseError::UnbalancedGroup);
    }

    root.ok_or(ParseError::EmptyQuery)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> ParseResult<Option<QueryNode>> {
        let mut branches = Vec::new();

        if let Some(node) = self.parse_and()? {
            branches.push(node);
        }

        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            if let Some(node) = self.parse_and()? {
                branches.push(node);
            }
        }

        Ok(if branches.is_empty() {
            None
        } else {
            Some(QueryNode::or(branches))
        })
    }

    fn parse_and(&mut self) -> ParseResult<Option<QueryNode>> {
        let mut operands = Vec::new();

        loop {
            match self.peek() {
                None | Some(Token::Or) | Some(Token::Close) => break,
                Some(Token::And) => {
                    // explicit AND behaves like adjacency
                    self.advance();
                }
                Some(_) => {
                    if let Some(node) = self.parse_unary()? {
                        operands.push(node);
                    }
                }
            }
        }

        Ok(if operands.is_empty() {
            None
        } else {
            Some(QueryNode::and(operands))
        })
    }

    fn parse_unary(&mut self) -> ParseResult<Option<QueryNode>> {
        match self.peek() {
            Some(Token::Not) => {
                self.advance();
                Ok(self.parse_unary()?.map(QueryNode::negate))
            }
            Some(Token::Word(_)) | Some(Token::Phrase(_)) => match self.advance() {
                Some(Token::Word(text)) => Ok(Some(QueryNode::term(text))),
                Some(Token::Phrase(text)) => Ok(Some(QueryNode::phrase(text))),
                _ => Ok(None),
            },
            Some(Token::Open) => {
                self.advance();
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(ParseError::UnbalancedGroup),
                }
            }
            _ => Ok(None),
        }
    }
}
