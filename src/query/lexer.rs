//! Query tokenizer

/// A lexical unit of a search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Word(String),
    Phrase(String),
    And,
    Or,
    Not,
    Open,
    Close,
}

/// Characters that always end a bare word
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '(' | ')' | '|' | '&')
}

/// Split a query into tokens.
///
/// Never fails: anything that is not an operator, a quote or a parenthesis
/// becomes part of a word.
pub(crate) fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        match c {
            '"' => {
                chars.next();
                let body_start = start + c.len_utf8();
                let mut body_end = input.len();
                for (i, ch) in chars.by_ref() {
                    if ch == '"' {
                        body_end = i;
                        break;
                    }
                }
                // An unterminated quote runs to the end of the input
                let phrase = input[body_start..body_end].trim();
                if !phrase.is_empty() {
                    tokens.push(Token::Phrase(phrase.to_lowercase()));
                }
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '|' | '&' => {
                chars.next();
                // `||` and `&&` are accepted as single operators
                while chars.peek().map(|&(_, next)| next == c).unwrap_or(false) {
                    chars.next();
                }
                tokens.push(if c == '|' { Token::Or } else { Token::And });
            }
            '-' => {
                chars.next();
                tokens.push(Token::Not);
            }
            _ => {
                let mut end = input.len();
                while let Some(&(i, ch)) = chars.peek() {
                    if is_delimiter(ch) {
                        end = i;
                        break;
                    }
                    chars.next();
                }
                let word = &input[start..end];
                tokens.push(keyword(word).unwrap_or_else(|| Token::Word(word.to_lowercase())));
            }
        }
    }

    tokens
}

fn keyword(word: &str) -> Option<Token> {
    if word.eq_ignore_ascii_case("and") {
        Some(Token::And)
    } else if word.eq_ignore_ascii_case("or") {
        Some(Token::Or)
    } else if word.eq_ignore_ascii_case("not") {
        Some(Token::Not)
    } else {
        None
    }
}
