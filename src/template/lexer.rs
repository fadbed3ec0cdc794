//! Template lexer.
//!
//! Splits template source into literal text and actions, applying `{{-`/`-}}`
//! trim markers and dropping comments, then tokenizes each action body.

use super::TemplateSyntaxError;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

/// A lexical token inside an action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// A lone `.` (the current data).
    Dot,
    /// `.Name`
    Field(String),
    /// `$` or `$name`; the stored name excludes the sigil.
    Variable(String),
    /// Bare identifier: function name or keyword.
    Ident(String),
    Str(String),
    Number(i64),
    Pipe,
    LeftParen,
    RightParen,
}

/// Token plus whether whitespace separated it from the previous token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub spaced: bool,
}

/// Output of the lexer: text runs and tokenized actions, in source order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action {
        line: usize,
        source: String,
        tokens: Vec<Spanned>,
    },
}

/// Lex a template into items.
pub(crate) fn lex(name: &str, src: &str) -> Result<Vec<Item>, TemplateSyntaxError> {
    let mut items = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    while pos <= src.len() {
        let rest = &src[pos..];
        let Some(offset) = rest.find(LEFT_DELIM) else {
            push_text(&mut items, rest, trim_next, false);
            break;
        };

        let open = pos + offset;
        let line = line_at(src, open);
        let mut body = open + LEFT_DELIM.len();
        let trim_prev = has_left_trim(&src[body..]);
        if trim_prev {
            body += 2;
        }
        push_text(&mut items, &src[pos..open], trim_next, trim_prev);

        let err = |message: &str| TemplateSyntaxError::new(name, line, message);

        // Comments must directly follow the delimiter.
        if src[body..].starts_with(LEFT_COMMENT) {
            let Some(end) = src[body..].find(RIGHT_COMMENT) else {
                return Err(err("unclosed comment"));
            };
            let after = body + end + RIGHT_COMMENT.len();
            let (close, trim) = match closing_delim(&src[after..]) {
                Some(found) => found,
                None => return Err(err("comment ends before closing delimiter")),
            };
            trim_next = trim;
            pos = after + close;
            continue;
        }

        let lexed = lex_action(&src[body..]).map_err(|message| err(&message))?;
        items.push(Item::Action {
            line,
            source: src[body..body + lexed.source_len].trim().to_string(),
            tokens: lexed.tokens,
        });
        trim_next = lexed.trim_right;
        pos = body + lexed.consumed;
    }

    Ok(items)
}

fn push_text(items: &mut Vec<Item>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

fn line_at(src: &str, pos: usize) -> usize {
    1 + src[..pos].bytes().filter(|b| *b == b'\n').count()
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// `{{- ` : a dash followed by ASCII whitespace.
fn has_left_trim(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

/// Match optional ` -` and then `}}` at the start of `s`.
/// Returns the number of bytes consumed and whether right trim was requested.
fn closing_delim(s: &str) -> Option<(usize, bool)> {
    if s.starts_with(RIGHT_DELIM) {
        return Some((RIGHT_DELIM.len(), false));
    }
    let mut chars = s.char_indices();
    let (_, first) = chars.next()?;
    if !is_space(first) {
        return None;
    }
    let trimmed = s.trim_start_matches(is_space);
    let skipped = s.len() - trimmed.len();
    if trimmed.starts_with("-}}") {
        return Some((skipped + 3, true));
    }
    None
}

struct LexedAction {
    tokens: Vec<Spanned>,
    /// Bytes of the action body excluding the closing delimiter.
    source_len: usize,
    /// Bytes consumed including the closing delimiter.
    consumed: usize,
    trim_right: bool,
}

fn lex_action(s: &str) -> Result<LexedAction, String> {
    let bytes = s.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut spaced = false;

    loop {
        let rest = &s[i..];
        if rest.is_empty() {
            return Err("unclosed action".to_string());
        }
        if rest.starts_with(RIGHT_DELIM) {
            return Ok(LexedAction {
                tokens,
                source_len: i,
                consumed: i + RIGHT_DELIM.len(),
                trim_right: false,
            });
        }

        let c = rest.chars().next().unwrap_or_default();
        if is_space(c) {
            if let Some((len, true)) = closing_delim(rest) {
                return Ok(LexedAction {
                    tokens,
                    source_len: i,
                    consumed: i + len,
                    trim_right: true,
                });
            }
            spaced = true;
            i += c.len_utf8();
            continue;
        }

        let (token, len) = match c {
            '|' => (Token::Pipe, 1),
            '(' => (Token::LeftParen, 1),
            ')' => (Token::RightParen, 1),
            '"' => lex_quoted(rest)?,
            '`' => lex_raw(rest)?,
            '.' => {
                let name_len = ident_len(&rest[1..]);
                if name_len == 0 {
                    (Token::Dot, 1)
                } else {
                    (Token::Field(rest[1..1 + name_len].to_string()), 1 + name_len)
                }
            }
            '$' => {
                let name_len = ident_len(&rest[1..]);
                (Token::Variable(rest[1..1 + name_len].to_string()), 1 + name_len)
            }
            '-' | '+' | '0'..='9'
                if c.is_ascii_digit()
                    || bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) =>
            {
                lex_number(rest)?
            }
            c if c == '_' || c.is_alphabetic() => {
                let len = ident_len(rest);
                (Token::Ident(rest[..len].to_string()), len)
            }
            other => {
                return Err(format!(
                    "unrecognized character in action: U+{:04X} {:?}",
                    other as u32, other
                ));
            }
        };

        tokens.push(Spanned { token, spaced });
        spaced = false;
        i += len;
    }
}

fn ident_len(s: &str) -> usize {
    s.char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(s.len())
}

fn lex_number(s: &str) -> Result<(Token, usize), String> {
    let sign_len = usize::from(s.starts_with(['-', '+']));
    let digits = s[sign_len..]
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(s.len() - sign_len);
    let text = &s[..sign_len + digits];
    let value = text
        .replace('_', "")
        .parse::<i64>()
        .map_err(|_| format!("bad number syntax: {:?}", text))?;
    Ok((Token::Number(value), text.len()))
}

fn lex_raw(s: &str) -> Result<(Token, usize), String> {
    match s[1..].find('`') {
        Some(end) => Ok((Token::Str(s[1..1 + end].to_string()), end + 2)),
        None => Err("unterminated raw quoted string".to_string()),
    }
}

fn lex_quoted(s: &str) -> Result<(Token, usize), String> {
    let mut out = String::new();
    let mut chars = s.char_indices().skip(1);

    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((Token::Str(out), idx + 1)),
            '\n' => break,
            '\\' => {
                let Some((_, esc)) = chars.next() else { break };
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    'x' | 'u' => {
                        let width = if esc == 'x' { 2 } else { 4 };
                        let hex: String = (0..width)
                            .filter_map(|_| chars.next().map(|(_, h)| h))
                            .collect();
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == width)
                            .and_then(char::from_u32)
                            .ok_or_else(|| format!("invalid escape sequence \\{}{}", esc, hex))?;
                        out.push(decoded);
                    }
                    other => return Err(format!("unknown escape sequence: \\{}", other)),
                }
            }
            c => out.push(c),
        }
    }

    Err("unterminated quoted string".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        match lex("t", src).unwrap().into_iter().next() {
            Some(Item::Action { tokens, .. }) => tokens.into_iter().map(|s| s.token).collect(),
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_text_and_action() {
        let items = lex("t", "https://x{{.URL.Path}}/end").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Item::Text("https://x".into()));
        assert_eq!(items[2], Item::Text("/end".into()));
    }

    #[test]
    fn test_field_chain_with_argument() {
        assert_eq!(
            tokens(r#"{{.URL.Query.Get "q"}}"#),
            vec![
                Token::Field("URL".into()),
                Token::Field("Query".into()),
                Token::Field("Get".into()),
                Token::Str("q".into()),
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        let items = lex("t", "a  {{- .Method -}}  b").unwrap();
        assert_eq!(items[0], Item::Text("a".into()));
        assert_eq!(items[2], Item::Text("b".into()));
    }

    #[test]
    fn test_dash_without_space_is_a_number() {
        assert_eq!(tokens("{{-3}}"), vec![Token::Number(-3)]);
    }

    #[test]
    fn test_comment_is_dropped() {
        let items = lex("t", "a{{/* note */}}b").unwrap();
        assert_eq!(items, vec![Item::Text("a".into()), Item::Text("b".into())]);
    }

    #[test]
    fn test_string_escapes_and_raw() {
        assert_eq!(
            tokens(r#"{{print "a\tb\x41" `c\n`}}"#),
            vec![
                Token::Ident("print".into()),
                Token::Str("a\tbA".into()),
                Token::Str("c\\n".into()),
            ]
        );
    }

    #[test]
    fn test_closing_delimiter_inside_string() {
        assert_eq!(tokens(r#"{{"}}"}}"#), vec![Token::Str("}}".into())]);
    }

    #[test]
    fn test_errors() {
        assert!(lex("t", "{{.URL").unwrap_err().message.contains("unclosed action"));
        assert!(lex("t", r#"{{"abc}}"#).unwrap_err().message.contains("unterminated"));
        assert!(lex("t", "{{/* x").unwrap_err().message.contains("unclosed comment"));
        assert!(lex("t", "{{ ! }}").unwrap_err().message.contains("unrecognized character"));
    }

    #[test]
    fn test_error_line() {
        let err = lex("svc", "line1\nline2 {{.A").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.to_string(), "template: svc:2: unclosed action");
    }
}
