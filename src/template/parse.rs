//! Template parser: turns lexed items into an executable node tree.

use super::funcs;
use super::lexer::{Item, Spanned, Token};
use super::TemplateSyntaxError;

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text(String),
    Action(Action),
    If(Branch),
    With(Branch),
}

/// Location of an action, carried into render errors.
#[derive(Debug, Clone)]
pub(crate) struct Span {
    pub line: usize,
    pub source: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Action {
    pub span: Span,
    pub pipe: Pipeline,
}

#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub span: Span,
    pub pipe: Pipeline,
    pub then: Vec<Node>,
    pub otherwise: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

/// First argument is the operand (or function); the rest are its arguments.
#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone)]
pub(crate) enum Arg {
    /// `.`
    Dot,
    /// `.A.B` relative to dot.
    Field(Vec<String>),
    /// `$` or `$.A.B` relative to the root data.
    Root(Vec<String>),
    /// `(pipeline).A.B`
    Chain(Box<Pipeline>, Vec<String>),
    Function(String),
    Str(String),
    Int(i64),
    Bool(bool),
    Nil,
}

/// Deepest nesting of blocks and parenthesized pipelines a template may use.
/// Parsing and evaluation both recurse once per level.
const MAX_DEPTH: usize = 100;

/// Parse lexed items into a node list.
pub(crate) fn parse(name: &str, items: Vec<Item>) -> Result<Vec<Node>, TemplateSyntaxError> {
    let mut parser = Parser {
        name,
        items: items.into_iter(),
        last_line: 1,
        depth: 0,
    };
    let (nodes, end) = parser.parse_list()?;
    match end {
        End::Eof => Ok(nodes),
        End::End(line) => Err(parser.error(line, "unexpected {{end}}")),
        End::Else(line, _) => Err(parser.error(line, "unexpected {{else}}")),
    }
}

/// What terminated a node list.
enum End {
    Eof,
    End(usize),
    /// `{{else}}` with the tokens that followed the keyword (for `else if`).
    Else(usize, Vec<Spanned>),
}

struct Parser<'a> {
    name: &'a str,
    items: std::vec::IntoIter<Item>,
    last_line: usize,
    /// Open `if`/`with` blocks and parenthesized pipelines.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, line: usize, message: &str) -> TemplateSyntaxError {
        TemplateSyntaxError::new(self.name, line, message)
    }

    fn enter(&mut self, line: usize) -> Result<(), TemplateSyntaxError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(line, &format!("max nesting depth of {} exceeded", MAX_DEPTH)));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, End), TemplateSyntaxError> {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let (line, source, tokens) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { line, source, tokens } => (line, source, tokens),
            };
            self.last_line = line;
            let span = Span { line, source };

            let keyword = match tokens.first() {
                Some(Spanned { token: Token::Ident(word), .. }) => word.clone(),
                _ => String::new(),
            };

            match keyword.as_str() {
                "end" => {
                    if tokens.len() > 1 {
                        return Err(self.error(line, "unexpected token in end"));
                    }
                    return Ok((nodes, End::End(line)));
                }
                "else" => return Ok((nodes, End::Else(line, tokens[1..].to_vec()))),
                "if" | "with" => {
                    let branch = self.parse_branch(&keyword, span, &tokens[1..])?;
                    nodes.push(if keyword == "if" {
                        Node::If(branch)
                    } else {
                        Node::With(branch)
                    });
                }
                "range" | "define" | "template" | "block" | "break" | "continue" => {
                    return Err(self.error(line, &format!("unsupported action {:?}", keyword)));
                }
                _ => {
                    let pipe = self.parse_pipeline(line, &tokens, "command")?;
                    nodes.push(Node::Action(Action { span, pipe }));
                }
            }
        }

        Ok((nodes, End::Eof))
    }

    /// Parse the body of `if`/`with` after its keyword.
    fn parse_branch(
        &mut self,
        keyword: &str,
        span: Span,
        tokens: &[Spanned],
    ) -> Result<Branch, TemplateSyntaxError> {
        let line = span.line;
        self.enter(line)?;
        let pipe = self.parse_pipeline(line, tokens, keyword)?;
        let (then, end) = self.parse_list()?;

        let otherwise = match end {
            End::Eof => return Err(self.error(self.last_line, "unexpected EOF")),
            End::End(_) => Vec::new(),
            End::Else(else_line, rest) => {
                // `{{else if ...}}` / `{{else with ...}}` nest a branch that
                // shares the outer `{{end}}`.
                match rest.first() {
                    None => {
                        let (otherwise, end) = self.parse_list()?;
                        match end {
                            End::End(_) => otherwise,
                            End::Eof => {
                                return Err(self.error(self.last_line, "unexpected EOF"))
                            }
                            End::Else(line, _) => {
                                return Err(self.error(line, "expected end; found {{else}}"))
                            }
                        }
                    }
                    Some(Spanned { token: Token::Ident(word), .. })
                        if word == "if" || word == "with" =>
                    {
                        let nested_span = Span {
                            line: else_line,
                            source: span.source.clone(),
                        };
                        let word = word.clone();
                        let nested = self.parse_branch(&word, nested_span, &rest[1..])?;
                        vec![if word == "if" {
                            Node::If(nested)
                        } else {
                            Node::With(nested)
                        }]
                    }
                    Some(_) => return Err(self.error(else_line, "unexpected token in else")),
                }
            }
        };

        self.leave();
        Ok(Branch {
            span,
            pipe,
            then,
            otherwise,
        })
    }

    fn parse_pipeline(
        &mut self,
        line: usize,
        tokens: &[Spanned],
        context: &str,
    ) -> Result<Pipeline, TemplateSyntaxError> {
        if tokens.is_empty() {
            return Err(self.error(line, &format!("missing value for {}", context)));
        }

        let mut commands = Vec::new();
        for segment in split_pipes(tokens) {
            if segment.is_empty() {
                return Err(self.error(line, "missing value for command"));
            }
            commands.push(self.parse_command(line, segment)?);
        }

        // Piped values go to the last argument of a call, so later stages must be calls.
        for (stage, command) in commands.iter().enumerate().skip(1) {
            let callable = matches!(
                command.args.first(),
                Some(Arg::Function(_) | Arg::Field(_) | Arg::Root(_) | Arg::Chain(..))
            );
            if !callable {
                let message = format!("non executable command in pipeline stage {}", stage + 1);
                return Err(self.error(line, &message));
            }
        }

        Ok(Pipeline { commands })
    }

    fn parse_command(&mut self, line: usize, tokens: &[Spanned]) -> Result<Command, TemplateSyntaxError> {
        let mut args = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let (arg, used) = self.parse_operand(line, &tokens[i..])?;
            if i > 0 && !tokens[i].spaced && !matches!(tokens[i].token, Token::LeftParen) {
                return Err(self.error(line, "missing space between operands"));
            }
            args.push(arg);
            i += used;
        }

        Ok(Command { args })
    }

    /// Parse one operand, returning it and the number of tokens consumed.
    fn parse_operand(&mut self, line: usize, tokens: &[Spanned]) -> Result<(Arg, usize), TemplateSyntaxError> {
        let (base, mut used) = match &tokens[0].token {
            Token::Dot => (Arg::Dot, 1),
            Token::Field(name) => (Arg::Field(vec![name.clone()]), 1),
            Token::Variable(name) if name.is_empty() => (Arg::Root(Vec::new()), 1),
            Token::Variable(name) => {
                return Err(self.error(line, &format!("undefined variable \"${}\"", name)));
            }
            Token::Str(s) => (Arg::Str(s.clone()), 1),
            Token::Number(n) => (Arg::Int(*n), 1),
            Token::Ident(word) => match word.as_str() {
                "true" => (Arg::Bool(true), 1),
                "false" => (Arg::Bool(false), 1),
                "nil" => (Arg::Nil, 1),
                "if" | "else" | "end" | "with" | "range" => {
                    return Err(self.error(line, &format!("unexpected <{}> in command", word)));
                }
                name if funcs::lookup(name).is_some() => (Arg::Function(name.to_string()), 1),
                name => {
                    return Err(self.error(line, &format!("function {:?} not defined", name)));
                }
            },
            Token::LeftParen => {
                let close = matching_paren(tokens)
                    .ok_or_else(|| self.error(line, "unclosed left paren"))?;
                self.enter(line)?;
                let inner = self.parse_pipeline(line, &tokens[1..close], "parenthesized pipeline")?;
                self.leave();
                (Arg::Chain(Box::new(inner), Vec::new()), close + 1)
            }
            Token::RightParen => return Err(self.error(line, "unexpected right paren")),
            Token::Pipe => return Err(self.error(line, "missing value for command")),
        };

        // Collect `.Field` tokens glued to the operand.
        let mut chain = Vec::new();
        while let Some(Spanned { token: Token::Field(name), spaced: false }) = tokens.get(used) {
            chain.push(name.clone());
            used += 1;
        }

        let arg = match base {
            Arg::Field(mut path) => {
                path.extend(chain);
                Arg::Field(path)
            }
            Arg::Root(mut path) => {
                path.extend(chain);
                Arg::Root(path)
            }
            Arg::Chain(pipe, _) => {
                if chain.is_empty() && pipe.commands.len() == 1 && pipe.commands[0].args.len() == 1 {
                    // `(x)` is just `x`
                    pipe.commands[0].args[0].clone()
                } else {
                    Arg::Chain(pipe, chain)
                }
            }
            other if chain.is_empty() => other,
            _ => return Err(self.error(line, "unexpected . after term")),
        };

        Ok((arg, used))
    }
}

/// Split tokens on top-level `|`.
fn split_pipes(tokens: &[Spanned]) -> Vec<&[Spanned]> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, spanned) in tokens.iter().enumerate() {
        match spanned.token {
            Token::LeftParen => depth += 1,
            Token::RightParen => depth = depth.saturating_sub(1),
            Token::Pipe if depth == 0 => {
                segments.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&tokens[start..]);
    segments
}

/// Index of the paren closing `tokens[0]`.
fn matching_paren(tokens: &[Spanned]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, spanned) in tokens.iter().enumerate() {
        match spanned.token {
            Token::LeftParen => depth += 1,
            Token::RightParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::lexer::lex;
    use super::*;

    fn parse_src(src: &str) -> Result<Vec<Node>, TemplateSyntaxError> {
        parse("t", lex("t", src)?)
    }

    #[test]
    fn test_method_chain_arguments() {
        let nodes = parse_src(r#"{{.URL.Query.Get "q"}}"#).unwrap();
        let Node::Action(action) = &nodes[0] else { panic!("expected action") };
        let args = &action.pipe.commands[0].args;
        assert!(matches!(&args[0], Arg::Field(path) if path == &["URL", "Query", "Get"]));
        assert!(matches!(&args[1], Arg::Str(s) if s == "q"));
    }

    #[test]
    fn test_if_else_if_chain() {
        let nodes = parse_src(r#"{{if .A}}a{{else if .B}}b{{else}}c{{end}}"#).unwrap();
        let Node::If(branch) = &nodes[0] else { panic!("expected if") };
        assert_eq!(branch.then.len(), 1);
        let Node::If(nested) = &branch.otherwise[0] else { panic!("expected nested if") };
        assert_eq!(nested.otherwise.len(), 1);
    }

    #[test]
    fn test_pipeline_and_parens() {
        let nodes = parse_src(r#"{{(.Header.Get "X") | lower | printf "%s!"}}"#).unwrap();
        let Node::Action(action) = &nodes[0] else { panic!("expected action") };
        assert_eq!(action.pipe.commands.len(), 3);
    }

    #[test]
    fn test_root_variable() {
        let nodes = parse_src("{{with .URL}}{{$.Method}}{{end}}").unwrap();
        let Node::With(branch) = &nodes[0] else { panic!("expected with") };
        let Node::Action(action) = &branch.then[0] else { panic!("expected action") };
        assert!(matches!(&action.pipe.commands[0].args[0], Arg::Root(path) if path == &["Method"]));
    }

    #[test]
    fn test_unknown_field_parses() {
        assert!(parse_src("{{.Nonexistent.Field}}").is_ok());
    }

    #[test]
    fn test_nesting_limit() {
        let within = format!("{{{{{}.Method{}}}}}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse_src(&within).is_ok());

        let parens = format!("{{{{{}.Method{}}}}}", "(".repeat(20_000), ")".repeat(20_000));
        let err = parse_src(&parens).unwrap_err();
        assert!(err.message.contains("max nesting depth"), "{}", err.message);

        let ifs = format!("{}x{}", "{{if 1}}".repeat(50_000), "{{end}}".repeat(50_000));
        let err = parse_src(&ifs).unwrap_err();
        assert!(err.message.contains("max nesting depth"), "{}", err.message);
    }

    #[test]
    fn test_else_if_chain_counts_as_nesting() {
        let mut src = String::from("{{if 0}}a");
        for _ in 0..MAX_DEPTH {
            src.push_str("{{else if 0}}b");
        }
        src.push_str("{{end}}");
        assert!(parse_src(&src).unwrap_err().message.contains("max nesting depth"));
    }

    #[test]
    fn test_syntax_errors() {
        let cases = [
            ("{{}}", "missing value for command"),
            ("{{if .A}}x", "unexpected EOF"),
            ("x{{end}}", "unexpected {{end}}"),
            ("{{else}}", "unexpected {{else}}"),
            ("{{nope .A}}", "function \"nope\" not defined"),
            ("{{$x}}", "undefined variable"),
            ("{{range .A}}{{end}}", "unsupported action"),
            ("{{.A | }}", "missing value for command"),
            ("{{(.A}}", "unclosed left paren"),
            ("{{if}}{{end}}", "missing value for if"),
        ];
        for (src, expected) in cases {
            let err = parse_src(src).unwrap_err();
            assert!(
                err.message.contains(expected),
                "{:?}: expected {:?}, got {:?}",
                src,
                expected,
                err.message
            );
        }
    }
}
