//! Template execution.

use super::context::Binding;
use super::funcs;
use super::parse::{Arg, Branch, Command, Node, Pipeline, Span};
use super::value::Value;
use super::RenderError;

/// Upper bound on rendered output; a redirect target has no business being larger.
const MAX_OUTPUT: usize = 64 * 1024;

pub(crate) struct State<'t, 'a> {
    name: &'t str,
    root: Value<'a>,
    out: String,
}

impl<'t, 'a> State<'t, 'a> {
    pub fn new(name: &'t str, binding: Binding<'a>) -> Self {
        Self {
            name,
            root: Value::Request(binding),
            out: String::new(),
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn error(&self, span: &Span, message: impl Into<String>) -> RenderError {
        RenderError {
            name: self.name.to_string(),
            line: span.line,
            action: span.source.clone(),
            message: message.into(),
        }
    }

    pub fn walk(&mut self, dot: &Value<'a>, nodes: &[Node]) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(action) => {
                    let value = self
                        .pipeline(dot, &action.pipe)
                        .map_err(|message| self.error(&action.span, message))?;
                    self.out.push_str(&value.to_string());
                    if self.out.len() > MAX_OUTPUT {
                        return Err(self.error(&action.span, "output exceeds size limit"));
                    }
                }
                Node::If(branch) => self.branch(dot, branch, false)?,
                Node::With(branch) => self.branch(dot, branch, true)?,
            }
        }
        Ok(())
    }

    fn branch(&mut self, dot: &Value<'a>, branch: &Branch, rebind: bool) -> Result<(), RenderError> {
        let value = self
            .pipeline(dot, &branch.pipe)
            .map_err(|message| self.error(&branch.span, message))?;
        if value.is_truthy() {
            if rebind {
                self.walk(&value, &branch.then)
            } else {
                self.walk(dot, &branch.then)
            }
        } else {
            self.walk(dot, &branch.otherwise)
        }
    }

    fn pipeline(&self, dot: &Value<'a>, pipe: &Pipeline) -> Result<Value<'a>, String> {
        let mut piped = None;
        for command in &pipe.commands {
            piped = Some(self.command(dot, command, piped.take())?);
        }
        Ok(piped.unwrap_or(Value::Missing))
    }

    fn command(&self, dot: &Value<'a>, command: &Command, piped: Option<Value<'a>>) -> Result<Value<'a>, String> {
        let (head, rest) = match command.args.split_first() {
            Some(split) => split,
            None => return Err("empty command".to_string()),
        };

        match head {
            Arg::Function(name) => {
                let func = funcs::lookup(name).ok_or_else(|| format!("function {:?} not defined", name))?;
                let mut args = Vec::with_capacity(rest.len() + 1);
                let short_circuit = funcs::is_short_circuit(name);
                for arg in rest {
                    let value = self.operand(dot, arg)?;
                    let decided = short_circuit && (value.is_truthy() == (name == "or"));
                    args.push(value);
                    if decided {
                        return func(args);
                    }
                }
                if let Some(value) = piped {
                    args.push(value);
                }
                func(args)
            }
            Arg::Field(path) => self.call_chain(dot.clone(), path, rest, dot, piped),
            Arg::Root(path) => self.call_chain(self.root.clone(), path, rest, dot, piped),
            Arg::Chain(pipe, path) => {
                let receiver = self.pipeline(dot, pipe)?;
                self.call_chain(receiver, path, rest, dot, piped)
            }
            _ if !rest.is_empty() || piped.is_some() => {
                Err("can't give argument to non-function".to_string())
            }
            Arg::Nil => Err("nil is not a command".to_string()),
            other => self.operand(dot, other),
        }
    }

    /// Walk a field chain; arguments (and any piped value) go to the last element.
    fn call_chain(
        &self,
        receiver: Value<'a>,
        path: &[String],
        rest: &[Arg],
        dot: &Value<'a>,
        piped: Option<Value<'a>>,
    ) -> Result<Value<'a>, String> {
        let Some((last, init)) = path.split_last() else {
            if !rest.is_empty() || piped.is_some() {
                return Err("can't give argument to non-function".to_string());
            }
            return Ok(receiver);
        };

        let mut value = receiver;
        for name in init {
            value = value.field(name, &[])?;
        }

        let mut args = rest
            .iter()
            .map(|arg| self.operand(dot, arg))
            .collect::<Result<Vec<_>, _>>()?;
        args.extend(piped);
        value.field(last, &args)
    }

    /// Evaluate an argument position: fields without arguments, literals, nested pipelines.
    fn operand(&self, dot: &Value<'a>, arg: &Arg) -> Result<Value<'a>, String> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Field(path) => self.call_chain(dot.clone(), path, &[], dot, None),
            Arg::Root(path) => self.call_chain(self.root.clone(), path, &[], dot, None),
            Arg::Chain(pipe, path) => {
                let receiver = self.pipeline(dot, pipe)?;
                self.call_chain(receiver, path, &[], dot, None)
            }
            Arg::Function(name) => {
                let command = Command {
                    args: vec![Arg::Function(name.clone())],
                };
                self.command(dot, &command, None)
            }
            Arg::Str(s) => Ok(Value::string(s.clone())),
            Arg::Int(n) => Ok(Value::Int(*n)),
            Arg::Bool(b) => Ok(Value::Bool(*b)),
            Arg::Nil => Ok(Value::Missing),
        }
    }
}
