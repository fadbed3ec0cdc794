//! Runtime values produced while executing a template.

use std::borrow::Cow;
use std::fmt;

use axum::http::HeaderMap;

use super::context::{Binding, FormValues};

#[derive(Debug, Clone)]
pub(crate) enum Value<'a> {
    /// Absent map entry or `nil`.
    Missing,
    Bool(bool),
    Int(i64),
    Str(Cow<'a, str>),
    List(Vec<Cow<'a, str>>),
    Request(Binding<'a>),
    Url(Binding<'a>),
    Values(&'a FormValues),
    Header(&'a HeaderMap),
}

impl<'a> Value<'a> {
    pub fn str(s: &'a str) -> Self {
        Value::Str(Cow::Borrowed(s))
    }

    pub fn string(s: String) -> Self {
        Value::Str(Cow::Owned(s))
    }

    /// Type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Missing => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Request(_) => "request",
            Value::Url(_) => "url",
            Value::Values(_) => "values",
            Value::Header(_) => "header",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Missing => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Request(_) | Value::Url(_) => true,
            Value::Values(values) => !values.is_empty(),
            Value::Header(headers) => !headers.is_empty(),
        }
    }

    /// Resolve `.name args...` on this value.
    pub fn field(&self, name: &str, args: &[Value<'a>]) -> Result<Value<'a>, String> {
        match self {
            Value::Request(binding) => request_field(*binding, name, args),
            Value::Url(binding) => url_field(*binding, name, args),
            Value::Values(values) => values_field(values, name, args),
            Value::Header(headers) => header_field(headers, name, args),
            Value::Missing => Err(format!("nil pointer evaluating <no value>.{}", name)),
            other => Err(format!(
                "can't evaluate field {} in type {}",
                name,
                other.kind()
            )),
        }
    }
}

fn no_args(name: &str, args: &[Value<'_>]) -> Result<(), String> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(format!("{} has arguments but cannot be invoked as function", name))
    }
}

fn string_arg<'v>(name: &str, args: &'v [Value<'_>]) -> Result<&'v str, String> {
    match args {
        [Value::Str(s)] => Ok(s.as_ref()),
        [other] => Err(format!(
            "wrong type for value; expected string; got {} in call to {}",
            other.kind(),
            name
        )),
        _ => Err(format!(
            "wrong number of args for {}: want 1 got {}",
            name,
            args.len()
        )),
    }
}

fn request_field<'a>(binding: Binding<'a>, name: &str, args: &[Value<'a>]) -> Result<Value<'a>, String> {
    let request = binding.request;
    if name == "FormValue" {
        let key = string_arg(name, args)?;
        return Ok(Value::str(request.form().get(key)));
    }
    no_args(name, args)?;
    Ok(match name {
        "Method" => Value::str(request.method().as_str()),
        "Host" => Value::str(request.host()),
        "RequestURI" => Value::str(request.request_uri()),
        "Proto" => Value::str(request.proto()),
        "RemoteAddr" => Value::string(request.remote_addr()),
        "URL" => Value::Url(binding),
        "Header" => Value::Header(request.headers()),
        "Form" => Value::Values(request.form()),
        "Service" => Value::str(binding.service),
        _ => return Err(format!("can't evaluate field {} in type request", name)),
    })
}

fn url_field<'a>(binding: Binding<'a>, name: &str, args: &[Value<'a>]) -> Result<Value<'a>, String> {
    no_args(name, args)?;
    let uri = binding.request.uri();
    Ok(match name {
        "Path" => Value::str(binding.path),
        "RawQuery" => Value::str(uri.query().unwrap_or("")),
        "Host" => Value::str(uri.authority().map(|a| a.as_str()).unwrap_or("")),
        "Scheme" => Value::str(uri.scheme_str().unwrap_or("")),
        // Fragments are never sent to servers.
        "Fragment" => Value::str(""),
        "String" => Value::string(uri.to_string()),
        "Query" => Value::Values(binding.request.query()),
        _ => return Err(format!("can't evaluate field {} in type url", name)),
    })
}

fn values_field<'a>(values: &'a FormValues, name: &str, args: &[Value<'a>]) -> Result<Value<'a>, String> {
    match name {
        "Get" => Ok(Value::str(values.get(string_arg(name, args)?))),
        "Has" => Ok(Value::Bool(values.has(string_arg(name, args)?))),
        key => {
            no_args(name, args)?;
            Ok(values
                .values(key)
                .map(|items| Value::List(items.iter().map(|s| Cow::Borrowed(s.as_str())).collect()))
                .unwrap_or(Value::Missing))
        }
    }
}

fn header_values<'a>(headers: &'a HeaderMap, key: &str) -> Vec<Cow<'a, str>> {
    headers
        .get_all(key)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .collect()
}

fn header_field<'a>(headers: &'a HeaderMap, name: &str, args: &[Value<'a>]) -> Result<Value<'a>, String> {
    match name {
        "Get" => {
            let key = string_arg(name, args)?;
            Ok(header_values(headers, key)
                .into_iter()
                .next()
                .map(Value::Str)
                .unwrap_or(Value::str("")))
        }
        "Values" => Ok(Value::List(header_values(headers, string_arg(name, args)?))),
        key => {
            no_args(name, args)?;
            let values = header_values(headers, key);
            Ok(if values.is_empty() {
                Value::Missing
            } else {
                Value::List(values)
            })
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => f.write_str("<no value>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => write!(f, "[{}]", items.join(" ")),
            Value::Request(binding) => f.write_str(binding.request.request_uri()),
            Value::Url(binding) => write!(f, "{}", binding.request.uri()),
            Value::Values(values) => write!(f, "{}", values),
            Value::Header(headers) => {
                let mut first = true;
                for (name, value) in headers.iter() {
                    if !first {
                        f.write_str("; ")?;
                    }
                    first = false;
                    write!(f, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
                }
                Ok(())
            }
        }
    }
}
