//! Builtin template functions.
//!
//! The registry is closed: templates can only call what is listed here.

use std::borrow::Cow;

use super::value::Value;

pub(crate) type Func = for<'a> fn(Vec<Value<'a>>) -> Result<Value<'a>, String>;

const BUILTINS: &[(&str, Func)] = &[
    ("and", and),
    ("or", or),
    ("not", not),
    ("eq", eq),
    ("ne", ne),
    ("len", len),
    ("index", index),
    ("print", print),
    ("printf", printf),
    ("println", println),
    ("urlquery", urlquery),
    ("html", html),
    ("js", js),
    ("lower", lower),
    ("upper", upper),
    ("trim", trim),
    ("default", default),
];

pub(crate) fn lookup(name: &str) -> Option<Func> {
    BUILTINS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, func)| *func)
}

/// Functions whose arguments are evaluated only until the result is decided.
pub(crate) fn is_short_circuit(name: &str) -> bool {
    matches!(name, "and" | "or")
}

fn arity(name: &str, args: &[Value<'_>], want: usize) -> Result<(), String> {
    if args.len() == want {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args for {}: want {} got {}",
            name,
            want,
            args.len()
        ))
    }
}

fn at_least(name: &str, args: &[Value<'_>], want: usize) -> Result<(), String> {
    if args.len() >= want {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args for {}: want at least {} got {}",
            name,
            want,
            args.len()
        ))
    }
}

fn and<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    at_least("and", &args, 1)?;
    let mut last = Value::Missing;
    for arg in args {
        if !arg.is_truthy() {
            return Ok(arg);
        }
        last = arg;
    }
    Ok(last)
}

fn or<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    at_least("or", &args, 1)?;
    let mut last = Value::Missing;
    for arg in args {
        if arg.is_truthy() {
            return Ok(arg);
        }
        last = arg;
    }
    Ok(last)
}

fn not<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    arity("not", &args, 1)?;
    Ok(Value::Bool(!args[0].is_truthy()))
}

fn basic_eq(a: &Value<'_>, b: &Value<'_>) -> Result<bool, String> {
    match (a, b) {
        (Value::Missing, Value::Missing) => Ok(true),
        (Value::Missing, _) | (_, Value::Missing) => Ok(false),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        (x, y) if x.kind() == y.kind() => Err(format!("non-comparable type {}", x.kind())),
        _ => Err("incompatible types for comparison".to_string()),
    }
}

fn eq<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    at_least("eq", &args, 2)?;
    for other in &args[1..] {
        if basic_eq(&args[0], other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn ne<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    arity("ne", &args, 2)?;
    Ok(Value::Bool(!basic_eq(&args[0], &args[1])?))
}

fn len<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    arity("len", &args, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.len(),
        Value::List(items) => items.len(),
        Value::Values(values) => values.len(),
        Value::Header(headers) => headers.keys_len(),
        other => return Err(format!("len of type {}", other.kind())),
    };
    Ok(Value::Int(n as i64))
}

fn index<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    at_least("index", &args, 1)?;
    let mut args = args.into_iter();
    let mut item = args.next().unwrap_or(Value::Missing);
    for key in args {
        item = match (&item, &key) {
            (Value::Values(_) | Value::Header(_), Value::Str(name)) => item.field(name, &[])?,
            (Value::List(items), Value::Int(i)) => {
                let found = usize::try_from(*i).ok().and_then(|i| items.get(i));
                match found {
                    Some(s) => Value::Str(s.clone()),
                    None => return Err(format!("index out of range: {}", i)),
                }
            }
            (Value::Missing, _) => return Err("index of untyped nil".to_string()),
            (container, key) => {
                return Err(format!(
                    "can't index item of type {} with {}",
                    container.kind(),
                    key.kind()
                ))
            }
        };
    }
    Ok(item)
}

/// `fmt.Sprint` spacing: a space between operands when neither is a string.
fn sprint(args: &[Value<'_>]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let is_str = matches!(arg, Value::Str(_));
        if i > 0 && !is_str && !matches!(args[i - 1], Value::Str(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    out
}

fn print<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    Ok(Value::string(sprint(&args)))
}

fn println<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    let mut out = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    Ok(Value::string(out))
}

fn printf<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    at_least("printf", &args, 1)?;
    let format = args[0].to_string();
    let mut operands = args[1..].iter();
    let mut out = String::new();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(operand) = operands.next() else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        match (verb, operand) {
            ('s' | 'v', value) => out.push_str(&value.to_string()),
            ('d', Value::Int(n)) => out.push_str(&n.to_string()),
            ('q', value) => out.push_str(&format!("{:?}", value.to_string())),
            ('t', Value::Bool(b)) => out.push_str(&b.to_string()),
            (verb, value) => out.push_str(&format!("%!{}({}={})", verb, value.kind(), value)),
        }
    }

    let extra: Vec<String> = operands
        .map(|value| format!("{}={}", value.kind(), value))
        .collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    Ok(Value::string(out))
}

fn urlquery<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    let text = sprint(&args);
    Ok(Value::string(
        url::form_urlencoded::byte_serialize(text.as_bytes()).collect(),
    ))
}

fn html<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    let text = sprint(&args);
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\0' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    Ok(Value::string(out))
}

fn js<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    let text = sprint(&args);
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    Ok(Value::string(out))
}

fn map_str<'a>(
    name: &str,
    args: Vec<Value<'a>>,
    f: impl Fn(&str) -> Cow<'_, str>,
) -> Result<Value<'a>, String> {
    arity(name, &args, 1)?;
    let text = args[0].to_string();
    Ok(Value::string(f(&text).into_owned()))
}

fn lower<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    map_str("lower", args, |s| Cow::Owned(s.to_lowercase()))
}

fn upper<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    map_str("upper", args, |s| Cow::Owned(s.to_uppercase()))
}

fn trim<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    map_str("trim", args, |s| Cow::Borrowed(s.trim()))
}

/// `default fallback value`: `value` when truthy, otherwise `fallback`.
fn default<'a>(args: Vec<Value<'a>>) -> Result<Value<'a>, String> {
    arity("default", &args, 2)?;
    let mut args = args.into_iter();
    let fallback = args.next().unwrap_or(Value::Missing);
    let value = args.next().unwrap_or(Value::Missing);
    Ok(if value.is_truthy() { value } else { fallback })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value<'static>>) -> Result<String, String> {
        let func = lookup(name).expect("builtin");
        func(args).map(|v| v.to_string())
    }

    fn s(text: &'static str) -> Value<'static> {
        Value::str(text)
    }

    #[test]
    fn test_print_spacing() {
        assert_eq!(call("print", vec![s("a"), s("b")]).unwrap(), "ab");
        assert_eq!(call("print", vec![Value::Int(1), Value::Int(2)]).unwrap(), "1 2");
        assert_eq!(call("println", vec![s("a"), s("b")]).unwrap(), "a b\n");
    }

    #[test]
    fn test_printf() {
        assert_eq!(
            call("printf", vec![s("%s=%d%%"), s("n"), Value::Int(5)]).unwrap(),
            "n=5%"
        );
        assert_eq!(call("printf", vec![s("%q"), s("a\"b")]).unwrap(), r#""a\"b""#);
        assert_eq!(call("printf", vec![s("%s")]).unwrap(), "%!s(MISSING)");
    }

    #[test]
    fn test_escapers() {
        assert_eq!(call("urlquery", vec![s("a b&c")]).unwrap(), "a+b%26c");
        assert_eq!(call("html", vec![s("<a href='x'>")]).unwrap(), "&lt;a href=&#39;x&#39;&gt;");
        assert_eq!(call("js", vec![s("it's <b>")]).unwrap(), "it\\'s \\u003Cb\\u003E");
    }

    #[test]
    fn test_logic() {
        assert_eq!(call("and", vec![s("x"), s("")]).unwrap(), "");
        assert_eq!(call("or", vec![s(""), s("y")]).unwrap(), "y");
        assert_eq!(call("not", vec![s("")]).unwrap(), "true");
        assert_eq!(call("eq", vec![s("a"), s("b"), s("a")]).unwrap(), "true");
        assert_eq!(call("ne", vec![Value::Int(1), Value::Int(1)]).unwrap(), "false");
        assert!(call("eq", vec![s("1"), Value::Int(1)]).is_err());
    }

    #[test]
    fn test_strings_and_default() {
        assert_eq!(call("lower", vec![s("GoLang")]).unwrap(), "golang");
        assert_eq!(call("upper", vec![s("go")]).unwrap(), "GO");
        assert_eq!(call("trim", vec![s("  x ")]).unwrap(), "x");
        assert_eq!(call("default", vec![s("fallback"), s("")]).unwrap(), "fallback");
        assert_eq!(call("default", vec![s("fallback"), s("v")]).unwrap(), "v");
        assert_eq!(call("len", vec![s("four")]).unwrap(), "4");
    }

    #[test]
    fn test_arity_errors() {
        assert!(call("not", vec![]).is_err());
        assert!(call("default", vec![s("x")]).is_err());
        assert!(lookup("exec").is_none());
    }
}
