//! Global functions and element helpers of the reference interpreter.

use super::value::{Function, RemoteValue};
use super::{set_property, Interpreter, RemoteError};
use jsproxy_command::AssetKind;

type Args = Vec<RemoteValue>;

fn arg(args: &[RemoteValue], i: usize) -> RemoteValue {
    args.get(i).cloned().unwrap_or_default()
}

fn define<F>(target: &RemoteValue, name: &str, body: F)
where
    F: Fn(&mut Interpreter, &RemoteValue, Args) -> Result<RemoteValue, RemoteError> + 'static,
{
    let f = RemoteValue::function(Function::native(name, body));
    // Builtins are only ever installed on objects.
    let _ = set_property(target, name.to_string(), f);
}

pub(super) fn install(window: &RemoteValue, element: &RemoteValue) {
    define(window, "parseInt", |_, _, args| {
        let radix = arg(&args, 1).as_number().map(|r| r as u32);
        Ok(RemoteValue::Number(parse_int(&arg(&args, 0).to_display(), radix)))
    });
    define(window, "parseFloat", |_, _, args| {
        Ok(RemoteValue::Number(parse_float(&arg(&args, 0).to_display())))
    });
    define(window, "String", |_, _, args| {
        Ok(RemoteValue::Str(match args.first() {
            Some(v) => v.to_display(),
            None => String::new(),
        }))
    });
    define(window, "Number", |_, _, args| {
        Ok(RemoteValue::Number(match args.first() {
            Some(v) => to_number(v),
            None => 0.0,
        }))
    });
    define(window, "Array", |_, _, args| Ok(RemoteValue::array(args)));
    define(window, "Object", |_, _, args| {
        Ok(match args.into_iter().next() {
            Some(v) if v.is_object_like() => v,
            _ => RemoteValue::object(),
        })
    });
    define(window, "Function", |_, _, _| {
        Err(RemoteError::Thrown(
            "EvalError: code generation from strings is not supported".into(),
        ))
    });

    let console = RemoteValue::object();
    define(&console, "log", |interp, _, args| {
        let line: Vec<String> = args.iter().map(RemoteValue::to_display).collect();
        interp.log(line.join(" "));
        Ok(RemoteValue::Undefined)
    });
    let _ = set_property(window, "console".into(), console);

    let math = RemoteValue::object();
    define(&math, "max", |_, _, args| {
        Ok(RemoteValue::Number(
            args.iter().map(to_number).fold(f64::NEG_INFINITY, f64::max),
        ))
    });
    define(&math, "min", |_, _, args| {
        Ok(RemoteValue::Number(
            args.iter().map(to_number).fold(f64::INFINITY, f64::min),
        ))
    });
    let _ = set_property(window, "Math".into(), math);

    // `element.New(klass, args)` emulates `new` for generated code.
    define(element, "New", |interp, _, args| {
        let klass = arg(&args, 0);
        let items = match arg(&args, 1) {
            RemoteValue::Array(items) => items.borrow().clone(),
            _ => Vec::new(),
        };
        interp.construct(&klass, items)
    });
    define(element, "Load", |interp, _, args| {
        let kind = match arg(&args, 0).to_display().as_str() {
            "css" => AssetKind::Css,
            "js" => AssetKind::Js,
            other => return Err(RemoteError::Thrown(format!("unknown asset kind {}", other))),
        };
        interp.record_asset(kind, arg(&args, 1).to_display(), arg(&args, 2).to_display());
        Ok(RemoteValue::Null)
    });
    define(element, "html", |_, this, args| match args.first() {
        Some(content) => {
            set_property(this, "innerHTML".into(), RemoteValue::Str(content.to_display()))?;
            Ok(this.clone())
        }
        None => super::get_property(this, "innerHTML"),
    });
}

/// Methods reachable on any array.
pub(super) fn array_method(name: &str) -> Option<RemoteValue> {
    let f = match name {
        "push" => Function::native(name, |_, this, args| match this {
            RemoteValue::Array(items) => {
                let mut items = items.borrow_mut();
                items.extend(args);
                Ok(RemoteValue::Number(items.len() as f64))
            }
            _ => Err(RemoteError::Type("push called on non-array".into())),
        }),
        "join" => Function::native(name, |_, this, args| {
            let sep = match args.first() {
                None | Some(RemoteValue::Undefined) => ",".to_string(),
                Some(s) => s.to_display(),
            };
            match this {
                RemoteValue::Array(items) => Ok(RemoteValue::Str(
                    items
                        .borrow()
                        .iter()
                        .map(|v| match v {
                            RemoteValue::Undefined | RemoteValue::Null => String::new(),
                            other => other.to_display(),
                        })
                        .collect::<Vec<_>>()
                        .join(&sep),
                )),
                _ => Err(RemoteError::Type("join called on non-array".into())),
            }
        }),
        _ => return None,
    };
    Some(RemoteValue::function(f))
}

/// Methods reachable on any string.
pub(super) fn string_method(name: &str) -> Option<RemoteValue> {
    let f = match name {
        "toUpperCase" => Function::native(name, |_, this, _| {
            Ok(RemoteValue::Str(this.to_display().to_uppercase()))
        }),
        "toLowerCase" => Function::native(name, |_, this, _| {
            Ok(RemoteValue::Str(this.to_display().to_lowercase()))
        }),
        "split" => Function::native(name, |_, this, args| {
            let text = this.to_display();
            let parts: Vec<RemoteValue> = match args.first() {
                None | Some(RemoteValue::Undefined) => vec![RemoteValue::Str(text)],
                Some(sep) => {
                    let sep = sep.to_display();
                    if sep.is_empty() {
                        text.chars().map(|c| RemoteValue::Str(c.to_string())).collect()
                    } else {
                        text.split(sep.as_str()).map(|s| RemoteValue::Str(s.to_string())).collect()
                    }
                }
            };
            Ok(RemoteValue::array(parts))
        }),
        _ => return None,
    };
    Some(RemoteValue::function(f))
}

pub(super) fn to_number(v: &RemoteValue) -> f64 {
    match v {
        RemoteValue::Undefined => f64::NAN,
        RemoteValue::Null => 0.0,
        RemoteValue::Bool(b) => f64::from(u8::from(*b)),
        RemoteValue::Number(n) => *n,
        RemoteValue::Str(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse().unwrap_or(f64::NAN)
            }
        }
        RemoteValue::Array(items) => {
            let items = items.borrow();
            match items.len() {
                0 => 0.0,
                1 => to_number(&items[0]),
                _ => f64::NAN,
            }
        }
        _ => f64::NAN,
    }
}

fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let mut s = text.trim_start();
    let mut sign = 1.0;
    if let Some(rest) = s.strip_prefix('-') {
        sign = -1.0;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    let mut radix = radix.unwrap_or(0);
    if radix != 0 && !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    let mut value = 0.0;
    let mut any = false;
    for c in s.chars() {
        match c.to_digit(radix) {
            Some(d) => {
                value = value * f64::from(radix) + f64::from(d);
                any = true;
            }
            None => break,
        }
    }
    if any {
        sign * value
    } else {
        f64::NAN
    }
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    if s[end..].starts_with("Infinity") {
        return if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &s[digits_start..end] == "." {
        return f64::NAN;
    }
    let mantissa_end = end;
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        end = if exp_end > exp_digits { exp_end } else { mantissa_end };
    }
    s[..end].parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_follows_prefix_rules() {
        assert_eq!(parse_int("42", None), 42.0);
        assert_eq!(parse_int("  -17px", None), -17.0);
        assert_eq!(parse_int("0x1f", None), 31.0);
        assert_eq!(parse_int("ff", Some(16)), 255.0);
        assert_eq!(parse_int("101", Some(2)), 5.0);
        assert!(parse_int("abc", None).is_nan());
        assert!(parse_int("1", Some(40)).is_nan());
    }

    #[test]
    fn parse_float_takes_longest_prefix() {
        assert_eq!(parse_float("2.5"), 2.5);
        assert_eq!(parse_float("  3.25abc"), 3.25);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("1e"), 1.0);
        assert_eq!(parse_float("-.5"), -0.5);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float(".").is_nan());
        assert!(parse_float("x1").is_nan());
    }

    #[test]
    fn number_conversion() {
        assert_eq!(to_number(&RemoteValue::Str(" 12 ".into())), 12.0);
        assert_eq!(to_number(&RemoteValue::Bool(true)), 1.0);
        assert_eq!(to_number(&RemoteValue::Null), 0.0);
        assert!(to_number(&RemoteValue::Undefined).is_nan());
    }
}
