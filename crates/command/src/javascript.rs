//! JavaScript generation.
//!
//! Renders a command tree as a JavaScript expression with the same effect as
//! remote interpretation. Used for static embedding, where no live channel
//! exists and the commands have to run as plain script.
//!
//! Property access always uses `target[key]` notation since keys need not
//! be identifiers. Long chains are broken across lines.

use crate::types::{AssetKind, Command};
use serde_json::Value;

const TAB: &str = "    ";

fn set_js(target: &str, attribute: &str, value: &str) -> String {
    format!(
        "(function () {{
    var target = {target};
    var attribute = {attribute};
    var value = {value};
    target[attribute] = value;
    return target;
}})()"
    )
}

fn bytes_js(digits: &str) -> String {
    format!(
        "(function (h) {{
    var b = new Uint8Array(h.length / 2);
    for (var i = 0; i < b.length; i++) {{
        b[i] = parseInt(h.substr(2 * i, 2), 16);
    }}
    return b;
}})({digits})"
    )
}

/// Indents every continuation line of `s` by `level` tabs.
pub fn indent_string(s: &str, level: usize) -> String {
    if level == 0 {
        return s.to_string();
    }
    let indent = TAB.repeat(level);
    s.replace('\n', &format!("\n{}", indent))
}

fn json_text(v: &Value) -> String {
    // Serializing a `Value` cannot fail.
    serde_json::to_string(v).unwrap_or_default()
}

fn string_literal(s: &str) -> String {
    json_text(&Value::String(s.to_string()))
}

fn format_args(args: &[Command]) -> String {
    let inner: Vec<String> = args.iter().map(|a| to_javascript(a, 1)).collect();
    format!("({})", inner.join(",\n"))
}

/// Renders `command` as JavaScript text, indented by `level` tabs.
pub fn to_javascript(command: &Command, level: usize) -> String {
    let js = match command {
        Command::Root(name) => name.as_str().to_string(),
        Command::Get { target, key } => {
            format!("{}\n[{}]", to_javascript(target, 0), to_javascript(key, 0))
        }
        Command::Call {
            target,
            method,
            args,
        } => format!(
            "{}\n[{}]\n{}",
            to_javascript(target, 0),
            string_literal(method),
            format_args(args)
        ),
        Command::Apply { callee, args } => {
            format!("{}\n{}", to_javascript(callee, 0), format_args(args))
        }
        Command::Set { target, key, value } => set_js(
            &to_javascript(target, 1),
            &to_javascript(key, 1),
            &to_javascript(value, 1),
        ),
        Command::New { ctor, args } => {
            let items: Vec<String> = args.iter().map(|a| to_javascript(a, 1)).collect();
            format!(
                "element.New({}, [{}])",
                to_javascript(ctor, 0),
                items.join(", ")
            )
        }
        Command::Literal(v) => json_text(v),
        Command::List(items) => {
            let items: Vec<String> = items.iter().map(|a| to_javascript(a, 0)).collect();
            format!("[{}]", items.join(","))
        }
        Command::Dict(entries) => {
            let items: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", string_literal(k), to_javascript(v, 0)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Command::Bytes(digits) => bytes_js(&string_literal(digits)),
        Command::Callback { id, .. } => {
            // Host callbacks have no meaning without a live channel.
            let message = format!("Warning: External callable {}", id);
            format!("function() {{alert({});}}", string_literal(&message))
        }
        Command::Discard(target) => format!("({}, null)", to_javascript(target, 0)),
        Command::LoadAsset { kind, name, text } => {
            let kind = match kind {
                AssetKind::Css => "css",
                AssetKind::Js => "js",
            };
            format!(
                "element.Load({}, {}, {})",
                string_literal(kind),
                string_literal(name),
                string_literal(text)
            )
        }
    };
    indent_string(&js, level)
}
