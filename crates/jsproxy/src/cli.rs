//! Helpers behind the `jsproxy-embed` binary.

use crate::embed::{embedded_html, embedded_javascript, EmbedOptions, DIV_ID_PREFIX};
use crate::error::ProxyError;
use jsproxy_command::validate_commands;
use serde_json::Value;

/// Validates a JSON array of wire commands and renders it for embedding.
pub fn render_embedding(
    input: &str,
    options: &EmbedOptions,
    html: bool,
) -> Result<String, ProxyError> {
    let raw: Value = serde_json::from_str(input)?;
    let commands = validate_commands(&raw)?;
    let div_id = options
        .div_id
        .clone()
        .unwrap_or_else(|| format!("{}1", DIV_ID_PREFIX));
    Ok(if html {
        embedded_html(&commands, &div_id, options)
    } else {
        embedded_javascript(&commands, &div_id, options)
    })
}

/// Parsed command line of `jsproxy-embed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedArgs {
    pub html: bool,
    pub options: EmbedOptions,
    pub log_level: Option<String>,
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<EmbedArgs, String> {
    let mut parsed = EmbedArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--html" => parsed.html = true,
            "--debugger" => parsed.options.debugger = true,
            "--div-id" => {
                parsed.options.div_id = Some(args.next().ok_or("--div-id requires a value")?);
            }
            "--await" => {
                let name = args.next().ok_or("--await requires a value")?;
                parsed.options.await_names.push(name);
            }
            "--log-level" => {
                parsed.log_level = Some(args.next().ok_or("--log-level requires a value")?);
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    Ok(parsed)
}
