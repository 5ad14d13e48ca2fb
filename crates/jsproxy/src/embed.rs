//! Static embedding of buffered commands as standalone JavaScript or HTML.
//!
//! The generated script waits until every name in the await list resolves
//! to a defined global (checking every 500 ms), then runs the commands with
//! `element` bound to the target `<div>`.

use crate::session::Session;
use crate::transport::Transport;
use jsproxy_command::{indent_string, to_javascript, Command};
use serde_json::Value;

fn javascript_text(debugger: &str, div_id_literal: &str, names: &str, actions: &str) -> String {
    format!(
        "(function () {{
    {debugger}
    var do_actions = function () {{
        var element = document.getElementById({div_id_literal});
        element.New = function (klass, args) {{
            var obj = Object.create(klass.prototype);
            return klass.apply(obj, args) || obj;
        }};
        element.Load = function (kind, name, text) {{
            var node = document.createElement(kind == \"css\" ? \"style\" : \"script\");
            node.setAttribute(\"data-name\", name);
            node.textContent = text;
            document.head.appendChild(node);
            return null;
        }};
        {actions};
    }};
    var wait_for_libraries = function () {{
        var names = {names};
        for (var i = 0; i < names.length; i++) {{
            var library = undefined;
            try {{
                library = eval(names[i]);
            }} catch (e) {{
                // not loaded yet
            }}
            if ((typeof library) == \"undefined\") {{
                return window.setTimeout(wait_for_libraries, 500);
            }}
        }}
        return do_actions();
    }};
    wait_for_libraries();
}})();
"
    )
}

fn html_text(div_id: &str, script: &str) -> String {
    format!(
        "<div id=\"{div_id}\"></div>
<script>
{script}</script>
"
    )
}

/// Prefix of generated div ids.
pub const DIV_ID_PREFIX: &str = "jsproxy_widget";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedOptions {
    /// Start the script with a `debugger;` statement.
    pub debugger: bool,
    /// Global names that must be defined before the commands run.
    pub await_names: Vec<String>,
    /// Target div id; generated when absent.
    pub div_id: Option<String>,
}

fn string_literal(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Renders `commands` as a self-contained script targeting `div_id`.
pub fn embedded_javascript(commands: &[Command], div_id: &str, options: &EmbedOptions) -> String {
    let debugger = if options.debugger {
        "// Debug mode for static display\n    debugger;"
    } else {
        "// Static display with no debugging."
    };
    let actions: Vec<String> = commands.iter().map(|c| to_javascript(c, 0)).collect();
    let actions = indent_string(&actions.join(";\n"), 2);
    let names = Value::from(options.await_names.clone()).to_string();
    javascript_text(debugger, &string_literal(div_id), &names, &actions)
}

/// [`embedded_javascript`] wrapped in an HTML fragment with its target div.
pub fn embedded_html(commands: &[Command], div_id: &str, options: &EmbedOptions) -> String {
    let script = embedded_javascript(commands, div_id, options);
    html_text(&html_attribute(div_id), &script)
}

fn html_attribute(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl<T: Transport> Session<T> {
    fn embed_div_id(&mut self, options: &EmbedOptions) -> String {
        match &options.div_id {
            Some(id) => id.clone(),
            None => format!("{}{}", DIV_ID_PREFIX, self.unique_id()),
        }
    }

    /// Renders the buffered commands as a standalone script.
    pub fn embedded_javascript(&mut self, options: &EmbedOptions) -> String {
        let div_id = self.embed_div_id(options);
        embedded_javascript(self.buffered_commands(), &div_id, options)
    }

    /// Renders the buffered commands as an HTML fragment.
    pub fn embedded_html(&mut self, options: &EmbedOptions) -> String {
        let div_id = self.embed_div_id(options);
        embedded_html(self.buffered_commands(), &div_id, options)
    }
}
