//! `jsproxy-embed` — render wire commands as a static embedding script.
//!
//! Usage:
//!   jsproxy-embed [--html] [--debugger] [--div-id ID] [--await NAME]... [--log-level LEVEL]
//!
//! A JSON array of wire commands is read from stdin.

use jsproxy::cli::{parse_args, render_embedding};
use jsproxy::logging::init_tracing;
use std::io::{self, Read, Write};

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = init_tracing(args.log_level.as_deref(), false) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let mut buf = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut buf) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    match render_embedding(buf.trim(), &args.options, args.html) {
        Ok(out) => {
            let mut stdout = io::stdout();
            if let Err(e) = stdout.write_all(out.as_bytes()) {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "embedding failed");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
