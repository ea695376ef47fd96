//! Binary that emits command-line options markdown to stdout.
//!
//! Used by the docs build to refresh `docs/reference/command-line-options.md`.

fn main() {
    print!("{}", tabsql_cli::render_options_markdown());
}
