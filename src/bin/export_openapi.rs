//! Write the gateway's OpenAPI document
//!
//! ```text
//! export_openapi                      # stdout
//! export_openapi --output api.json    # file
//! ```

use anyhow::{Context, Result};
use sms_ledger::gateway::openapi::ApiDoc;
use utoipa::OpenApi;

fn output_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--output" || arg == "-o" {
            return args.next();
        }
    }
    None
}

fn main() -> Result<()> {
    let doc = ApiDoc::openapi();
    let json = doc
        .to_pretty_json()
        .context("Failed to serialize OpenAPI document")?;

    let Some(path) = output_path() else {
        println!("{json}");
        return Ok(());
    };
    std::fs::write(&path, &json).with_context(|| format!("Failed to write {path}"))?;
    eprintln!("{} paths written to {path}", doc.paths.paths.len());
    Ok(())
}
