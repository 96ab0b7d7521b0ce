//! services/api/src/bin/openapi.rs
//!
//! Dumps the Marginalia OpenAPI document. With no argument it writes
//! `openapi.json`; `-` prints to stdout; any other argument is the output path.

use marginalia_api::web::rest::ApiDoc;
use std::io::Write;
use std::path::Path;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let api = ApiDoc::openapi();
    let document = api.to_pretty_json()?;
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

    if target == "-" {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(document.as_bytes())?;
        stdout.write_all(b"\n")?;
        return Ok(());
    }

    let path = Path::new(&target);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, document)?;
    eprintln!("Wrote {} paths to {}", api.paths.paths.len(), path.display());
    Ok(())
}
