//! Compiles every `data/wat/*.wat` fixture to a binary in `OUT_DIR` and
//! generates `fixtures.rs` with one `include_bytes!` constant per file.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;
use std::{env, fs};

fn main() -> Result<()> {
    let out_dir = env::var("OUT_DIR").context("OUT_DIR is not set")?;
    let out_dir = Path::new(&out_dir);
    let data_dir = Path::new("data/wat");
    println!("cargo:rerun-if-changed={}", data_dir.display());

    let mut paths = fs::read_dir(data_dir)
        .with_context(|| format!("failed to list {}", data_dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    let mut fixtures = String::new();
    for path in paths {
        if path.extension().and_then(|ext| ext.to_str()) != Some("wat") {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .with_context(|| format!("fixture name is not UTF-8: {}", path.display()))?;
        let wasm = wat::parse_file(&path)
            .with_context(|| format!("failed to assemble {}", path.display()))?;
        let wasm_path = out_dir.join(format!("{stem}.wasm"));
        fs::write(&wasm_path, wasm)
            .with_context(|| format!("failed to write {}", wasm_path.display()))?;

        writeln!(fixtures, "/// Binary of `data/wat/{stem}.wat`.")?;
        writeln!(
            fixtures,
            "pub const {}: &[u8] = include_bytes!({:?});",
            stem.to_uppercase(),
            wasm_path.display().to_string()
        )?;
        println!("cargo:rerun-if-changed={}", path.display());
    }

    fs::write(out_dir.join("fixtures.rs"), fixtures).context("failed to write fixtures.rs")?;
    Ok(())
}
