use anyhow::{Context, Result};
use clap::Parser;
use irweave::{load_wasm, walk_function, walk_module, LoadOptions, WalkOptions};
use std::fs;
use std::path::PathBuf;

/// irweave: import a WebAssembly module and walk its IR graph.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input WebAssembly module (.wasm binary or .wat text)
    input: PathBuf,

    /// Output file; stdout when omitted
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Walk only this function
    #[arg(long)]
    function: Option<String>,

    /// Print the control-flow graph of `--function` as DOT instead
    #[arg(long, requires = "function")]
    cfg: bool,

    /// Label CFG nodes with their instructions
    #[arg(long, requires = "cfg")]
    show_inst: bool,

    /// Include attributes in the walk
    #[arg(long)]
    attributes: bool,

    /// Keep external linkage on functions and globals without an export
    #[arg(long)]
    no_internalize: bool,

    /// Tag instructions with the byte offset of their operator
    #[arg(long)]
    debug_offsets: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        let module_name = self
            .input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| LoadOptions::default().module_name);
        LoadOptions {
            module_name,
            source_filename: self.input.display().to_string(),
            internalize: !self.no_internalize,
            debug_offsets: self.debug_offsets,
            ..LoadOptions::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    log::info!("irweave: importing {}", cli.input.display());

    let input =
        fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;
    // Accepts the text format too; binaries pass through unchanged.
    let wasm_bytes = wat::parse_bytes(&input)
        .with_context(|| format!("failed to parse {}", cli.input.display()))?;

    let module = load_wasm(&wasm_bytes, &cli.load_options()).context("import failed")?;

    let walk_options = WalkOptions {
        attributes: cli.attributes,
    };
    let text = match &cli.function {
        Some(name) => {
            let function = module
                .get_function(name)
                .with_context(|| format!("no function named '{name}'"))?;
            if cli.cfg {
                irweave::ir::write_cfg(function, cli.show_inst)
            } else {
                walk_function(function, walk_options)
            }
        }
        None => walk_module(&module, walk_options),
    };

    if let Some(output_path) = &cli.output {
        fs::write(output_path, &text)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        log::info!("irweave: wrote {}", output_path.display());
    } else {
        print!("{text}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_defaults() {
        let cli = Cli::parse_from(["irweave", "input.wasm"]);
        assert_eq!(cli.input, PathBuf::from("input.wasm"));
        assert!(cli.output.is_none());
        assert!(cli.function.is_none());
        assert!(!cli.cfg && !cli.attributes && !cli.verbose);

        let options = cli.load_options();
        assert_eq!(options.module_name, "input");
        assert_eq!(options.source_filename, "input.wasm");
        assert!(options.internalize);
    }

    #[test]
    fn cfg_requires_a_function() {
        assert!(Cli::try_parse_from(["irweave", "input.wasm", "--cfg"]).is_err());
        let cli = Cli::try_parse_from([
            "irweave",
            "input.wasm",
            "--function",
            "main",
            "--cfg",
            "--show-inst",
        ])
        .unwrap();
        assert!(cli.cfg && cli.show_inst);
        assert_eq!(cli.function.as_deref(), Some("main"));
    }
}
