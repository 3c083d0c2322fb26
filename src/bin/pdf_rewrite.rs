//! Rewrite a PDF
//!
//! Loads a PDF (recovering damaged cross-reference data if needed) and
//! writes it back out with a fresh cross-reference section.
//!
//! Usage:
//!   cargo run --release --bin pdf_rewrite -- input.pdf output.pdf
//!   cargo run --release --bin pdf_rewrite -- input.pdf output.pdf --classic --objects-per-tick 200
//!   RUST_LOG=debug cargo run --bin pdf_rewrite -- damaged.pdf fixed.pdf --strict

use pdf_graph::document::{LoadOptions, PdfDocument, SaveOptions};
use pdf_graph::parser_config::ParseOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

struct RewriteConfig {
    input: PathBuf,
    output: PathBuf,
    load: LoadOptions,
    save: SaveOptions,
}

impl RewriteConfig {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().collect();
        let mut paths = Vec::new();
        let mut parse = ParseOptions::lenient();
        let mut save = SaveOptions {
            add_default_page: false,
            ..SaveOptions::default()
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--classic" => save.use_object_streams = false,
                "--object-streams" => save.use_object_streams = true,
                "--compress" => save.compress_streams = true,
                "--strict" => parse = parse.with_strict(true),
                "--ignore-encryption" => parse = parse.with_ignore_encryption(true),
                "--objects-per-tick" => {
                    i += 1;
                    save.objects_per_tick = args
                        .get(i)
                        .and_then(|n| n.parse().ok())
                        .ok_or("--objects-per-tick needs a number")?;
                },
                flag if flag.starts_with("--") => return Err(format!("unknown flag {}", flag)),
                path => paths.push(PathBuf::from(path)),
            }
            i += 1;
        }

        match <[PathBuf; 2]>::try_from(paths) {
            Ok([input, output]) => Ok(Self {
                input,
                output,
                load: LoadOptions {
                    parse,
                    update_metadata: false,
                },
                save,
            }),
            Err(_) => Err("expected an input and an output path".to_string()),
        }
    }
}

fn run(config: &RewriteConfig) -> pdf_graph::Result<()> {
    let start = Instant::now();
    let mut doc = PdfDocument::open(&config.input, config.load)?;
    for diagnostic in doc.diagnostics() {
        log::warn!("offset {}: {}", diagnostic.offset, diagnostic.message);
    }
    println!(
        "Loaded {} ({} objects, {} pages, {} skipped)",
        config.input.display(),
        doc.context().object_count(),
        doc.page_count()?,
        doc.diagnostics().len()
    );

    doc.save_to_file(&config.output, config.save)?;
    println!(
        "Wrote {} ({}) in {:.2?}",
        config.output.display(),
        if config.save.use_object_streams {
            "object streams"
        } else {
            "classic"
        },
        start.elapsed()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let config = match RewriteConfig::from_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!(
                "Usage: pdf_rewrite <input> <output> [--classic | --object-streams] [--objects-per-tick N] [--compress] [--strict] [--ignore-encryption]"
            );
            return ExitCode::from(2);
        },
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
