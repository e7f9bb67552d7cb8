//! `rv32imc`: command-line driver. Reads a textual-IR (`.rir`) source file,
//! runs it through the full compilation pipeline, and writes RV32IM
//! assembly to stdout or a file.

use anyhow::Context as _;
use clap::{App, Arg};
use rv32im_backend::config::Flags;
use rv32im_backend::diag::CodegenError;
use rv32im_backend::ir::text::read_program;
use rv32im_backend::pipeline::Context;
use std::fs;
use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Everything that is a usage error (bad path, malformed source, bad flag
/// value, failed write) is reported through `anyhow` and always exits 1; a
/// `CodegenError` reaching the end of the pipeline gets its own exit code
/// via `report_failure`, matched before it would otherwise bubble here.
fn try_main() -> anyhow::Result<ExitCode> {
    let matches = App::new("rv32imc")
        .version(rv32im_backend::VERSION)
        .about("RV32IM teaching-toolchain back end: textual IR in, assembly out")
        .arg(Arg::with_name("input").required(true).help("Input .rir source file"))
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("Write assembly to this file instead of stdout"),
        )
        .arg(
            Arg::with_name("no-verify")
                .long("no-verify")
                .help("Skip the post-allocation/post-lowering consistency checks"),
        )
        .arg(
            Arg::with_name("spill-pool-size")
                .long("spill-pool-size")
                .takes_value(true)
                .help("Number of scratch registers reserved for spill materialization (default 3)"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("Increase log verbosity (repeatable)"),
        )
        .get_matches();

    let verbosity = matches.occurrences_of("verbose");
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let input_path = matches.value_of("input").unwrap();
    let source = fs::read_to_string(input_path)
        .with_context(|| format!("could not read `{}`", input_path))?;

    let mut program = read_program(&source).with_context(|| format!("could not parse `{}`", input_path))?;

    let mut flags = Flags::builder();
    flags = flags.enable_verifier(!matches.is_present("no-verify"));
    if let Some(size) = matches.value_of("spill-pool-size") {
        let n: usize = size
            .parse()
            .with_context(|| format!("--spill-pool-size expects a non-negative integer, got `{}`", size))?;
        anyhow::ensure!(
            n >= 3,
            "--spill-pool-size must be at least 3 (the minimum the allocator's spill path needs), got {}",
            n
        );
        flags = flags.spill_pool_size(n);
    }

    let mut ctx = Context::new(flags.finish());
    let assembly = match ctx.compile(&mut program) {
        Ok(asm) => asm,
        Err(err) => return Ok(report_failure(&err)),
    };

    match matches.value_of("output") {
        Some(path) => fs::write(path, assembly).with_context(|| format!("could not write `{}`", path))?,
        None => std::io::stdout().write_all(assembly.as_bytes()).context("could not write to stdout")?,
    }

    Ok(ExitCode::from(0))
}

fn report_failure(err: &CodegenError) -> ExitCode {
    eprintln!("error: {}", err);
    match err {
        CodegenError::UserErrors { .. } => ExitCode::from(2),
        CodegenError::TranslationFailure(_) | CodegenError::Internal(_) => ExitCode::from(70),
    }
}
