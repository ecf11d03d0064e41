use clap::{Parser, ValueEnum};
use stepforge::prelude::*;
use std::fs;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Define a CLI-specific enum for clap to parse.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendCli {
    Pyvisa,
    Socket,
    TmDevices,
    Tekhsi,
}

impl From<BackendCli> for BackendKind {
    fn from(value: BackendCli) -> Self {
        match value {
            BackendCli::Pyvisa => BackendKind::PyVisa,
            BackendCli::Socket => BackendKind::Socket,
            BackendCli::TmDevices => BackendKind::TmDevices,
            BackendCli::Tekhsi => BackendKind::TekHsi,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LineEndingCli {
    Lf,
    Crlf,
}

/// Compiles instrument procedures (graph XML or step JSON) into Python scripts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the procedure (Graph form XML or Step form JSON)
    input: String,

    /// The calling backend to generate for
    #[arg(short, long, value_enum, default_value = "pyvisa")]
    backend: BackendCli,

    /// Generation options JSON file
    #[arg(long)]
    options: Option<String>,

    /// Command reference (JSON database or binary snapshot) to validate against
    #[arg(short, long)]
    reference: Option<String>,

    /// Write the compiled reference to this path as a binary snapshot
    #[arg(long, requires = "reference")]
    save_snapshot: Option<String>,

    /// Write the output here instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Overrides the options file's line ending
    #[arg(long, value_enum)]
    line_ending: Option<LineEndingCli>,

    /// Overrides the options file's default I/O timeout
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the canonical Step form instead of generating a script
    #[arg(long, conflicts_with = "emit_graph")]
    emit_steps: bool,

    /// Print the Graph form instead of generating a script
    #[arg(long)]
    emit_graph: bool,

    /// Verbose logging (debug level unless RUST_LOG says otherwise)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let total_start = Instant::now();

    // --- 1. Input Loading ---
    let document = Document::from_file(&cli.input).unwrap_or_else(|e| {
        exit_with_error(&format!("Failed to load procedure '{}': {}", cli.input, e))
    });

    if cli.emit_steps || cli.emit_graph {
        let text = if cli.emit_steps {
            document.to_steps_json()
        } else {
            document.to_graph_xml()
        }
        .unwrap_or_else(|e| exit_with_error(&format!("Conversion failed: {}", e)));
        write_output(cli.output.as_deref(), &text);
        return;
    }

    let options = load_options(&cli);

    // --- 2. Reference Loading ---
    let reference = cli.reference.as_ref().map(|path| {
        let index = CommandIndex::load(path).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to load command reference: {}", e))
        });
        if let Some(snapshot) = &cli.save_snapshot {
            index.save_snapshot(snapshot).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to write snapshot: {}", e))
            });
            eprintln!("Reference snapshot written to {}", snapshot);
        }
        index
    });

    // --- 3. Compilation ---
    let compile_start = Instant::now();
    let backend = BackendKind::from(cli.backend);
    let mut builder = Compiler::builder(document)
        .backend(backend)
        .with_options(options);
    if let Some(index) = reference {
        builder = builder.with_reference(index);
    }
    let script = builder
        .build()
        .compile()
        .unwrap_or_else(|e| exit_with_error(&format!("Compilation failed: {}", e)));
    let compile_duration = compile_start.elapsed();

    // --- 4. Results ---
    write_output(cli.output.as_deref(), &script.source);

    for diagnostic in &script.diagnostics {
        eprintln!("{}", diagnostic);
    }
    let errors = script
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    eprintln!(
        "\nCompiled for {} in {:?} ({} error(s), {} warning(s), total {:?})",
        backend,
        compile_duration,
        errors,
        script.diagnostics.len() - errors,
        total_start.elapsed()
    );
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Options file first, then individual flags on top.
fn load_options(cli: &Cli) -> GenerationOptions {
    let mut options = match &cli.options {
        Some(path) => {
            let json = fs::read_to_string(path).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to read options file '{}': {}", path, e))
            });
            GenerationOptions::from_json(&json).unwrap_or_else(|e| exit_with_error(&e.to_string()))
        }
        None => GenerationOptions::default(),
    };
    if let Some(line_ending) = cli.line_ending {
        options = options.with_line_ending(match line_ending {
            LineEndingCli::Lf => LineEnding::Lf,
            LineEndingCli::Crlf => LineEnding::Crlf,
        });
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        options = options.with_default_timeout_ms(timeout_ms);
    }
    options
}

fn write_output(path: Option<&str>, text: &str) {
    match path {
        Some(path) => fs::write(path, text).unwrap_or_else(|e| {
            exit_with_error(&format!("Failed to write output file '{}': {}", path, e))
        }),
        None => print!("{}", text),
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
