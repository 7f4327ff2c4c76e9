//! Chronicle CLI: load batch documents into a store and inspect the result.
//!
//! Usage:
//!   chronicle load <files>... [--reject-cycles] [--defer-patterns] [--db path]
//!   chronicle export [--out path] [--db path]
//!   chronicle show <reference> [--db path]
//!   chronicle stats [--db path]

use chronicle::{
    BatchDocument, CyclePolicy, Engine, EngineConfig, JsonLinesExporter, OpenStore, PatternPolicy, PublicId,
    ReadHorizon, SqliteStore,
};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "chronicle",
    version,
    about = "Authoring sessions for versioned terminology graphs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Commit batch documents (JSON or YAML) inside one load phase
    Load {
        /// Documents to load, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Fail commits whose is-a axioms close a cycle
        #[arg(long)]
        reject_cycles: bool,
        /// Accept semantics whose pattern is not defined yet
        #[arg(long)]
        defer_patterns: bool,
    },
    /// Write the committed graph as JSON lines
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show one entity by UUID or name
    Show {
        /// UUID, or a name hashed into one
        reference: String,
    },
    /// Print counts for the store
    Stats,
}

/// Get the default database path (~/.local/share/chronicle/chronicle.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let chronicle_dir = data_dir.join("chronicle");
    std::fs::create_dir_all(&chronicle_dir).ok();
    chronicle_dir.join("chronicle.db")
}

fn open_engine(db: Option<PathBuf>, config: EngineConfig) -> Result<Engine, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Engine::open(Arc::new(store), config).map_err(|e| format!("Failed to restore engine: {}", e))
}

fn parse_reference(text: &str) -> PublicId {
    match uuid::Uuid::parse_str(text) {
        Ok(uuid) => PublicId::new(uuid),
        Err(_) => PublicId::from_name(text),
    }
}

fn print_json(value: &impl serde::Serialize) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_load(engine: &Engine, files: &[PathBuf]) -> i32 {
    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        match BatchDocument::from_path(path) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                eprintln!("Error: cannot read '{}': {}", path.display(), e);
                return 1;
            }
        }
    }
    // Nested phases: every document shares one index catch-up at the end
    if let Err(e) = engine.begin_load_phase() {
        eprintln!("Error: {}", e);
        return 1;
    }
    let mut code = 0;
    for (path, doc) in files.iter().zip(documents) {
        match doc.apply(engine) {
            Ok(report) => println!(
                "Loaded '{}': {} sessions, {} versions, {} new handles",
                path.display(),
                report.sessions,
                report.versions,
                report.allocated
            ),
            Err(e) => {
                eprintln!("Error: '{}': {}", path.display(), e);
                code = 2;
                break;
            }
        }
    }
    if let Err(e) = engine.end_load_phase() {
        eprintln!("Error: {}", e);
        return 1;
    }
    code
}

fn cmd_export(engine: &Engine, out: Option<&Path>) -> i32 {
    let result = match out {
        Some(path) => match File::create(path) {
            Ok(file) => {
                let mut exporter = JsonLinesExporter::new(BufWriter::new(file));
                engine.export(&mut exporter)
            }
            Err(e) => {
                eprintln!("Error: cannot create '{}': {}", path.display(), e);
                return 1;
            }
        },
        None => {
            let mut exporter = JsonLinesExporter::new(std::io::stdout().lock());
            engine.export(&mut exporter)
        }
    };
    match result {
        Ok(summary) => {
            if out.is_some() {
                println!(
                    "Exported {} identities and {} versions (through commit {})",
                    summary.identities, summary.versions, summary.last_commit
                );
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_show(engine: &Engine, reference: &str) -> i32 {
    let handle = match engine.lookup(&parse_reference(reference)) {
        Ok(Some(handle)) => handle,
        Ok(None) => {
            eprintln!("Error: '{}' not found", reference);
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let latest = engine.latest(handle, &ReadHorizon::latest());
    let report = serde_json::json!({
        "handle": handle,
        "uuids": engine.public_id(handle).map(|id| id.uuids().to_vec()).unwrap_or_default(),
        "state": engine.handle_state(handle),
        "versions": engine.chronicle(handle).len(),
        "latest": latest,
        "children": engine.children(handle),
        "descriptions": engine
            .descriptions(handle)
            .iter()
            .filter_map(|d| d.as_description().map(|d| d.text.clone()))
            .collect::<Vec<_>>(),
        "semantics": engine.semantics_for(handle),
    });
    print_json(&report)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.command {
        Commands::Load {
            reject_cycles,
            defer_patterns,
            ..
        } => EngineConfig::default()
            .with_cycle_policy(if *reject_cycles { CyclePolicy::Reject } else { CyclePolicy::Allow })
            .with_pattern_policy(if *defer_patterns { PatternPolicy::Deferred } else { PatternPolicy::Eager }),
        _ => EngineConfig::default(),
    };
    let engine = match open_engine(cli.db, config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let code = match cli.command {
        Commands::Load { files, .. } => cmd_load(&engine, &files),
        Commands::Export { out } => cmd_export(&engine, out.as_deref()),
        Commands::Show { reference } => cmd_show(&engine, &reference),
        Commands::Stats => print_json(&engine.stats()),
    };
    if let Err(e) = std::io::stdout().flush() {
        eprintln!("Error: {}", e);
    }
    std::process::exit(code);
}
