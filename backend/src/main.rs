//! Reportkit CLI - generate grouped reports from CSV data
//!
//! # Main Commands
//!
//! ```bash
//! reportkit generate -d report.json --data sales.csv   # Render instructions as JSON
//! reportkit form -d report.json                         # Describe the options form
//! reportkit serve                                       # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! reportkit parse input.csv           # Parse CSV into headers and rows
//! reportkit example-definition        # Show an example report definition
//! ```
//!
//! Configuration is read from the environment (and a `.env` file):
//! `REPORTKIT_PORT` sets the default server port, `REPORTKIT_QUIET=1`
//! silences pipeline logs on stdout.

use clap::{Parser, Subcommand};
use reportkit::{
    build_form, example_definition, parse_file_auto, render_document, MemoryStore,
    ReportDefinition, RequestParams,
};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 3000;

#[derive(Parser)]
#[command(name = "reportkit")]
#[command(about = "Generate grouped reports with pivoted lookups and totals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a report and output its render instructions
    Generate {
        /// Report definition JSON file
        #[arg(short, long)]
        definition: PathBuf,

        /// CSV file of the definition's base table
        #[arg(long)]
        data: PathBuf,

        /// Lookup table as MODEL=FILE (repeatable)
        #[arg(short, long, value_parser = parse_key_val)]
        lookup: Vec<(String, String)>,

        /// Request parameter as KEY=VALUE (repeatable)
        #[arg(short, long, value_parser = parse_key_val)]
        param: Vec<(String, String)>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Describe the options form of a report definition
    Form {
        /// Report definition JSON file
        #[arg(short, long)]
        definition: PathBuf,

        /// Lookup table as MODEL=FILE (repeatable)
        #[arg(short, long, value_parser = parse_key_val)]
        lookup: Vec<(String, String)>,
    },

    /// Parse a CSV file and output its headers and rows
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show an example report definition
    ExampleDefinition,

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: $REPORTKIT_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            definition,
            data,
            lookup,
            param,
            output,
        } => cmd_generate(&definition, &data, &lookup, param, output.as_deref()),

        Commands::Form { definition, lookup } => cmd_form(&definition, &lookup),

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::ExampleDefinition => cmd_example_definition(),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn load_definition(path: &Path) -> Result<ReportDefinition, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    Ok(ReportDefinition::from_json(&content)?)
}

fn load_lookups(
    store: &mut MemoryStore,
    lookups: &[(String, String)],
) -> Result<(), Box<dyn std::error::Error>> {
    for (model, file) in lookups {
        let rows = store.load_csv_file(model, file)?;
        eprintln!("   Lookup '{}': {} rows", model, rows);
    }
    Ok(())
}

fn cmd_generate(
    definition_path: &Path,
    data: &Path,
    lookups: &[(String, String)],
    params: Vec<(String, String)>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let definition = load_definition(definition_path)?;
    eprintln!("📄 Report: {} ({})", definition.title, definition_path.display());

    let mut store = MemoryStore::new();
    let rows = store.load_csv_file(&definition.model, data)?;
    eprintln!("   Table '{}': {} rows", definition.model, rows);
    load_lookups(&mut store, lookups)?;

    let params = RequestParams::from_pairs(params);
    let (document, outcome) = render_document(&definition, &params, &store)?;

    eprintln!("\n📊 {} instructions, {} pages", outcome.instructions, document.page_count());
    for total in &outcome.grand_totals {
        eprintln!("   {}: {}", total.header, reportkit::report::format_total(total.value));
    }

    write_output(&document.to_json()?, output)?;
    Ok(())
}

fn cmd_form(
    definition_path: &Path,
    lookups: &[(String, String)],
) -> Result<(), Box<dyn std::error::Error>> {
    let definition = load_definition(definition_path)?;
    let mut store = MemoryStore::new();
    load_lookups(&mut store, lookups)?;

    let form = build_form(&definition, &store)?;
    println!("{}", form.to_json()?);
    Ok(())
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let table = parse_file_auto(input)?;
    eprintln!("   Encoding: {}", table.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(table.delimiter));
    eprintln!("   Columns: {}", table.headers.join(", "));
    eprintln!("✅ Parsed {} rows", table.rows.len());

    let json = serde_json::to_string_pretty(&table)?;
    write_output(&json, output)?;
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_example_definition() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", example_definition().to_json()?);
    Ok(())
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let port = match port {
        Some(p) => p,
        None => match std::env::var("REPORTKIT_PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| format!("invalid REPORTKIT_PORT '{}'", v))?,
            Err(_) => DEFAULT_PORT,
        },
    };
    reportkit::server::start_server(port).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
