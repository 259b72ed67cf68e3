//! varmux CLI
//!
//! Entry point for the `varmux` command-line tool. Thin layer over the
//! engine: it loads the multiplex files, applies injections and filters,
//! and prints the resulting variants. Load errors go to stderr and exit
//! nonzero.

use clap::{Args, Parser, Subcommand};
use std::process;

use varmux::{apply_filters, inject_value, load_documents, Varianter, VariantSpec};

#[derive(Parser)]
#[command(name = "varmux")]
#[command(about = "Parameter-multiplexing engine for test runs", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every variant the loaded tree multiplexes into
    Variants {
        #[command(flatten)]
        mux: MuxArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print only the variant count
    Count {
        #[command(flatten)]
        mux: MuxArgs,
    },
}

#[derive(Args)]
struct MuxArgs {
    /// One or more multiplex yaml files, order dependent
    #[arg(short = 'm', long = "mux-yaml", required = true, num_args = 1..)]
    files: Vec<String>,

    /// Filter only path(s) from multiplexing
    #[arg(long = "filter-only", num_args = 0..)]
    only: Vec<String>,

    /// Filter out path(s) from multiplexing
    #[arg(long = "filter-out", num_args = 0..)]
    out: Vec<String>,

    /// Inject [path:]key:value into the final multiplex tree
    #[arg(long = "inject", num_args = 0..)]
    inject: Vec<String>,

    /// Paths used to determine priority when querying for parameters
    #[arg(long = "mux-path", num_args = 0..)]
    mux_path: Vec<String>,

    /// Keep source-locator provenance on every value
    #[arg(long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Variants { mux, json } => {
            let varianter = build_varianter(&mux);
            if json {
                let specs: Vec<VariantSpec> = varianter.iter().collect();
                match serde_json::to_string_pretty(&specs) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        eprintln!("Error serializing output: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                for spec in varianter.iter() {
                    let paths: Vec<&str> =
                        spec.leaves.iter().map(|l| l.path.as_str()).collect();
                    println!("Variant {}:    {}", spec.variant_id, paths.join(", "));
                }
            }
        }
        Commands::Count { mux } => {
            let varianter = build_varianter(&mux);
            println!("{}", varianter.len());
        }
    }
}

fn build_varianter(args: &MuxArgs) -> Varianter {
    let mut tree = match load_documents(&args.files, args.debug) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    for spec in &args.inject {
        if let Err(e) = inject_value(&mut tree, spec) {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }

    apply_filters(&mut tree, &args.only, &args.out);

    let mux_path = if args.mux_path.is_empty() {
        None
    } else {
        Some(args.mux_path.clone())
    };
    Varianter::new(tree, mux_path)
}
