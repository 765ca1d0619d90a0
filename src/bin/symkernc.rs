// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the symkern project.

//! symkern command-line driver: inspect index tables, list operators, print
//! symbolic gradients and run the conformance cases.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

use symkern::conformance::{self, ConformanceOptions, ConformanceProfile};
use symkern::ops;
use symkern::tensordot::{cached_index_table, ContractionSpec, IndexTable};
use symkern::{load_options, Options};

#[derive(Parser, Debug)]
#[command(author, version, about = None, long_about = None)]
struct Cli {
    /// Options file (TOML).
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the index table of a contraction.
    Table {
        /// Extents of operand A, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        dims_a: Vec<usize>,
        /// Extents of operand B, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        dims_b: Vec<usize>,
        /// Contracted axes of A.
        #[arg(long, value_delimiter = ',')]
        cont_a: Vec<usize>,
        /// Contracted axes of B, paired with --cont-a.
        #[arg(long, value_delimiter = ',')]
        cont_b: Vec<usize>,
    },
    /// Run the conformance cases and print both result vectors of each.
    Verify {
        /// Which cases to run (contraction|full).
        #[arg(long, default_value = "full")]
        profile: String,
    },
    /// List the operator registry.
    Ops,
    /// Differentiate a built-in operator with respect to its first input.
    Grad {
        /// Operator name, case-insensitive.
        #[arg(long)]
        op: String,
        /// Length of every input.
        #[arg(long, default_value_t = 1)]
        dim: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = match &cli.config {
        Some(path) => match load_options(path) {
            Ok(options) => options,
            Err(err) => {
                eprintln!("error[config]: {err:#}");
                process::exit(1);
            }
        },
        None => Options::default(),
    };

    match cli.command {
        Command::Table {
            dims_a,
            dims_b,
            cont_a,
            cont_b,
        } => print_table(&options, dims_a, dims_b, cont_a, cont_b),
        Command::Verify { profile } => run_verify(&profile),
        Command::Ops => print_ops(),
        Command::Grad { op, dim } => print_grad(&options, &op, dim),
    }
}

fn init_logging(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    let _ = builder.try_init();
}

fn print_table(
    options: &Options,
    dims_a: Vec<usize>,
    dims_b: Vec<usize>,
    cont_a: Vec<usize>,
    cont_b: Vec<usize>,
) {
    let built = ContractionSpec::new(dims_a, dims_b, cont_a, cont_b).and_then(|spec| {
        if options.tensordot.memoize {
            cached_index_table(&spec)
        } else {
            IndexTable::build(&spec).map(Arc::new)
        }
    });
    match built {
        Ok(table) => {
            if let Some(overrun) = table.overrun() {
                println!("note: layout is not addressable, {overrun}");
            } else if !table.spec().is_canonical_layout() {
                println!("note: non-canonical layout, B kept axes are addressed in reverse");
            }
            print!("{table}");
        }
        Err(err) => {
            eprintln!("error[tensordot]: {err}");
            process::exit(1);
        }
    }
}

fn run_verify(profile: &str) {
    let profile = match profile.to_ascii_lowercase().as_str() {
        "contraction" => ConformanceProfile::Contraction,
        "full" => ConformanceProfile::Full,
        other => {
            eprintln!("error[conformance]: unknown profile '{other}' (expected contraction|full)");
            process::exit(1);
        }
    };

    let opts = ConformanceOptions {
        profile,
        ..ConformanceOptions::default()
    };
    for report in conformance::conformance_report(&opts) {
        println!("case {}", report.name);
        println!("  reference: {:?}", report.expected);
        println!("  computed:  {:?}", report.actual);
        println!(
            "  max error: {:e} ({})",
            report.max_error,
            if report.passed() { "ok" } else { "FAILED" }
        );
    }

    match conformance::run_conformance(opts) {
        Ok(_) => println!("conformance passed for profile: {profile:?}"),
        Err(err) => {
            eprintln!("conformance failures detected:");
            for failure in err.0.iter() {
                eprintln!("- {failure}");
            }
            process::exit(1);
        }
    }
}

fn print_ops() {
    for op in ops::formula_ops() {
        println!("{:<10} arity {}  {}", op.name, op.arity, op.summary);
        println!("{:<10} grad     {}", "", op.gradient);
    }
}

#[cfg(feature = "autodiff")]
fn print_grad(options: &Options, name: &str, dim: usize) {
    use symkern::autodiff::differentiate_with_options;
    use symkern::formula::{Formula, Var};

    let Some(sig) = ops::op_signature(name) else {
        eprintln!("error[grad]: unknown operator '{name}'");
        process::exit(1);
    };
    let inputs: Vec<Var> = [Var::i(0, dim), Var::j(1, dim)]
        .into_iter()
        .take(sig.arity)
        .collect();
    let formula = match ops::instantiate(sig.name, inputs.iter().copied().map(Formula::var).collect())
    {
        Ok(formula) => formula,
        Err(err) => {
            eprintln!("error[grad]: {err}");
            process::exit(1);
        }
    };
    let upstream = Formula::var(Var::param(inputs.len(), formula.dim()));
    match differentiate_with_options(&formula, &inputs[0], upstream, &options.autodiff) {
        Ok(grad) => {
            println!("formula:  {formula}");
            println!("gradient: {grad}");
        }
        Err(err) => {
            eprintln!("error[autodiff]: {err}");
            process::exit(1);
        }
    }
}

#[cfg(not(feature = "autodiff"))]
fn print_grad(_options: &Options, _name: &str, _dim: usize) {
    eprintln!("error[grad]: symkernc was built without the `autodiff` feature");
    process::exit(1);
}
