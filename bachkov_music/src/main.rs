// Bachkov CLI entry point.
//
// Two subcommands mirror the two pipeline stages:
//
//   bachkov make-model <model.json> <state-size> [key-mode]
//   bachkov make-music <model.json> [--seed N] [--out DIR]
//
// `make-model` trains a chain on the configured corpus and writes it;
// `make-music` walks a saved chain and renders the result. Run settings
// come from the config file (see config.rs); flags here override it.
// Log verbosity follows RUST_LOG and defaults to info.

use bachkov_music::config::Config;
use bachkov_music::error::Result;
use bachkov_music::pipeline::{ModelOptions, MusicOptions, make_model, make_music};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bachkov")]
#[command(about = "Four-voice chorales from a joint-state Markov chain")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./bachkov.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Corpus directory, overriding the config
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on the corpus and write it as JSON
    #[command(alias = "make_model")]
    MakeModel {
        /// Where to write the model
        output: PathBuf,

        /// Number of preceding joint states the chain conditions on
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        state_size: u32,

        /// Only train on pieces in this key mode (e.g. major, minor)
        key_mode: Option<String>,

        /// Only train on pieces in this time signature
        #[arg(long)]
        time_signature: Option<String>,
    },

    /// Generate a chorale from a saved model and render it
    #[command(alias = "make_music")]
    MakeMusic {
        /// Model written by make-model
        model: PathBuf,

        /// Seed for the walk; random if omitted
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory, overriding the config
        #[arg(long)]
        out: Option<PathBuf>,

        /// Program that opens the rendered score
        #[arg(long)]
        viewer: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` when set and valid, otherwise `info`.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::discover(cli.config.as_deref())?;
    if let Some(corpus) = cli.corpus {
        config.corpus_dir = corpus;
    }

    match cli.command {
        Commands::MakeModel {
            output,
            state_size,
            key_mode,
            time_signature,
        } => {
            if let Some(ts) = time_signature {
                config.time_signature = ts;
            }
            println!("=== Training ===");
            println!("Corpus: {}", config.corpus_dir.display());
            println!("Time signature: {}", config.time_signature);
            if let Some(mode) = &key_mode {
                println!("Key mode: {mode}");
            }
            println!("State size: {state_size}");

            let report = make_model(
                &config,
                &ModelOptions {
                    output: output.clone(),
                    state_size: state_size as usize,
                    mode: key_mode,
                },
            )?;

            println!(
                "Trained on {} of {} selected pieces ({} joint states, {} contexts).",
                report.pieces_trained, report.pieces_selected, report.states, report.contexts
            );
            for skipped in &report.skipped {
                println!("  Skipped {}: {}", skipped.id, skipped.reason);
            }
            println!("Model written to {}", output.display());
        }
        Commands::MakeMusic {
            model,
            seed,
            out,
            viewer,
        } => {
            if let Some(out) = out {
                config.output_dir = out;
            }
            if viewer.is_some() {
                config.viewer = viewer;
            }
            println!("=== Generating ===");
            println!("Model: {}", model.display());

            let music = make_music(
                &config,
                &MusicOptions {
                    model,
                    seed,
                    stem: None,
                },
            )?;

            println!("Seed: {}", music.seed);
            println!(
                "{} joint states, {} events, {} quarter lengths.",
                music.states,
                music.score.event_count(),
                music.score.total()
            );
            for path in &music.files {
                println!("  Wrote {}", path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn state_size_must_be_positive() {
        assert!(Cli::try_parse_from(["bachkov", "make-model", "m.json", "0"]).is_err());
        assert!(Cli::try_parse_from(["bachkov", "make-model", "m.json", "two"]).is_err());
        assert!(Cli::try_parse_from(["bachkov", "make_model", "m.json", "2", "major"]).is_ok());
    }

    #[test]
    fn default_log_filter_is_info() {
        // Holds whenever RUST_LOG is unset in the test environment.
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(log_filter().to_string(), "info");
        }
    }
}
