//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

use crate::config::Overrides;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a Central and several Peripherals exchanging questions
    Demo {
        /// Number of simulated peripherals
        #[arg(short, long)]
        peripherals: Option<usize>,
        /// Number of questions to ask
        #[arg(short, long)]
        questions: Option<usize>,
        /// Probability that a single write fails
        #[arg(long)]
        failure_rate: Option<f64>,
        /// Seed for the simulated failures and target selection
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Ask one question of one peripheral and print the answer
    Ask {
        /// The question to ask
        question: String,
        /// Number of simulated peripherals
        #[arg(short, long)]
        peripherals: Option<usize>,
        /// Which peripheral to ask, counting from 1
        #[arg(short, long, default_value_t = 1)]
        target: usize,
    },
    /// List the Magic 8-Ball answers
    Answers,
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

impl Commands {
    /// Configuration values given on the command line
    pub fn overrides(&self) -> Overrides {
        match self {
            Commands::Demo {
                peripherals,
                questions,
                failure_rate,
                seed,
            } => Overrides {
                peripherals: *peripherals,
                questions: *questions,
                failure_rate: *failure_rate,
                seed: *seed,
            },
            Commands::Ask { peripherals, .. } => Overrides {
                peripherals: *peripherals,
                ..Overrides::default()
            },
            Commands::Answers | Commands::Config { .. } => Overrides::default(),
        }
    }
}
