//! Command handlers for the 8-Ball CLI

use std::path::Path;

use tracing::info;

use eightball_core::answers;

use crate::app::{EightBallApp, Outcome};
use crate::cli::Commands;
use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// Questions the demo cycles through
const DEMO_QUESTIONS: [&str; 6] = [
    "Will it rain tomorrow?",
    "Should I learn Rust?",
    "Is the build going to pass?",
    "Will the coffee machine be fixed?",
    "Am I going to win the raffle?",
    "Is it a good day to ship?",
];

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(
        command: Commands,
        config: AppConfig,
        config_path: Option<&Path>,
    ) -> Result<()> {
        match command {
            Commands::Demo { .. } => Self::handle_demo_command(config).await,
            Commands::Ask {
                question, target, ..
            } => Self::handle_ask_command(config, question, target).await,
            Commands::Answers => Self::handle_answers_command(),
            Commands::Config { save } => Self::handle_config_command(&config, config_path, save),
        }
    }

    /// Ask a series of questions of randomly chosen peripherals
    async fn handle_demo_command(config: AppConfig) -> Result<()> {
        let questions = config.demo.questions;
        let mut rng = match config.sim.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        info!(
            "Starting demo with {} peripherals and {} questions",
            config.demo.peripherals, questions
        );
        let mut app = EightBallApp::start(config).await?;
        println!("Peripherals ready:");
        for ball in app.balls() {
            println!("  {} ({})", ball.name, ball.id);
        }
        println!();

        let (mut answered, mut failed) = (0, 0);
        for round in 0..questions {
            let question = DEMO_QUESTIONS[round % DEMO_QUESTIONS.len()];
            let index = rng.usize(..app.balls().len());
            let name = app.balls()[index].name.clone();

            match app.ask(index, question).await? {
                Outcome::Answered { device, answer } => {
                    answered += 1;
                    println!("Central asks {}: {}\n  -> {}", device, question, answer);
                }
                Outcome::Failed(error) => {
                    failed += 1;
                    println!(
                        "Central asks {}: {}\n  !! {} [{}]",
                        name,
                        question,
                        error,
                        error.code()
                    );
                }
            }
        }

        println!();
        println!("Answered: {}  Failed: {}  Total: {}", answered, failed, questions);
        app.stop();
        Ok(())
    }

    /// Ask one question and print the answer
    async fn handle_ask_command(config: AppConfig, question: String, target: usize) -> Result<()> {
        if target == 0 {
            return Err(CliError::NoSuchPeripheral(target));
        }

        let mut app = EightBallApp::start(config).await?;
        let outcome = app.ask(target - 1, &question).await;
        app.stop();

        match outcome? {
            Outcome::Answered { device, answer } => {
                println!("{}: {}", device, answer);
                Ok(())
            }
            Outcome::Failed(error) => {
                println!("No answer: {}", error);
                Ok(())
            }
        }
    }

    fn handle_answers_command() -> Result<()> {
        for (index, answer) in answers::all().iter().enumerate() {
            let slug = answers::slug(index).unwrap_or_default();
            println!("{:>2}  {:<20} {}", index, slug, answer);
        }
        Ok(())
    }

    fn handle_config_command(config: &AppConfig, path: Option<&Path>, save: bool) -> Result<()> {
        if save {
            let path = AppConfig::config_path(path);
            config.save_to_file(&path)?;
            println!("Configuration saved to {}", path.display());
        } else {
            print!("{}", config.to_toml()?);
        }
        Ok(())
    }
}
