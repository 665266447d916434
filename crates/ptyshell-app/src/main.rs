use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use ptyshell::app::{
    run_exec_mode, run_history_mode, run_shell_mode, run_tokenize_mode, setup_from_cli, Components,
};
use ptyshell::{logging, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Tokenizing needs no configuration at all
    if let Some(Commands::Tokenize { line, json }) = &cli.command {
        println!("{}", run_tokenize_mode(&line.join(" "), *json)?.trim_end());
        return Ok(());
    }

    let app_config = setup_from_cli(&cli)?;
    if let Err(e) = logging::init(&app_config.shell.log_dir) {
        eprintln!("{} {:#}", "Logging disabled:".yellow(), e);
    }

    let components = Components::build(&app_config);

    let code = match cli.command_or_default() {
        Commands::Shell { shell, args } => {
            run_shell_mode(&app_config, &components, shell.as_deref(), &args).await?
        }
        Commands::Exec { line } => run_exec_mode(&app_config, &components, &line.join(" ")).await?,
        Commands::History { query, top } => {
            print!("{}", run_history_mode(&components, query.as_deref(), top)?);
            0
        }
        Commands::Tokenize { .. } => 0,
    };

    drop(components);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
