use std::io::Read;

use clap::{Parser, Subcommand};
use story_forwarder::commands;

/// Forwards a profile's current Instagram stories to a Telegram channel.
#[derive(Parser, Debug)]
#[command(name = "story-forwarder")]
#[command(about = "Forwards Instagram stories to a Telegram channel, oldest first")]
#[command(version)]
struct Cli {
    /// What to do; defaults to `run`
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run one forwarding cycle with settings from the environment
    Run,
    /// Read an invocation event as JSON from stdin, run one cycle and print the reply
    Handler,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => commands::run_once()
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from),
        Command::Handler => run_handler().await,
    };

    if let Err(e) = result {
        log::error!("Run failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_handler() -> anyhow::Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;

    let event = commands::parse_event(&input)?;
    let response = commands::handler(event, serde_json::Value::Null).await?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_is_the_default() {
        let cli = Cli::try_parse_from(["story-forwarder"]).unwrap();
        assert_eq!(cli.command.unwrap_or(Command::Run), Command::Run);

        let cli = Cli::try_parse_from(["story-forwarder", "run"]).unwrap();
        assert_eq!(cli.command, Some(Command::Run));
    }

    #[test]
    fn test_handler_subcommand() {
        let cli = Cli::try_parse_from(["story-forwarder", "handler"]).unwrap();
        assert_eq!(cli.command, Some(Command::Handler));
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["story-forwarder", "upload"]).is_err());

        let help = Cli::try_parse_from(["story-forwarder", "--help"]).unwrap_err();
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
