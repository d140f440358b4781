use crate::commands::{run_export, run_seed_listing, ExportArgs, SeedArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use techdesk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "techdesk",
    about = "Run the IT support helpdesk or inspect its seeded demo data",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Seed the demo directory, accounts and tickets, then print what was created
    Seed(SeedArgs),
    /// Export the seeded tickets visible to a demo account as CSV
    Export(ExportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Start without the demo tickets (accounts and reference data are always seeded)
    #[arg(long)]
    pub(crate) no_demo_tickets: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Seed(args) => run_seed_listing(args),
        Command::Export(args) => run_export(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["techdesk"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn export_requires_a_date_range() {
        assert!(Cli::try_parse_from(["techdesk", "export", "--from", "2024-03-01"]).is_err());
        let cli = Cli::try_parse_from([
            "techdesk",
            "export",
            "--from",
            "2024-03-01",
            "--to",
            "2024-03-31",
            "--as-user",
            "levy",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Export(args)) => assert_eq!(args.as_user, "levy"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
