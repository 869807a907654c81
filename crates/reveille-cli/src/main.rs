use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod bell;
mod commands;

#[derive(Parser)]
#[command(name = "reveille-cli", version, about = "Reveille alarm clock CLI")]
struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Alarm management
    Alarm {
        #[command(subcommand)]
        action: commands::alarm::AlarmAction,
    },
    /// Run the alarm engine in the foreground
    Run(commands::run::RunArgs),
    /// Practice a dismissal challenge
    Challenge(commands::challenge::ChallengeArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Backup, restore and reset stored data
    Data {
        #[command(subcommand)]
        action: commands::data::DataAction,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Alarm { action } => commands::alarm::run(action),
        Commands::Run(args) => commands::run::run(args),
        Commands::Challenge(args) => commands::challenge::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Data { action } => commands::data::run(action),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
