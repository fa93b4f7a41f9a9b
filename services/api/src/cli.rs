use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use leave_approval::config::AppConfig;
use leave_approval::error::AppError;
use leave_approval::workflows::leave::{AuthError, JwtAuthority};

#[derive(Parser, Debug)]
#[command(
    name = "Leave Approval Service",
    about = "Run and demonstrate the leave approval workflow from the command line",
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
    /// Mint a development bearer token signed with JWT_SECRET
    Token(TokenArgs),
    /// Run the submit, decide and notify flow in-process and print each step
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct TokenArgs {
    /// Subject claim, usually the employee e-mail address
    #[arg(long)]
    pub(crate) subject: String,
    /// Minutes until the token expires
    #[arg(long, default_value_t = 60)]
    pub(crate) ttl_minutes: i64,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Token(args) => issue_token(args),
        Command::Demo(args) => run_demo(args),
    }
}

fn issue_token(args: TokenArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let authority = JwtAuthority::new(&config.approval.jwt_secret);
    let token = authority.issue(&args.subject, token_lifetime(args.ttl_minutes)?)?;
    println!("{token}");
    Ok(())
}

fn token_lifetime(minutes: i64) -> Result<chrono::Duration, AuthError> {
    chrono::Duration::try_minutes(minutes)
        .ok_or_else(|| AuthError::Issue(format!("ttl of {minutes} minutes is out of range")))
}
