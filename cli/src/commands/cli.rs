use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bankbot", version, about = "Bank customer-service chatbot backend")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to load instead of the default search path.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DbCommand {
    /// Create the mirror tables if they do not exist.
    Init(DbInitArgs),
    /// Show mirror health and the most recent sessions.
    Info(DbInfoArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DbInitArgs {
    /// Override `mirror.database_url`.
    #[arg(long)]
    pub database_url: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DbInfoArgs {
    #[arg(long)]
    pub database_url: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub limit: u32,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct TranscriptArgs {
    pub session_id: String,

    /// Owner of the session; defaults to the owner on the session record.
    #[arg(long)]
    pub customer_id: Option<String>,

    #[arg(long)]
    pub database_url: Option<String>,

    /// Print records as JSON lines instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server.
    Serve(ServeArgs),
    Db(DbArgs),
    /// Print the mirrored transcript of a session.
    Transcript(TranscriptArgs),
}
