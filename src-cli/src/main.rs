use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lexdoc")]
#[command(about = "Upload legal documents and track them until they are ready")]
#[command(version)]
struct Args {
    /// Identity token sent as the bearer credential
    #[arg(long, env = "LEXDOC_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files, open a session and follow processing until done
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Open one comparison session over all files
        #[arg(long)]
        compare: bool,
    },
    /// Poll the status of one document
    Status { id: String },
    /// List chat sessions
    Sessions,
    /// Show a chat session and its messages
    Session { id: String },
    /// Ask a question in an existing chat session
    Message { session: String, text: String },
    /// Delete a chat session
    DeleteSession { id: String },
    /// Print the effective settings
    Config,
}

fn main() {
    let args = Args::parse();
    lexdoc_lib::init_logging(&["lexdoc=info"]);

    match args.command {
        Command::Upload { files, compare } => lexdoc_lib::run(args.token, move |ctx| {
            lexdoc_lib::commands::upload(ctx, files, compare)
        }),
        Command::Status { id } => {
            lexdoc_lib::run(args.token, move |ctx| lexdoc_lib::commands::status(ctx, id))
        }
        Command::Sessions => lexdoc_lib::run(args.token, lexdoc_lib::commands::sessions),
        Command::Session { id } => {
            lexdoc_lib::run(args.token, move |ctx| lexdoc_lib::commands::session(ctx, id))
        }
        Command::Message { session, text } => lexdoc_lib::run(args.token, move |ctx| {
            lexdoc_lib::commands::message(ctx, session, text)
        }),
        Command::DeleteSession { id } => lexdoc_lib::run(args.token, move |ctx| {
            lexdoc_lib::commands::delete_session(ctx, id)
        }),
        Command::Config => lexdoc_lib::run(args.token, lexdoc_lib::commands::show_config),
    }
}
