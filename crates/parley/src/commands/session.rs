//! History and session commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};
use parley_client::ChatSession;

use super::Context;

/// Arguments for the session command.
#[derive(Args, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Show a session and its messages
    Show {
        /// Session ID
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session ID
        id: String,
    },

    /// Rename a session
    Rename {
        /// Session ID
        id: String,

        /// New title
        title: String,
    },

    /// Start a new session on the server
    New,
}

/// Run the history command.
pub async fn history(ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let sessions = client.chat().history().await?;

    if ctx.json_output {
        return ctx.print_json(&sessions);
    }

    if sessions.is_empty() {
        println!("No chat sessions yet. Start one with 'parley chat'.");
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{:<36}  {:<16}  TITLE", "ID", "CREATED");
    for session in &sessions {
        println!(
            "{:<36}  {:<16}  {}",
            session.id,
            dim.apply_to(session.created_at.format("%Y-%m-%d %H:%M").to_string()),
            session.title
        );
    }
    Ok(())
}

/// Run the session command.
pub async fn run(args: SessionArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;

    match args.command {
        SessionCommand::Show { id } => {
            let session = client.chat().session(&id).await?;
            if ctx.json_output {
                return ctx.print_json(&session);
            }
            print_session(&session);
        }
        SessionCommand::Delete { id } => {
            client.chat().delete_session(&id).await?;
            println!("Session {} deleted.", id);
        }
        SessionCommand::Rename { id, title } => {
            client.chat().rename_session(&id, &title).await?;
            println!("Session {} renamed to \"{}\".", id, title);
        }
        SessionCommand::New => {
            let session = client.chat().create_session().await?;
            if ctx.json_output {
                return ctx.print_json(&session);
            }
            println!("{}", session.id);
        }
    }

    Ok(())
}

fn print_session(session: &ChatSession) {
    let dim = Style::new().dim();
    println!("{}", style(&session.title).bold());
    println!("{}", dim.apply_to(format!("id: {}", session.id)));
    println!();

    if session.messages.is_empty() {
        println!("{}", dim.apply_to("(no messages)"));
        return;
    }

    for message in &session.messages {
        let who = if message.is_user {
            style("you").green().bold()
        } else {
            style("assistant").cyan().bold()
        };
        println!(
            "{} {}",
            who,
            dim.apply_to(message.timestamp.format("%H:%M").to_string())
        );
        println!("{}", message.text);
        if let Some(image) = &message.image {
            println!("{}", dim.apply_to(format!("[image: {}]", image)));
        }
        println!();
    }
}
