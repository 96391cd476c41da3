//! Chat command - interactive REPL mode.

use anyhow::Result;
use clap::Args;

use super::Context;
use super::repl::Repl;
use crate::state::ChatState;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Resume an existing session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Force start a new session
    #[arg(short, long)]
    pub new: bool,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let session_events = client.subscribe_session();

    let mut state = ChatState::new(client);
    state.initialize().await;

    if args.new {
        state.new_session();
    } else if let Some(id) = &args.session
        && !state.load_session(id)
    {
        anyhow::bail!("Session {} not found", id);
    }

    let mut repl = Repl::new(state, session_events, ctx.verbose)?;
    repl.run().await
}
