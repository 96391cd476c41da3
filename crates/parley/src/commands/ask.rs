//! Ask command - one-shot prompt.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::Style;

use super::{Context, read_upload};

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question or prompt to send
    #[arg(required = true)]
    pub prompt: String,

    /// Continue an existing session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Attach an image
    #[arg(short, long)]
    pub image: Option<PathBuf>,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let dim = Style::new().dim();

    if ctx.verbose {
        eprintln!("{}", dim.apply_to(format!("Sending to: {}", client.base_url())));
        if let Some(ref session) = args.session {
            eprintln!("{}", dim.apply_to(format!("Session: {}", session)));
        }
    }

    let reply = match &args.image {
        Some(path) => {
            let image = read_upload(path).await?;
            client
                .chat()
                .send_with_image(&args.prompt, image, args.session.as_deref())
                .await?
        }
        None => {
            client
                .chat()
                .send(&args.prompt, args.session.as_deref())
                .await?
        }
    };

    if ctx.json_output {
        return ctx.print_json(&serde_json::json!({ "response": reply }));
    }

    println!("{}", reply);
    Ok(())
}
