//! Transcribe command - speech to text.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::{Context, read_upload};

/// Arguments for the transcribe command.
#[derive(Args, Debug)]
pub struct TranscribeArgs {
    /// Audio file to transcribe
    pub file: PathBuf,
}

/// Run the transcribe command.
pub async fn run(args: TranscribeArgs, ctx: &Context) -> Result<()> {
    let audio = read_upload(&args.file).await?;
    let client = ctx.client()?;

    let text = client.chat().transcribe(audio).await?;

    if ctx.json_output {
        return ctx.print_json(&serde_json::json!({ "transcription": text }));
    }

    println!("{}", text);
    Ok(())
}
