//! Config command - client context management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use parley_config::{ClientConfig, Context as ClientContext, CredentialStorage};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show configuration file paths
    Path,

    /// Show the current context name
    CurrentContext,

    /// List available contexts
    GetContexts,

    /// Switch to a different context
    UseContext {
        /// Context name to switch to
        name: String,
    },

    /// Create or update a context
    SetContext {
        /// Context name
        name: String,

        /// API base URL (e.g., http://localhost:8000/api)
        #[arg(long)]
        server: Option<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Where to go once the session ends
        #[arg(long)]
        signin_path: Option<String>,

        /// Credential storage for this context
        #[arg(long, value_enum)]
        credentials: Option<StorageKind>,

        /// Credentials file (with --credentials file)
        #[arg(long)]
        credentials_path: Option<PathBuf>,
    },

    /// Delete a context
    DeleteContext {
        /// Context name to delete
        name: String,
    },
}

/// Credential storage choice on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    File,
    Memory,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Path => cmd_path(),
        ConfigCommand::CurrentContext => cmd_current_context(),
        ConfigCommand::GetContexts => cmd_get_contexts(ctx),
        ConfigCommand::UseContext { name } => cmd_use_context(&name),
        ConfigCommand::SetContext {
            name,
            server,
            timeout,
            signin_path,
            credentials,
            credentials_path,
        } => {
            let storage = storage_from_flags(credentials, credentials_path)?;
            let mut config = parley_config::load_client_config()?;
            for line in set_context(&mut config, &name, server, timeout, signin_path, storage)? {
                println!("{}", line);
            }
            parley_config::save_client_config(&config)?;
            Ok(())
        }
        ConfigCommand::DeleteContext { name } => cmd_delete_context(&name),
    }
}

fn cmd_path() -> Result<()> {
    match parley_config::client_config_path() {
        Some(path) => println!("config:      {}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    if let Some(path) = parley_config::credentials_path() {
        println!("credentials: {}", path.display());
    }
    println!("logs:        {}", parley_config::log_dir().display());
    Ok(())
}

fn cmd_current_context() -> Result<()> {
    let config = parley_config::load_client_config()?;

    match &config.current_context {
        Some(name) => {
            println!("{}", name);
        }
        None => {
            println!("No current context set. Use 'parley config use-context <name>' to set one.");
        }
    }

    Ok(())
}

fn cmd_get_contexts(ctx: &Context) -> Result<()> {
    let config = parley_config::load_client_config()?;

    if ctx.json_output {
        return ctx.print_json(&config.contexts);
    }

    if config.contexts.is_empty() {
        println!("No contexts configured.");
        println!();
        println!("Create one with:");
        println!("  parley config set-context local --server=http://localhost:8000/api");
        return Ok(());
    }

    let current = config.current_context.as_deref();

    println!("CURRENT   NAME            SERVER");
    for context in &config.contexts {
        let marker = if current == Some(context.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{}         {:<15} {}", marker, context.name, context.server);
    }

    Ok(())
}

fn cmd_use_context(name: &str) -> Result<()> {
    let mut config = parley_config::load_client_config()?;

    config.use_context(name)?;
    parley_config::save_client_config(&config)?;

    println!("Switched to context \"{}\".", name);

    Ok(())
}

fn storage_from_flags(
    kind: Option<StorageKind>,
    path: Option<PathBuf>,
) -> Result<Option<CredentialStorage>> {
    match (kind, path) {
        (Some(StorageKind::Memory), Some(_)) => {
            anyhow::bail!("--credentials-path only applies to file storage")
        }
        (Some(StorageKind::Memory), None) => Ok(Some(CredentialStorage::Memory)),
        (Some(StorageKind::File) | None, Some(path)) => Ok(Some(CredentialStorage::file(path))),
        (Some(StorageKind::File), None) => Ok(Some(CredentialStorage::default())),
        (None, None) => Ok(None),
    }
}

/// Create or update a context in `config`, returning messages for the user.
fn set_context(
    config: &mut ClientConfig,
    name: &str,
    server: Option<String>,
    timeout: Option<u64>,
    signin_path: Option<String>,
    credentials: Option<CredentialStorage>,
) -> Result<Vec<String>> {
    let mut messages = Vec::new();

    match config.get_context_mut(name) {
        Some(context) => {
            if let Some(url) = server {
                context.server = url;
            }
            if timeout.is_some() {
                context.timeout = timeout;
            }
            if signin_path.is_some() {
                context.signin_path = signin_path;
            }
            if credentials.is_some() {
                context.credentials = credentials;
            }
            messages.push(format!("Context \"{}\" modified.", name));
        }
        None => {
            // Creating a new context requires a server
            let server_url = server.ok_or_else(|| {
                anyhow::anyhow!("--server is required when creating a new context")
            })?;

            let mut context = ClientContext::new(name, server_url);
            context.timeout = timeout;
            context.signin_path = signin_path;
            context.credentials = credentials;

            config.set_context(context);
            messages.push(format!("Context \"{}\" created.", name));
        }
    }

    // The first context becomes current
    if config.current_context.is_none() && config.contexts.len() == 1 {
        config.current_context = Some(name.to_string());
        messages.push(format!("Context \"{}\" set as current context.", name));
    }

    Ok(messages)
}

fn cmd_delete_context(name: &str) -> Result<()> {
    let mut config = parley_config::load_client_config()?;

    match config.remove_context(name) {
        Some(_) => {
            parley_config::save_client_config(&config)?;
            println!("Context \"{}\" deleted.", name);
            if config.current_context.is_none() {
                println!(
                    "Note: No current context. Use 'parley config use-context <name>' to set one."
                );
            }
        }
        None => {
            println!("Context \"{}\" not found.", name);
        }
    }

    Ok(())
}
