//! REPL (Read-Eval-Print Loop) implementation for interactive chat.

use std::path::Path;

use anyhow::Result;
use console::{Style, Term, style};
use parley_client::{ParleyClient, SessionState};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use tokio::sync::watch;

use super::{print_session_expired, read_upload};
use crate::state::ChatState;

/// REPL state and configuration.
pub struct Repl {
    state: ChatState<ParleyClient>,
    session_events: watch::Receiver<SessionState>,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

impl Repl {
    /// Create a new REPL instance.
    pub fn new(
        state: ChatState<ParleyClient>,
        session_events: watch::Receiver<SessionState>,
        verbose: bool,
    ) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;

        Ok(Self {
            state,
            session_events,
            editor,
            term: Term::stdout(),
            verbose,
        })
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();
        self.report_error();

        loop {
            if self.signed_out() {
                print_session_expired();
                break;
            }

            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    // Handle slash commands
                    if line.starts_with('/') {
                        match self.handle_slash_command(line).await {
                            Ok(ControlFlow::Continue) => {}
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => self.print_error(&format!("Command error: {}", e)),
                        }
                        self.report_error();
                        continue;
                    }

                    match self.state.send_message(line).await {
                        Ok(Some(reply)) => self.print_reply(&reply),
                        Ok(None) => {}
                        Err(e) => self.print_failure(e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C - cancel current line but don't exit
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D - exit
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Goodbye!");
        Ok(())
    }

    fn signed_out(&self) -> bool {
        matches!(*self.session_events.borrow(), SessionState::SignedOut { .. })
    }

    /// Handle a slash command.
    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let input = &input[1..];
        let (cmd, rest) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (input, ""),
        };

        match cmd {
            "quit" | "q" | "exit" => {
                return Ok(ControlFlow::Exit);
            }
            "help" | "h" | "?" => {
                self.print_help();
            }
            "clear" | "cls" => {
                self.term.clear_screen()?;
            }
            "new" => {
                self.state.new_session();
                self.print_dim("Started new session");
            }
            "session" => self.print_session(),
            "history" => {
                if self.state.load_history().await.is_ok() {
                    self.print_history();
                }
            }
            "load" if !rest.is_empty() => {
                if self.state.load_session(rest) {
                    self.print_session();
                }
            }
            "delete" if !rest.is_empty() => {
                if self.state.delete_session(rest).await.is_ok() {
                    self.print_dim(&format!("Deleted session {}", rest));
                }
            }
            "rename" if !rest.is_empty() => {
                if self.state.rename_current(rest).await.is_ok() {
                    self.print_dim(&format!("Renamed to \"{}\"", rest));
                }
            }
            "image" if !rest.is_empty() => {
                let (path, prompt) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let image = read_upload(Path::new(path)).await?;
                let prompt = if prompt.trim().is_empty() {
                    "What is in this image?"
                } else {
                    prompt
                };
                match self.state.send_message_with_image(prompt, image).await {
                    Ok(Some(reply)) => self.print_reply(&reply),
                    Ok(None) => {}
                    Err(e) => self.print_failure(e),
                }
            }
            "" => {
                self.print_dim("Type /help for available commands");
            }
            _ => {
                self.print_error(&format!("Unknown command: /{}", input));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Parley Chat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to("Type your message and press Enter to chat.")
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, Ctrl+D to exit.")
        );
        if let Some(session) = self.state.current() {
            println!("{}", dim.apply_to(format!("Session: {}", session.title)));
        }
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Start a new session", style("/new").cyan());
        println!("  {}  - Show the current session", style("/session").cyan());
        println!("  {}  - List sessions", style("/history").cyan());
        println!("  {}  - Switch to a session", style("/load <id>").cyan());
        println!("  {}  - Delete a session", style("/delete <id>").cyan());
        println!("  {}  - Rename the current session", style("/rename <title>").cyan());
        println!(
            "  {}  - Send an image",
            style("/image <path> [prompt]").cyan()
        );
        println!();
        println!("{}", dim.apply_to("Keyboard shortcuts:"));
        println!("  {} - Cancel the current line", dim.apply_to("Ctrl+C"));
        println!("  {} - Exit the REPL", dim.apply_to("Ctrl+D"));
        println!();
    }

    fn print_session(&self) {
        let dim = Style::new().dim();
        let Some(session) = self.state.current() else {
            self.print_dim("No active session");
            return;
        };

        let origin = if self.state.is_local(&session.id) {
            " (not yet saved)"
        } else {
            ""
        };
        println!("{}{}", style(&session.title).bold(), dim.apply_to(origin));
        if self.verbose {
            println!("{}", dim.apply_to(format!("id: {}", session.id)));
        }
        for message in &session.messages {
            let who = if message.is_user {
                style("you").green().bold()
            } else {
                style("assistant").cyan().bold()
            };
            println!("{} {}", who, message.text);
        }
    }

    fn print_history(&self) {
        let dim = Style::new().dim();
        if self.state.history().is_empty() {
            self.print_dim("No sessions yet");
            return;
        }
        let current = self.state.current().map(|s| s.id.as_str());
        for session in self.state.history() {
            let marker = if current == Some(session.id.as_str()) {
                "*"
            } else {
                " "
            };
            println!(
                "{} {:<36} {} {}",
                marker,
                session.id,
                session.title,
                dim.apply_to(session.created_at.format("%Y-%m-%d %H:%M").to_string())
            );
        }
    }

    fn print_reply(&self, reply: &str) {
        println!();
        println!("{}", reply);
        println!();
    }

    fn print_failure(&mut self, err: parley_client::Error) {
        if err.is_session_ended() {
            // The loop prints the sign-in hint on its next turn
            return;
        }
        if self.verbose {
            self.print_dim(&format!("{}", err));
        }
        self.report_error();
    }

    /// Print and clear the state's pending error.
    fn report_error(&mut self) {
        if let Some(msg) = self.state.error().map(str::to_string) {
            self.print_error(&msg);
            self.state.clear_error();
        }
    }

    fn format_prompt(&self) -> String {
        format!("{} ", style("parley>").cyan().bold())
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}

/// Control flow for the REPL.
pub enum ControlFlow {
    Continue,
    Exit,
}
