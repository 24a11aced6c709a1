use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use codeloom_core::{ConversationService, SessionHandle};
use codeloom_traits::SessionMode;

use crate::cli::ChatArgs;
use crate::commands::resolve_mode;
use crate::render::spawn_printer;
use crate::setup::AppContext;
use crate::terminal::{Terminal, TerminalApproval, TerminalModeSelector};

/// A line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Message(String),
    Clear,
    Mode(Option<SessionMode>),
    Help,
    Exit,
    Empty,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or_default() {
        "clear" => Input::Clear,
        "exit" | "quit" => Input::Exit,
        "mode" => Input::Mode(match parts.next() {
            Some("normal") => Some(SessionMode::Normal),
            Some("auto-accept" | "auto") => Some(SessionMode::AutoAccept),
            _ => None,
        }),
        "help" => Input::Help,
        _ => Input::Message(line.to_string()),
    }
}

pub async fn run(ctx: &AppContext, args: ChatArgs) -> Result<()> {
    let terminal = Terminal::new();
    let conversation = ctx.conversation(
        resolve_mode(args.mode, &ctx.config),
        Arc::new(TerminalApproval::new(terminal.clone())),
        Arc::new(TerminalModeSelector::new(terminal.clone())),
    )?;
    let handle = ConversationService::spawn(conversation);

    println!(
        "{} {}",
        "codeloom".bold(),
        "(/help for commands, Ctrl-C cancels a running turn)".dimmed()
    );

    loop {
        let prompt = format!("{} > ", handle.session().mode().as_str().cyan());
        let Some(line) = terminal.read_line(&prompt).await? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Exit => break,
            Input::Help => print_help(),
            Input::Clear => {
                handle.clear().await?;
                println!("{}", "Conversation cleared.".dimmed());
            }
            Input::Mode(None) => println!("Usage: /mode normal|auto-accept"),
            Input::Mode(Some(mode)) => match handle.session().set_mode(mode) {
                Ok(()) => println!("{} {}", "Mode:".dimmed(), mode.as_str()),
                Err(e) => println!("{} {}", "!".yellow().bold(), e),
            },
            Input::Message(text) => submit(&handle, text).await,
        }
    }
    Ok(())
}

async fn submit(handle: &SessionHandle, text: String) {
    let (tx, printer) = spawn_printer();
    let cancel = CancellationToken::new();

    let outcome = {
        let turn = handle.submit_with(text, cancel.clone(), Some(tx));
        tokio::pin!(turn);
        loop {
            tokio::select! {
                outcome = &mut turn => break outcome,
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
            }
        }
    };
    let _ = printer.await;

    match outcome {
        Ok(outcome) if outcome.is_cancelled() => println!("{}", "Cancelled.".yellow()),
        Ok(_) => {}
        Err(e) => println!("{} {:#}", "Error:".red().bold(), e),
    }
}

fn print_help() {
    println!("  /clear              start a fresh conversation");
    println!("  /mode <mode>        switch to normal or auto-accept");
    println!("  /exit               leave");
}
