use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use codeloom_ai::agent::{ChannelEmitter, NullEmitter};
use codeloom_ai::{Message, StreamEmitter};

use crate::cli::{OutputFormat, RunArgs};
use crate::commands::resolve_mode;
use crate::output::print_json;
use crate::render::spawn_printer;
use crate::setup::AppContext;
use crate::terminal::{Terminal, TerminalApproval, TerminalModeSelector};

pub async fn run(ctx: &AppContext, args: RunArgs, format: OutputFormat) -> Result<()> {
    let terminal = Terminal::new();
    let conversation = ctx.conversation(
        resolve_mode(args.mode, &ctx.config),
        Arc::new(TerminalApproval::new(terminal.clone())),
        Arc::new(TerminalModeSelector::new(terminal)),
    )?;

    let (mut emitter, printer): (Box<dyn StreamEmitter>, _) = if format.is_json() {
        (Box::new(NullEmitter), None)
    } else {
        let (tx, printer) = spawn_printer();
        (Box::new(ChannelEmitter::new(tx)), Some(printer))
    };

    let cancel = CancellationToken::new();
    let mut history = vec![Message::user(args.prompt)];
    let outcome = {
        let turn = conversation.run(&mut history, emitter.as_mut(), &cancel);
        tokio::pin!(turn);
        loop {
            tokio::select! {
                outcome = &mut turn => break outcome,
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
            }
        }
    };
    drop(emitter);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    let outcome = outcome?;

    if format.is_json() {
        return print_json(&serde_json::json!({
            "status": if outcome.is_cancelled() { "cancelled" } else { "completed" },
            "answer": outcome.final_answer,
            "model_calls": outcome.model_calls,
            "tool_calls": outcome.tool_calls_executed,
            "diagnostics": outcome.diagnostics,
        }));
    }

    if outcome.is_cancelled() {
        println!("{}", "Cancelled.".yellow());
    }
    Ok(())
}
