//! Prints conversation events as they arrive.

use std::io::Write;

use colored::Colorize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use codeloom_ai::ConversationEvent;

use crate::output::preview_text;

const EVENT_BUFFER: usize = 256;
const RESULT_PREVIEW_LEN: usize = 120;

/// Spawn a printer; the task ends once every sender is dropped.
pub fn spawn_printer() -> (mpsc::Sender<ConversationEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let handle = tokio::spawn(async move {
        let mut printer = Printer::default();
        while let Some(event) = rx.recv().await {
            printer.print(event);
        }
        printer.finish_line();
    });
    (tx, handle)
}

#[derive(Default)]
struct Printer {
    mid_line: bool,
}

impl Printer {
    fn print(&mut self, event: ConversationEvent) {
        match event {
            ConversationEvent::TextDelta { content } => {
                print!("{content}");
                self.mid_line = !content.ends_with('\n');
                let _ = std::io::stdout().flush();
            }
            ConversationEvent::ToolCallStart {
                name, arguments, ..
            } => {
                self.finish_line();
                println!(
                    "{} {} {}",
                    "→".cyan(),
                    name.cyan().bold(),
                    preview_text(&arguments, RESULT_PREVIEW_LEN).dimmed()
                );
            }
            ConversationEvent::ToolCallResult {
                name,
                result,
                success,
                ..
            } => {
                self.finish_line();
                let marker = if success { "✓".green() } else { "✗".red() };
                println!(
                    "{} {} {}",
                    marker,
                    name.bold(),
                    preview_text(&result, RESULT_PREVIEW_LEN).dimmed()
                );
            }
            ConversationEvent::PhaseChanged { from, to } => {
                self.finish_line();
                println!("{} {} → {}", "Plan phase:".magenta().bold(), from, to);
            }
            ConversationEvent::Diagnostic { message } => {
                self.finish_line();
                println!("{} {}", "!".yellow().bold(), message.yellow());
            }
            ConversationEvent::Continuation { confidence } => {
                tracing::debug!(confidence, "Continuing after narrated intent");
            }
            // The approval prompt prints its own details.
            ConversationEvent::ApprovalRequested { .. } => {}
            ConversationEvent::Complete => self.finish_line(),
        }
    }

    fn finish_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }
}
