//! Terminal input shared by the REPL and the approval prompt.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use codeloom_ai::{ApprovalDecision, ApprovalHandler, ApprovalRequest, ModeSelector, PlanInfo};
use codeloom_traits::SessionMode;

/// Line-oriented stdin; one reader for the whole process.
pub struct Terminal {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Terminal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        })
    }

    /// Print `prompt` and read one line. `None` on end of input.
    pub async fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        let mut lines = self.lines.lock().await;
        Ok(lines.next_line().await?)
    }
}

/// Asks on the terminal: `y` approve, `n` decline, `a` always allow.
pub struct TerminalApproval {
    terminal: Arc<Terminal>,
}

impl TerminalApproval {
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self { terminal }
    }
}

#[async_trait]
impl ApprovalHandler for TerminalApproval {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalDecision {
        println!();
        println!(
            "{} {} ({:?} risk)",
            "Approve".yellow().bold(),
            request.tool_name.bold(),
            request.risk
        );
        let arguments = serde_json::to_string_pretty(&request.arguments).unwrap_or_default();
        for line in arguments.lines() {
            println!("  {}", line.dimmed());
        }

        loop {
            let answer = match self.terminal.read_line("[y]es / [n]o / [a]lways > ").await {
                Ok(Some(answer)) => answer,
                Ok(None) => return ApprovalDecision::declined(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read approval answer");
                    return ApprovalDecision::declined();
                }
            };
            match parse_answer(&answer) {
                Some(decision) => return decision,
                None => println!("Please answer y, n or a."),
            }
        }
    }
}

fn parse_answer(answer: &str) -> Option<ApprovalDecision> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(ApprovalDecision::Approved),
        "a" | "always" => Some(ApprovalDecision::AlwaysAllow),
        "" | "n" | "no" => Some(ApprovalDecision::declined()),
        other => other.strip_prefix("n ").map(|reason| ApprovalDecision::Declined {
            reason: Some(reason.trim().to_string()),
        }),
    }
}

/// Asks which mode to continue in once a plan is finished.
pub struct TerminalModeSelector {
    terminal: Arc<Terminal>,
}

impl TerminalModeSelector {
    pub fn new(terminal: Arc<Terminal>) -> Self {
        Self { terminal }
    }
}

#[async_trait]
impl ModeSelector for TerminalModeSelector {
    async fn select_mode(&self, plan: &PlanInfo) -> SessionMode {
        println!();
        println!(
            "{} {} ({})",
            "Plan finished:".green().bold(),
            plan.slug,
            plan.dir.display()
        );
        let answer = self
            .terminal
            .read_line("Continue in [n]ormal or [a]uto-accept mode? > ")
            .await;
        match answer {
            Ok(Some(answer)) if matches!(answer.trim(), "a" | "auto-accept") => {
                SessionMode::AutoAccept
            }
            _ => SessionMode::Normal,
        }
    }
}
