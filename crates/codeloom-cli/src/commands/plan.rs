use anyhow::{Result, bail};
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{OutputFormat, PlanCommands};
use crate::output::print_json;
use crate::setup::AppContext;

pub fn run(ctx: &AppContext, command: PlanCommands, format: OutputFormat) -> Result<()> {
    match command {
        PlanCommands::List => list_plans(ctx, format),
        PlanCommands::Show { slug } => show_plan(ctx, &slug, format),
    }
}

fn list_plans(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let plans = ctx.storage.plans.list()?;

    if format.is_json() {
        let entries: Vec<serde_json::Value> = plans
            .iter()
            .map(|slug| {
                let documents: Vec<String> = ctx
                    .storage
                    .plans
                    .read_all(slug)
                    .map(|docs| docs.into_iter().map(|d| d.name).collect())
                    .unwrap_or_default();
                serde_json::json!({ "slug": slug, "documents": documents })
            })
            .collect();
        return print_json(&entries);
    }

    if plans.is_empty() {
        println!("No plans yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Slug", "Documents"]);
    for slug in &plans {
        let documents = ctx.storage.plans.read_all(slug)?;
        let names: Vec<String> = documents.into_iter().map(|d| d.name).collect();
        table.add_row(vec![Cell::new(slug), Cell::new(names.join(", "))]);
    }
    println!("{table}");
    Ok(())
}

fn show_plan(ctx: &AppContext, slug: &str, format: OutputFormat) -> Result<()> {
    if !ctx.storage.plans.exists(slug) {
        bail!("Plan {} not found", slug);
    }
    let documents = ctx.storage.plans.read_all(slug)?;

    if format.is_json() {
        let documents: Vec<serde_json::Value> = documents
            .into_iter()
            .map(|d| serde_json::json!({ "name": d.name, "content": d.content }))
            .collect();
        return print_json(&serde_json::json!({ "slug": slug, "documents": documents }));
    }

    if documents.is_empty() {
        println!("Plan {slug} has no documents.");
        return Ok(());
    }
    for document in documents {
        println!("{}", format!("── {} ──", document.name).bold());
        println!("{}", document.content.trim_end());
        println!();
    }
    Ok(())
}
