use crate::infra::{parse_date, seeded_helpdesk};
use chrono::{Local, NaiveDate};
use clap::Args;
use std::fs;
use std::path::PathBuf;
use techdesk::config::AppConfig;
use techdesk::error::AppError;
use techdesk::tickets::{ExportRange, PageRequest, TicketQuery, TicketServiceError};

#[derive(Args, Debug, Default)]
pub(crate) struct SeedArgs {
    /// Demo account whose view of the tickets is printed
    #[arg(long, default_value = "superadmin")]
    pub(crate) as_user: String,
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// First submission day to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) from: NaiveDate,
    /// Last submission day to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) to: NaiveDate,
    /// Demo account whose visibility scopes the export
    #[arg(long, default_value = "superadmin")]
    pub(crate) as_user: String,
    /// Write the CSV here instead of standard output
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_seed_listing(args: SeedArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let helpdesk = seeded_helpdesk(&config.helpdesk, true)?;
    let catalog = &helpdesk.catalog;

    println!("Helpdesk demo data");
    println!(
        "- {} countries | {} regions | {} centres",
        catalog.countries.len(),
        catalog.regions.len(),
        catalog.centres.len()
    );
    println!(
        "- {} categories | {} subcategories",
        catalog.categories.len(),
        catalog.subcategories.len()
    );
    println!("- {} tickets filed by demo accounts", helpdesk.tickets_seeded);

    println!("\nDemo accounts");
    for username in catalog.users.keys() {
        let identity = helpdesk
            .state
            .identity
            .identity_for(catalog.user(username)?)?;
        println!("  - {} ({})", identity.username, identity.role);
    }

    let actor = helpdesk
        .state
        .identity
        .identity_for(catalog.user(&args.as_user)?)?;
    let page = helpdesk.state.tickets.list(
        &actor,
        &TicketQuery::default(),
        PageRequest::default(),
    )?;
    println!("\nTickets visible to {} ({} total)", actor.username, page.total);
    for ticket in &page.items {
        println!(
            "  #{} [{}] {} | {} | {} | {}",
            ticket.number,
            ticket.status_label,
            ticket.title,
            ticket.centre,
            ticket.priority.label(),
            ticket.submitted_by
        );
    }

    let summary = helpdesk
        .state
        .tickets
        .dashboard(&actor, &TicketQuery::default())?;
    println!("\nDashboard");
    for (status, count) in &summary.by_status {
        println!("  - {status}: {count}");
    }
    println!("  - High priority open: {}", summary.high_priority_open);
    for entry in &summary.technician_workload {
        println!("  - {} working on {}", entry.label, entry.count);
    }

    Ok(())
}

pub(crate) fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let ExportArgs {
        from,
        to,
        as_user,
        output,
    } = args;

    let range = ExportRange::new(from, to).map_err(TicketServiceError::from)?;
    let config = AppConfig::load()?;
    let helpdesk = seeded_helpdesk(&config.helpdesk, true)?;
    let actor = helpdesk
        .state
        .identity
        .identity_for(helpdesk.catalog.user(&as_user)?)?;
    let csv = helpdesk.state.tickets.export_csv(&actor, range)?;

    match output {
        Some(path) => {
            fs::write(&path, &csv)?;
            println!(
                "Wrote {} ({} bytes, generated {})",
                path.display(),
                csv.len(),
                Local::now().format("%Y-%m-%d %H:%M")
            );
        }
        None => print!("{}", String::from_utf8_lossy(&csv)),
    }
    Ok(())
}
