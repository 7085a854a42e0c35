//! `mpienv list` command

use anyhow::Result;

use crate::cli::ListArgs;
use crate::GlobalOptions;
use mpienv::registry::EntryRecord;
use mpienv::Registry;

pub fn execute(args: ListArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let registry = Registry::load(&ctx)?;
    let records = registry.records();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        opts.shell
            .note("no MPI registered; use `mpienv add <prefix>` or `mpienv install`");
        return Ok(());
    }

    let width = records.iter().map(|r| r.name.len()).max().unwrap_or(0);
    for record in &records {
        println!("{}", format_line(record, width));
    }

    Ok(())
}

fn format_line(record: &EntryRecord<'_>, width: usize) -> String {
    let marker = if record.active { '*' } else { ' ' };
    let detail = match (record.installation, record.error) {
        (Some(installation), _) => format!(
            "{} {}  {}",
            installation.kind(),
            installation.version(),
            installation.prefix.display()
        ),
        (None, Some(reason)) => format!("(unusable: {})", reason),
        (None, None) => "(broken)".to_string(),
    };
    format!("{} {:<width$}  {}", marker, record.name, detail, width = width)
}
