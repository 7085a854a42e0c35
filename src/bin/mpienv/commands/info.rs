//! `mpienv info` command

use anyhow::Result;

use crate::cli::InfoArgs;
use crate::GlobalOptions;
use mpienv::registry::EntryRecord;
use mpienv::Registry;

pub fn execute(args: InfoArgs, opts: &GlobalOptions) -> Result<()> {
    let ctx = opts.context()?;
    let registry = Registry::load(&ctx)?;

    let name = match args.name.as_deref() {
        Some(name) => name,
        None => registry.current_active()?,
    };
    let record = registry.record(name)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        for (key, value) in fields(&record) {
            println!("{:<16}{}", format!("{}:", key), value);
        }
    }

    Ok(())
}

fn fields(record: &EntryRecord<'_>) -> Vec<(&'static str, String)> {
    let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
    let mut fields = vec![
        ("name", record.name.to_string()),
        ("active", yes_no(record.active)),
    ];

    let Some(installation) = record.installation else {
        let status = match record.error {
            Some(reason) => format!("unusable: {}", reason),
            None => "broken".to_string(),
        };
        fields.push(("status", status));
        return fields;
    };

    fields.push(("type", installation.kind().to_string()));
    fields.push(("version", installation.version().to_string()));
    if let Some(api) = installation.flavor.mpi_version() {
        fields.push(("mpi version", api.to_string()));
    }
    if let Some(base) = installation.flavor.mpich_version() {
        fields.push(("mpich version", base.to_string()));
    }
    fields.push(("prefix", installation.prefix.display().to_string()));
    fields.push(("mpiexec", installation.launcher.display().to_string()));
    for (key, path) in [("mpicc", &installation.cc), ("mpicxx", &installation.cxx)] {
        let value = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        fields.push((key, value));
    }
    fields.push(("symlink", yes_no(installation.symlink)));

    let bindings: Vec<String> = installation
        .flavor
        .bindings()
        .iter()
        .map(|b| b.to_string())
        .collect();
    fields.push(("bindings", bindings.join(", ")));
    let cuda = match installation.flavor.cuda() {
        Some(b) => yes_no(b),
        None => "unknown".to_string(),
    };
    fields.push(("cuda", cuda));

    let flags = installation.flavor.configure_flags();
    if !flags.is_empty() {
        fields.push(("configure", flags.join(" ")));
    }

    fields
}
