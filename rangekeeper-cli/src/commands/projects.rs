//! Project commands: publish, modify, list, show and unpublish.

use anyhow::{Context, Result, anyhow};
use rangekeeper_core::Store;
use rangekeeper_core::projects::{self, LoadFileChange, ProjectChanges, ProjectId, ProjectRecord};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the user acting on projects.
///
/// An explicit `--user` wins, then `SUDO_USER`, then `USER`.
pub fn resolve_owner(explicit: Option<String>) -> Result<String> {
    resolve_owner_with(explicit, |key| env::var(key).ok())
}

fn resolve_owner_with(
    explicit: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    explicit
        .or_else(|| lookup("SUDO_USER"))
        .or_else(|| lookup("USER"))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("Cannot determine the current user; pass --user"))
}

/// Allocate units for a new project.
pub fn publish(
    store: &Store,
    owner: &str,
    data_dir: &Path,
    load_file: Option<PathBuf>,
) -> Result<()> {
    let data_dir = absolute(data_dir)?;
    let record = store.transact(|txn| projects::publish(txn, owner, data_dir, load_file))?;

    match project_link(store, &record.id) {
        Some(url) => {
            println!("New project: {}, Open browser at", record.id);
            println!("{url}");
        }
        None => println!("New project: {}", record.id),
    }
    print_units(&record);
    Ok(())
}

/// Change the directory or default file of a project.
pub fn modify(
    store: &Store,
    owner: &str,
    id: &str,
    data_dir: Option<&Path>,
    load_file: LoadFileChange,
) -> Result<()> {
    let id = parse_id(id)?;
    let changes = ProjectChanges {
        data_dir: data_dir.map(absolute).transpose()?,
        load_file,
    };
    let record = store.transact(|txn| projects::modify(txn, owner, &id, changes))?;

    println!("Modified project: {}", record.id);
    Ok(())
}

/// List the caller's projects, one per line.
pub fn list(store: &Store, owner: &str) -> Result<()> {
    let records = store.read(|txn| projects::list(txn, owner))?;

    if records.is_empty() {
        println!("You have no published projects");
        return Ok(());
    }
    for record in &records {
        println!("{}\t{}", record.id, record.data_dir.display());
    }
    Ok(())
}

/// Print one project.
pub fn show(store: &Store, owner: &str, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let record = store.read(|txn| projects::show(txn, owner, &id))?;

    println!("ID: {}", record.id);
    println!("Directory: {}", record.data_dir.display());
    match &record.load_file {
        Some(file) => println!("Default file:\t{}", file.display()),
        None => println!("No default file"),
    }
    if let Some(url) = project_link(store, &record.id) {
        println!("Link: {url}");
    }
    print_units(&record);
    Ok(())
}

/// Release a project's units and delete it.
pub fn unpublish(store: &Store, owner: &str, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let record = store.transact(|txn| projects::unpublish(txn, owner, &id))?;

    println!("Unpublished project: {}", record.id);
    Ok(())
}

fn project_link(store: &Store, id: &ProjectId) -> Option<String> {
    let servername = store.config().servername.as_deref()?;
    Some(projects::project_url(id, servername))
}

fn print_units(record: &ProjectRecord) {
    let spares: Vec<String> = record.port_ranges.iter().map(ToString::to_string).collect();
    println!("Port: {}", record.port);
    println!("Port ranges: {}", spares.join(" "));
}

fn parse_id(id: &str) -> Result<ProjectId> {
    ProjectId::parse(id).ok_or_else(|| anyhow!("Invalid project '{id}'"))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve directory {}", path.display()))
}
