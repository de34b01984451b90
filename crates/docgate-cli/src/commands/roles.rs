//! Roles command

use crate::app::{OutputFormat, RolesArgs};
use crate::output::terminal;
use anyhow::Result;
use docgate_core::Config;

pub fn run(args: RolesArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let resolver = super::load_resolver(config)?;
    let table = resolver.table();

    if args.list {
        match format {
            OutputFormat::Json => {
                let roles: Vec<&str> = table.role_names().collect();
                let output = serde_json::json!({
                    "roles": roles,
                    "aliases": table.aliases(),
                    "departments": table.departments(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Cli => {
                println!("Roles:");
                for role in table.role_names() {
                    println!("  {}", role);
                }
                if !table.aliases().is_empty() {
                    println!();
                    println!("Aliases:");
                    for (alias, role) in table.aliases() {
                        println!("  {:<18} -> {}", alias, role);
                    }
                }
            }
        }
        return Ok(());
    }

    let Some(role) = args.role else {
        return Ok(());
    };
    let description = resolver.describe(&role);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&description)?),
        OutputFormat::Cli => print!("{}", terminal::format_role(&description)),
    }
    Ok(())
}
