//! Data manager commands: backup, restore, reset.

use std::path::PathBuf;

use clap::Subcommand;
use reveille_core::Database;

#[derive(Subcommand)]
pub enum DataAction {
    /// Export every stored key as a JSON backup
    Export {
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a JSON backup, overwriting matching keys
    Import {
        /// Backup file
        file: PathBuf,
    },
    /// Delete all stored data
    Reset {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Show storage used
    Size,
}

pub fn run(action: DataAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;

    match action {
        DataAction::Export { out } => {
            let backup = db.export_backup()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, backup)?;
                    println!("Backup written: {}", path.display());
                }
                None => println!("{backup}"),
            }
        }
        DataAction::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let count = db.import_backup(&json)?;
            println!("Imported {count} keys");
        }
        DataAction::Reset { yes } => {
            if !yes {
                return Err("refusing to delete all data without --yes".into());
            }
            db.clear_all()?;
            println!("all data cleared");
        }
        DataAction::Size => {
            let bytes = db.size_bytes()?;
            println!("{:.2} KB", bytes as f64 / 1024.0);
        }
    }
    Ok(())
}
