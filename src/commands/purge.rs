use anyhow::Result;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

use crate::cli::PurgeArgs;
use cache_cleaner::cli_utils::{cleaner_prefix, format_size};
use cache_cleaner::eviction::{purge_accessible, LocalFs};
use cache_cleaner::logging::operations;

pub fn run(args: PurgeArgs) -> Result<()> {
    let path = Path::new(&args.dir);
    if !path.is_dir() {
        anyhow::bail!("Not a directory: {}", args.dir);
    }

    if !args.yes {
        print!("Delete everything inside {}? [y/N]: ", args.dir);
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().read_line(&mut response)?;

        if !response.trim().eq_ignore_ascii_case("y") {
            println!("{} Purge cancelled.", cleaner_prefix());
            return Ok(());
        }
    }

    let freed = purge_accessible(&LocalFs, path);
    info!(
        operation = operations::PURGE,
        path = %path.display(),
        bytes_removed = freed,
        "Purged directory"
    );

    println!(
        "{} Freed {} ({} bytes) from {}",
        cleaner_prefix(),
        format_size(freed),
        freed,
        args.dir
    );

    Ok(())
}
