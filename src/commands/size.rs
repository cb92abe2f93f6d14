use anyhow::Result;
use std::path::Path;
use tracing::debug;

use crate::cli::SizeArgs;
use cache_cleaner::cli_utils::format_size;
use cache_cleaner::eviction::{directory_size, LocalFs};
use cache_cleaner::logging::operations;

pub fn run(args: SizeArgs) -> Result<()> {
    let path = Path::new(&args.dir);
    if !path.is_dir() {
        anyhow::bail!("Not a directory: {}", args.dir);
    }

    let size = directory_size(&LocalFs, path);
    debug!(
        operation = operations::SIZE,
        path = %path.display(),
        size_bytes = size,
        "Measured directory"
    );

    if args.bytes {
        println!("{}", size);
    } else {
        println!("{} ({} bytes)\t{}", format_size(size), size, args.dir);
    }

    Ok(())
}
