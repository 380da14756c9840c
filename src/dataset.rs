use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::error::Result;

/// Serialize the feature table to Parquet, replacing any existing file.
/// Column types are preserved as-is and no index column is added.
pub fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    ParquetWriter::new(file).finish(df)?;

    info!("Wrote {} rows to {:?}", df.height(), path);
    Ok(())
}

/// Read a persisted feature table back; the dashboard side of the contract.
pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}
