use std::path::Path;

use crate::embedding::ImageEmbedding;
use crate::error::{EmbedError, Result};

/// One comma-separated row per embedding, no header
pub fn write_csv(path: &Path, vectors: &[ImageEmbedding]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| csv_err(path, e))?;

    for row in vectors {
        wtr.write_record(row.iter().map(|v| v.to_string()))
            .map_err(|e| csv_err(path, e))?;
    }

    wtr.flush()?;
    Ok(())
}

/// Unparsable values are an error rather than being read as zero
pub fn read_csv(path: &Path) -> Result<Vec<ImageEmbedding>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_err(path, e))?;

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| csv_err(path, e))?;
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f32>().map_err(|e| {
                    EmbedError::Store(format!(
                        "{} row {}: invalid value '{}': {}",
                        path.display(),
                        line + 1,
                        field,
                        e
                    ))
                })
            })
            .collect::<Result<ImageEmbedding>>()?;
        rows.push(row);
    }

    Ok(rows)
}

fn csv_err(path: &Path, e: csv::Error) -> EmbedError {
    EmbedError::Store(format!("{}: {}", path.display(), e))
}
