use std::io::{self, Seek, SeekFrom};

/// One flush cycle's worth of rows, buffered in memory and serialized onto
/// an anonymous temporary file only when the flush actually fires (spec
/// §4.7). The file is created with `tempfile::tempfile`, which unlinks it
/// immediately on supported platforms: there is no path to clean up and the
/// space is reclaimed as soon as the handle is dropped, after COPY.
pub struct SpillFile {
    rows: Vec<Vec<String>>,
    bytes_buffered: u64,
}

impl SpillFile {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            bytes_buffered: 0,
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.bytes_buffered += row.iter().map(|v| v.len() as u64 + 1).sum::<u64>();
        self.rows.push(row);
    }

    pub fn bytes_buffered(&self) -> u64 {
        self.bytes_buffered
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Writes every buffered row as `\t`-delimited CSV (no header; the
    /// column list is carried separately in the `COPY` statement) on a
    /// worker thread, then rewinds the file for reading.
    pub async fn finalize(self) -> io::Result<tokio::fs::File> {
        let rows = self.rows;
        let std_file = tokio::task::spawn_blocking(move || -> io::Result<std::fs::File> {
            let mut file = tempfile::tempfile()?;
            {
                let mut writer = csv::WriterBuilder::new()
                    .delimiter(b'\t')
                    .has_headers(false)
                    .from_writer(&mut file);
                for row in &rows {
                    writer.write_record(row)?;
                }
                writer.flush()?;
            }
            file.seek(SeekFrom::Start(0))?;
            Ok(file)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        Ok(tokio::fs::File::from_std(std_file))
    }
}

impl Default for SpillFile {
    fn default() -> Self {
        Self::new()
    }
}
