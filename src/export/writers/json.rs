// SPDX-License-Identifier: Apache-2.0

use tablegate_core::Record;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::export::writers::ExportWriter;

/// Writes a JSON array, one object per line
pub struct JsonWriter {
    writer: BufWriter<File>,
    bytes_written: u64,
    started: bool,
    rows_written: u64,
}

impl JsonWriter {
    pub fn new(writer: BufWriter<File>) -> Self {
        Self {
            writer,
            bytes_written: 0,
            started: false,
            rows_written: 0,
        }
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    async fn ensure_started(&mut self) -> std::io::Result<()> {
        if !self.started {
            self.write_bytes(b"[\n").await?;
            self.started = true;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ExportWriter for JsonWriter {
    async fn write_header(&mut self, _columns: &[String]) -> std::io::Result<()> {
        self.ensure_started().await
    }

    async fn write_row(&mut self, columns: &[String], row: &Record) -> std::io::Result<()> {
        self.ensure_started().await?;

        let projected: Record = if columns.is_empty() {
            row.clone()
        } else {
            columns
                .iter()
                .map(|col| (col.clone(), row.get(col).cloned().unwrap_or_default()))
                .collect()
        };
        let serialized = serde_json::to_vec(&projected)?;

        if self.rows_written > 0 {
            self.write_bytes(b",\n").await?;
        }
        self.write_bytes(&serialized).await?;
        self.rows_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> std::io::Result<()> {
        if !self.started {
            self.write_bytes(b"[]\n").await?;
            return self.writer.flush().await;
        }
        if self.rows_written > 0 {
            self.write_bytes(b"\n").await?;
        }
        self.write_bytes(b"]\n").await?;
        self.writer.flush().await
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}
