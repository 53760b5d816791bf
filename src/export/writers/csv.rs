// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;
use tablegate_core::Record;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::export::writers::ExportWriter;

pub struct CsvWriter {
    writer: BufWriter<File>,
    header_written: bool,
    bytes_written: u64,
}

impl CsvWriter {
    pub fn new(writer: BufWriter<File>) -> Self {
        Self {
            writer,
            header_written: false,
            bytes_written: 0,
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.bytes_written += line.len() as u64 + 1;
        Ok(())
    }

    fn escape_csv(value: &str) -> String {
        if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    /// Scalars as text, nulls empty, arrays and objects as compact JSON.
    pub(crate) fn format_value(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => value.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ExportWriter for CsvWriter {
    async fn write_header(&mut self, columns: &[String]) -> std::io::Result<()> {
        if self.header_written || columns.is_empty() {
            return Ok(());
        }
        let header = columns
            .iter()
            .map(|col| Self::escape_csv(col))
            .collect::<Vec<_>>()
            .join(",");
        self.write_line(&header).await?;
        self.header_written = true;
        Ok(())
    }

    async fn write_row(&mut self, columns: &[String], row: &Record) -> std::io::Result<()> {
        let line = columns
            .iter()
            .map(|col| Self::escape_csv(&Self::format_value(row.get(col).unwrap_or(&Value::Null))))
            .collect::<Vec<_>>()
            .join(",");
        self.write_line(&line).await
    }

    async fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush().await
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_are_escaped_for_csv() {
        assert_eq!(CsvWriter::escape_csv("plain"), "plain");
        assert_eq!(CsvWriter::escape_csv("a,b"), "\"a,b\"");
        assert_eq!(CsvWriter::escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(CsvWriter::format_value(&Value::Null), "");
        assert_eq!(CsvWriter::format_value(&json!({"k": 1})), "{\"k\":1}");
    }
}
