// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use tablegate_core::Record;
use tokio::fs::File;
use tokio::io::BufWriter;

use crate::export::types::ExportFormat;

pub mod csv;
pub mod json;

#[async_trait]
pub trait ExportWriter: Send {
    async fn write_header(&mut self, columns: &[String]) -> std::io::Result<()>;
    async fn write_row(&mut self, columns: &[String], row: &Record) -> std::io::Result<()>;
    async fn finish(&mut self) -> std::io::Result<()>;
    fn bytes_written(&self) -> u64;
}

pub fn create_writer(format: ExportFormat, file: File) -> Box<dyn ExportWriter> {
    let writer = BufWriter::new(file);
    match format {
        ExportFormat::Csv => Box::new(csv::CsvWriter::new(writer)),
        ExportFormat::Json => Box::new(json::JsonWriter::new(writer)),
    }
}
