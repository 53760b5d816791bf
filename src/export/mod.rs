// SPDX-License-Identifier: Apache-2.0

pub mod pipeline;
pub mod types;
pub mod writers;

pub use pipeline::{parse_csv_rows, parse_json_rows, ExportPipeline};
pub use types::*;
