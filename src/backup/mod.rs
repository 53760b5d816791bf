// SPDX-License-Identifier: Apache-2.0

pub mod manager;
pub mod manifest;
pub mod process;
pub mod types;

pub use manager::BackupManager;
pub use process::{ProcessOutput, ProcessRunner, ProcessSpec, TokioProcessRunner};
pub use types::*;
