// SPDX-License-Identifier: Apache-2.0

// Database Drivers

pub mod postgres;
pub(crate) mod postgres_utils;

pub use postgres::PostgresDriver;
