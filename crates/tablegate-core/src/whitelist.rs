// SPDX-License-Identifier: Apache-2.0

//! Table and column whitelist
//!
//! The registry is the only source of table and column names that may
//! reach SQL text. Lookups fail closed: an absent table is a hard denial.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{AdminError, AdminResult};

pub const DEFAULT_PRIMARY_KEY: &str = "id";
pub const SOFT_DELETE_COLUMN: &str = "deleted_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const CREATED_AT_COLUMN: &str = "created_at";

/// Columns of the audit table written by the audit logger.
pub const AUDIT_COLUMNS: [&str; 11] = [
    "id",
    "timestamp",
    "operation",
    "table_name",
    "record_id",
    "user_id",
    "changes",
    "success",
    "error_message",
    "execution_time_ms",
    "query_hash",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Read,
    Write,
    Delete,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableCategory {
    #[default]
    Standard,
    ReadOnly,
    Restricted,
    AdminOnly,
}

/// Access policy and column list for one table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePolicy {
    pub name: String,
    pub columns: Vec<String>,
    pub permissions: BTreeSet<Permission>,
    pub category: TableCategory,
    pub soft_delete: bool,
    pub primary_key: String,
}

impl TablePolicy {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let soft_delete = columns.iter().any(|c| c == SOFT_DELETE_COLUMN);
        Self {
            name: name.into(),
            columns,
            permissions: [Permission::Read, Permission::Write, Permission::Delete]
                .into_iter()
                .collect(),
            category: TableCategory::Standard,
            soft_delete,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    pub fn with_category(mut self, category: TableCategory) -> Self {
        self.category = category;
        if category == TableCategory::ReadOnly {
            self.permissions.remove(&Permission::Write);
            self.permissions.remove(&Permission::Delete);
        }
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// First timestamp column usable for change tracking.
    pub fn change_tracking_column(&self) -> Option<&'static str> {
        if self.has_column(UPDATED_AT_COLUMN) {
            Some(UPDATED_AT_COLUMN)
        } else if self.has_column(CREATED_AT_COLUMN) {
            Some(CREATED_AT_COLUMN)
        } else {
            None
        }
    }
}

/// On-disk shape of a whitelist entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TablePolicyFile {
    columns: Vec<String>,
    #[serde(default = "default_permissions")]
    permissions: BTreeSet<Permission>,
    #[serde(default)]
    category: TableCategory,
    #[serde(default)]
    soft_delete: Option<bool>,
    #[serde(default)]
    primary_key: Option<String>,
}

fn default_permissions() -> BTreeSet<Permission> {
    [Permission::Read, Permission::Write, Permission::Delete]
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
struct WhitelistFile {
    tables: BTreeMap<String, TablePolicyFile>,
}

/// Registry of allowed tables
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    tables: BTreeMap<String, TablePolicy>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, policy: TablePolicy) -> AdminResult<()> {
        check_identifier(&policy.name)?;
        for column in &policy.columns {
            check_identifier(column)?;
        }
        if !policy.has_column(&policy.primary_key) {
            return Err(AdminError::validation(format!(
                "Primary key '{}' of '{}' is not a whitelisted column",
                policy.primary_key, policy.name
            )));
        }
        self.tables.insert(policy.name.clone(), policy);
        Ok(())
    }

    /// Parses a whitelist document of the form `{"tables": {name: {...}}}`.
    pub fn from_json(json: &str) -> AdminResult<Self> {
        let file: WhitelistFile = serde_json::from_str(json)?;
        let mut whitelist = Whitelist::new();

        for (name, entry) in file.tables {
            let has_deleted_at = entry.columns.iter().any(|c| c == SOFT_DELETE_COLUMN);
            let mut policy = TablePolicy {
                name,
                columns: entry.columns,
                permissions: entry.permissions,
                category: entry.category,
                soft_delete: has_deleted_at && entry.soft_delete.unwrap_or(true),
                primary_key: entry
                    .primary_key
                    .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string()),
            };
            if policy.category == TableCategory::ReadOnly {
                policy.permissions.remove(&Permission::Write);
                policy.permissions.remove(&Permission::Delete);
            }
            whitelist.insert(policy)?;
        }

        Ok(whitelist)
    }

    /// Default registry for the writing-planner schema.
    pub fn builtin() -> Self {
        let policies = [
            TablePolicy::new(
                "series",
                &[
                    "id", "title", "description", "genre", "status", "author_id",
                    "book_count", "created_at", "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new(
                "authors",
                &[
                    "id", "name", "pen_name", "email", "website_url", "bio", "created_at",
                    "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new(
                "books",
                &[
                    "id", "series_id", "author_id", "title", "subtitle", "book_number",
                    "genre", "status", "word_count", "target_word_count", "synopsis", "published_at",
                    "created_at", "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new(
                "chapters",
                &[
                    "id", "book_id", "chapter_number", "title", "summary", "content",
                    "word_count", "status", "created_at", "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new(
                "characters",
                &[
                    "id", "series_id", "name", "role", "description", "traits",
                    "first_appearance_book_id", "created_at", "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new(
                "scenes",
                &[
                    "id", "chapter_id", "scene_number", "title", "summary", "location_id",
                    "pov_character_id", "word_count", "created_at", "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new(
                "plot_threads",
                &[
                    "id", "series_id", "title", "description", "status", "introduced_book_id",
                    "resolved_book_id", "created_at", "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new(
                "timeline_events",
                &[
                    "id", "series_id", "book_id", "title", "description", "event_date",
                    "sequence_number", "created_at", "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new(
                "locations",
                &[
                    "id", "series_id", "name", "description", "region", "map_url",
                    "created_at", "updated_at", "deleted_at",
                ],
            ),
            TablePolicy::new("audit_logs", &AUDIT_COLUMNS).with_category(TableCategory::AdminOnly),
        ];

        Self {
            tables: policies
                .into_iter()
                .map(|policy| (policy.name.clone(), policy))
                .collect(),
        }
    }

    pub fn get(&self, table: &str) -> Option<&TablePolicy> {
        self.tables.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TablePolicy> {
        self.tables.values()
    }

    pub fn validate_table(&self, table: &str) -> AdminResult<&TablePolicy> {
        self.tables
            .get(table)
            .ok_or_else(|| AdminError::not_whitelisted(table))
    }

    pub fn validate_column(&self, table: &str, column: &str) -> AdminResult<()> {
        let policy = self.validate_table(table)?;
        if policy.has_column(column) {
            Ok(())
        } else {
            Err(AdminError::invalid_column(table, column))
        }
    }

    pub fn validate_columns<'a, I>(&self, table: &str, columns: I) -> AdminResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let policy = self.validate_table(table)?;
        for column in columns {
            if !policy.has_column(column) {
                return Err(AdminError::invalid_column(table, column));
            }
        }
        Ok(())
    }
}

/// Lowercase SQL identifiers only; quoting downstream is a second line.
fn check_identifier(name: &str) -> AdminResult<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_start && valid_rest && name.len() <= 63 {
        Ok(())
    } else {
        Err(AdminError::validation(format!(
            "'{}' is not a valid whitelist identifier",
            name
        )))
    }
}
