use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail, Result};
use toml::Value;

/// One table to migrate. Its position in the plan is its dependency rank.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    pub depends_on: Vec<String>,
}

/// Fields dropped from every row of a table before insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformRule {
    pub drop_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPatch {
    pub table: String,
    pub column: String,
    pub definition: String,
}

const SITE_TABLES: &[(&str, &[&str])] = &[
    ("users", &[]),
    ("settings", &[]),
    ("vip_tiers", &[]),
    ("vip_subscriptions", &["users", "vip_tiers"]),
    ("leagues", &[]),
    ("league_seasons", &["leagues"]),
    ("league_teams", &["league_seasons", "users"]),
    ("league_standings", &["league_seasons", "league_teams"]),
    ("forum_categories", &[]),
    ("forum_threads", &["forum_categories", "users"]),
    ("forum_posts", &["forum_threads", "users"]),
    ("chat_channels", &[]),
    ("chat_messages", &["chat_channels", "users"]),
    ("admin_audit_log", &["users"]),
];

#[derive(Debug, Clone)]
pub struct TablePlan {
    tables: Vec<TableSpec>,
    transform_rules: HashMap<String, TransformRule>,
    column_patches: Vec<ColumnPatch>,
}

impl TablePlan {
    pub fn new(
        tables: Vec<TableSpec>,
        transform_rules: HashMap<String, TransformRule>,
        column_patches: Vec<ColumnPatch>,
    ) -> Result<Self> {
        validate_order(&tables)?;

        Ok(TablePlan {
            tables,
            transform_rules,
            column_patches,
        })
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn transform_rule(&self, table: &str) -> Option<&TransformRule> {
        self.transform_rules.get(table)
    }

    pub fn column_patches(&self) -> &[ColumnPatch] {
        &self.column_patches
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Site tables in foreign-key order, with the known drift between the old
    /// and new schema versions.
    pub fn site_default() -> Self {
        let tables = SITE_TABLES
            .iter()
            .map(|(name, depends_on)| TableSpec {
                name: name.to_string(),
                depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            })
            .collect();

        let mut transform_rules = HashMap::new();
        transform_rules.insert(
            "users".to_string(),
            TransformRule {
                drop_fields: vec!["offline_time".to_string()],
            },
        );
        transform_rules.insert(
            "chat_messages".to_string(),
            TransformRule {
                drop_fields: vec!["legacy_room".to_string()],
            },
        );

        let column_patches = [
            ("users", "vip_level", "INTEGER NOT NULL DEFAULT 0"),
            ("users", "last_seen_at", "TIMESTAMPTZ"),
            ("forum_posts", "is_edited", "BOOLEAN NOT NULL DEFAULT FALSE"),
            ("chat_messages", "deleted", "BOOLEAN NOT NULL DEFAULT FALSE"),
        ]
        .iter()
        .map(|(table, column, definition)| ColumnPatch {
            table: table.to_string(),
            column: column.to_string(),
            definition: definition.to_string(),
        })
        .collect();

        TablePlan {
            tables,
            transform_rules,
            column_patches,
        }
    }

    /// Reads `[[tables]]` and `[[column_patches]]`. Falls back to the site
    /// defaults for whichever section is absent.
    pub(crate) fn from_toml(value: &Value) -> Result<Self> {
        let defaults = Self::site_default();

        let (tables, transform_rules) = match value.get("tables") {
            Some(tables) => parse_tables(tables)?,
            None => (defaults.tables, defaults.transform_rules),
        };

        let column_patches = match value.get("column_patches") {
            Some(patches) => parse_column_patches(patches)?,
            None => defaults.column_patches,
        };

        TablePlan::new(tables, transform_rules, column_patches)
    }
}

fn parse_tables(value: &Value) -> Result<(Vec<TableSpec>, HashMap<String, TransformRule>)> {
    let entries = value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid tables format, expected an array of tables"))?;

    let mut tables = Vec::with_capacity(entries.len());
    let mut transform_rules = HashMap::new();

    for entry in entries {
        let name = entry
            .get("name")
            .and_then(|value| value.as_str())
            .ok_or_else(|| anyhow!("Missing or invalid table name"))?
            .to_string();

        let depends_on = string_list(entry, "depends_on")
            .map_err(|err| anyhow!("Table {}: {}", name, err))?;
        let drop_fields = string_list(entry, "drop_fields")
            .map_err(|err| anyhow!("Table {}: {}", name, err))?;

        if !drop_fields.is_empty() {
            transform_rules.insert(name.clone(), TransformRule { drop_fields });
        }

        tables.push(TableSpec { name, depends_on });
    }

    Ok((tables, transform_rules))
}

fn parse_column_patches(value: &Value) -> Result<Vec<ColumnPatch>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid column_patches format, expected an array"))?
        .iter()
        .map(|entry| {
            let field = |key: &str| {
                entry
                    .get(key)
                    .and_then(|value| value.as_str())
                    .map(|value| value.to_string())
                    .ok_or_else(|| anyhow!("Missing or invalid column patch field '{}'", key))
            };

            Ok(ColumnPatch {
                table: field("table")?,
                column: field("column")?,
                definition: field("definition")?,
            })
        })
        .collect()
}

fn string_list(entry: &Value, key: &str) -> Result<Vec<String>> {
    match entry.get(key) {
        None => Ok(Vec::new()),
        Some(value) => value
            .as_array()
            .ok_or_else(|| anyhow!("'{}' must be an array of strings", key))?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| anyhow!("'{}' must be an array of strings", key))
            })
            .collect(),
    }
}

/// Every dependency must name a known table listed earlier in the plan.
fn validate_order(tables: &[TableSpec]) -> Result<()> {
    let known: HashSet<&str> = tables.iter().map(|table| table.name.as_str()).collect();
    let mut seen = HashSet::new();

    for table in tables {
        if !seen.insert(table.name.as_str()) {
            bail!("Table {} is listed more than once", table.name);
        }

        for dependency in &table.depends_on {
            if !known.contains(dependency.as_str()) {
                bail!(
                    "Table {} depends on unknown table {}",
                    table.name,
                    dependency
                );
            }
            if !seen.contains(dependency.as_str()) {
                bail!(
                    "Table {} is listed before its dependency {}",
                    table.name,
                    dependency
                );
            }
        }
    }

    Ok(())
}
