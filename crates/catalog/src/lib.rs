use std::{fs, path::Path};

use ahash::RandomState;
use common::{ColumnId, DbError, DbResult, TableId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use types::TypeSpec;
use uuid::Uuid;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Unique identifier for an index definition stored in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexId(pub u64);

/// Unique identifier for a view definition stored in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewId(pub u64);

/// Outcome of a `CREATE TABLE`/`CREATE INDEX`/`CREATE VIEW` call that tolerates
/// `IF NOT EXISTS`: the analyser needs to distinguish "nothing happened
/// because it's already there" from a real creation, without treating the
/// former as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome<T> {
    Created(T),
    AlreadyExists,
}

/// Outcome of a `DROP ...` call that tolerates `IF EXISTS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    DidNotExist,
}

/// Persistent catalog that stores table schemas, index metadata and views.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    views: Vec<ViewMeta>,
    next_table_id: u64,
    next_index_id: u64,
    next_view_id: u64,
    #[serde(skip)]
    #[serde(default)]
    table_name_index: Map<String, usize>,
    #[serde(skip)]
    #[serde(default)]
    table_id_index: Map<TableId, usize>,
    #[serde(skip)]
    #[serde(default)]
    view_name_index: Map<String, usize>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        let mut catalog = Self {
            tables: Vec::new(),
            views: Vec::new(),
            next_table_id: 1,
            next_index_id: 1,
            next_view_id: 1,
            table_name_index: Map::default(),
            table_id_index: Map::default(),
            view_name_index: Map::default(),
        };
        catalog.rebuild_indexes();
        catalog
    }

    /// Load a catalog from disk, returning an empty catalog if the file does not exist.
    pub fn load(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)?;
        let mut catalog: Catalog = serde_json::from_str(&data)
            .map_err(|err| DbError::Catalog(format!("invalid catalog file: {err}")))?;
        catalog.rebuild_indexes();
        Ok(catalog)
    }

    /// Persist the catalog contents as pretty JSON.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| DbError::Catalog(format!("serialize failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Returns an immutable reference to a table by name.
    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        self.tables
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))
    }

    /// Returns an immutable reference to a table by identifier.
    pub fn table_by_id(&self, id: TableId) -> DbResult<&TableMeta> {
        let idx = self
            .table_id_index
            .get(&id)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", id.0)))?;
        self.tables
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", id.0)))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.table_name_index.contains_key(name)
    }

    /// Create a new table with the provided columns and primary key.
    ///
    /// Duplicate creation is reported via [`CreateOutcome::AlreadyExists`]
    /// rather than an error so callers honouring `IF NOT EXISTS` can treat it
    /// as a no-op; malformed schemas (empty column list, duplicate column
    /// names, unknown primary-key column) remain hard errors.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<Column>,
        primary_key: Vec<String>,
    ) -> DbResult<CreateOutcome<TableId>> {
        if self.table_name_index.contains_key(name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let schema = TableSchema::try_new(columns)?;
        let mut pk_ordinals = Vec::with_capacity(primary_key.len());
        for col_name in &primary_key {
            let ordinal = schema.column_index(col_name).ok_or_else(|| {
                DbError::Catalog(format!(
                    "primary key references unknown column '{col_name}' on table '{name}'"
                ))
            })?;
            pk_ordinals.push(ordinal);
        }
        let table_id = TableId(self.next_table_id);
        self.next_table_id += 1;
        let table = TableMeta::new(table_id, name.to_string(), schema, pk_ordinals);
        self.tables.push(table);
        self.rebuild_indexes();
        Ok(CreateOutcome::Created(table_id))
    }

    /// Remove a table and its associated indexes.
    ///
    /// Returns [`DropOutcome::DidNotExist`] (not an error) when the table is
    /// absent, so `DROP TABLE IF EXISTS` is a pure no-op. Dropping a table
    /// that a view still depends on is rejected unless `cascade` is set, in
    /// which case dependent views are dropped too.
    pub fn drop_table(&mut self, name: &str, cascade: bool) -> DbResult<DropOutcome> {
        let Some(idx) = self.table_name_index.get(name).copied() else {
            return Ok(DropOutcome::DidNotExist);
        };
        let dependents: Vec<String> = self
            .views
            .iter()
            .filter(|v| v.depends_on.iter().any(|t| t == name))
            .map(|v| v.name.clone())
            .collect();
        if !dependents.is_empty() {
            if !cascade {
                return Err(DbError::Catalog(format!(
                    "table '{name}' is referenced by view(s) {dependents:?}; use CASCADE to drop them too"
                )));
            }
            for view_name in &dependents {
                self.drop_view(view_name, false)?;
            }
        }
        self.tables.remove(idx);
        self.rebuild_indexes();
        Ok(DropOutcome::Dropped)
    }

    /// Register a view over a single-level query. Views that reference
    /// another view are rejected: this catalog resolves view dependencies
    /// one level deep only (see the design notes on nested views).
    pub fn create_view(
        &mut self,
        name: &str,
        query_text: &str,
        depends_on: Vec<String>,
    ) -> DbResult<CreateOutcome<ViewId>> {
        if self.view_name_index.contains_key(name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        for dep in &depends_on {
            if self.view_name_index.contains_key(dep) {
                return Err(DbError::Catalog(format!(
                    "view '{name}' references view '{dep}'; nested views are not supported"
                )));
            }
            if !self.table_name_index.contains_key(dep) {
                return Err(DbError::Catalog(format!(
                    "view '{name}' references unknown table '{dep}'"
                )));
            }
        }
        let view_id = ViewId(self.next_view_id);
        self.next_view_id += 1;
        self.views.push(ViewMeta {
            id: view_id,
            name: name.to_string(),
            query_text: query_text.to_string(),
            depends_on,
        });
        self.rebuild_indexes();
        Ok(CreateOutcome::Created(view_id))
    }

    pub fn drop_view(&mut self, name: &str, _cascade: bool) -> DbResult<DropOutcome> {
        let Some(idx) = self.view_name_index.get(name).copied() else {
            return Ok(DropOutcome::DidNotExist);
        };
        self.views.remove(idx);
        self.rebuild_indexes();
        Ok(DropOutcome::Dropped)
    }

    pub fn view(&self, name: &str) -> DbResult<&ViewMeta> {
        let idx = self
            .view_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown view '{name}'")))?;
        self.views
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("unknown view '{name}'")))
    }

    pub fn view_exists(&self, name: &str) -> bool {
        self.view_name_index.contains_key(name)
    }

    /// Create an index over the given table columns, returning its identifier.
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        columns: &[&str],
        kind: IndexKind,
        unique: bool,
    ) -> DbResult<IndexId> {
        if columns.is_empty() {
            return Err(DbError::Catalog(
                "index must reference at least one column".into(),
            ));
        }
        let resolved = {
            let table = self.table(table_name)?;
            let mut resolved = Vec::with_capacity(columns.len());
            for name in columns {
                let ordinal = table.schema.column_index(name).ok_or_else(|| {
                    DbError::Catalog(format!("unknown column '{name}' on table '{table_name}'"))
                })?;
                resolved.push(ordinal);
            }
            resolved
        };
        let index_id = IndexId(self.next_index_id);
        self.next_index_id += 1;
        let table = self.table_mut(table_name)?;
        table.add_index(IndexMeta {
            id: index_id,
            name: index_name.to_string(),
            columns: resolved,
            kind,
            unique,
            storage: StorageDescriptor::new(),
        })?;
        Ok(index_id)
    }

    /// Drop an index attached to a table.
    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> DbResult<()> {
        let table = self.table_mut(table_name)?;
        table.remove_index(index_name)
    }

    /// Finds the index on `table_name` best suited to answer a predicate
    /// over `predicate_columns` (in the order the predicate mentions them).
    ///
    /// Scoring favours, in order: the longest prefix of `predicate_columns`
    /// the index covers starting from its own first column, whether the
    /// index is unique, and (as a tiebreak) the narrowest index — fewer
    /// columns is preferred once prefix coverage and uniqueness tie, since a
    /// narrower index is cheaper to scan.
    pub fn find_best_index(&self, table_name: &str, predicate_columns: &[ColumnId]) -> Option<&IndexMeta> {
        let table = self.table(table_name).ok()?;
        table
            .indexes
            .iter()
            .map(|idx| (index_prefix_match(idx, predicate_columns), idx))
            .filter(|(prefix, _)| *prefix > 0)
            .max_by(|(prefix_a, idx_a), (prefix_b, idx_b)| {
                prefix_a
                    .cmp(prefix_b)
                    .then(idx_a.unique.cmp(&idx_b.unique))
                    .then(idx_b.columns.len().cmp(&idx_a.columns.len()))
            })
            .map(|(_, idx)| idx)
    }

    /// Immutable iterator over all tables.
    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewMeta> {
        self.views.iter()
    }

    pub fn table_mut(&mut self, name: &str) -> DbResult<&mut TableMeta> {
        let id = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        self.tables
            .get_mut(id)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))
    }

    /// Adjusts the table's row-count hint used for cost estimation, clamped
    /// at zero so repeated deletes cannot drive it negative.
    pub fn update_row_count(&mut self, table_name: &str, delta: i64) -> DbResult<()> {
        let table = self.table_mut(table_name)?;
        table.row_count_hint = (table.row_count_hint + delta).max(0);
        Ok(())
    }

    fn rebuild_indexes(&mut self) {
        self.table_name_index.clear();
        self.table_id_index.clear();
        self.view_name_index.clear();
        for (idx, table) in self.tables.iter_mut().enumerate() {
            self.table_name_index.insert(table.name.clone(), idx);
            self.table_id_index.insert(table.id, idx);
            table.rebuild_index_lookup();
        }
        for (idx, view) in self.views.iter().enumerate() {
            self.view_name_index.insert(view.name.clone(), idx);
        }
    }
}

/// Length of the prefix of `predicate_columns`, counted from the start, that
/// matches `index`'s own column order from its own start. Zero means the
/// index is useless for this predicate.
fn index_prefix_match(index: &IndexMeta, predicate_columns: &[ColumnId]) -> usize {
    index
        .columns
        .iter()
        .zip(predicate_columns.iter())
        .take_while(|(a, b)| a == b)
        .count()
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata describing a registered table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub schema: TableSchema,
    pub primary_key: Vec<ColumnId>,
    pub row_count_hint: i64,
    pub storage: StorageDescriptor,
    pub indexes: Vec<IndexMeta>,
    #[serde(skip)]
    #[serde(default)]
    index_name_lookup: Map<String, usize>,
    #[serde(skip)]
    #[serde(default)]
    index_id_lookup: Map<IndexId, usize>,
}

impl TableMeta {
    fn new(id: TableId, name: String, schema: TableSchema, primary_key: Vec<ColumnId>) -> Self {
        let mut table = Self {
            id,
            name,
            schema,
            primary_key,
            row_count_hint: 0,
            storage: StorageDescriptor::new(),
            indexes: Vec::new(),
            index_name_lookup: Map::default(),
            index_id_lookup: Map::default(),
        };
        table.rebuild_index_lookup();
        table
    }

    fn add_index(&mut self, index: IndexMeta) -> DbResult<()> {
        if self.index_name_lookup.contains_key(&index.name) {
            return Err(DbError::Catalog(format!(
                "index '{}' already exists on table '{}'",
                index.name, self.name
            )));
        }
        self.indexes.push(index);
        self.rebuild_index_lookup();
        Ok(())
    }

    fn remove_index(&mut self, index_name: &str) -> DbResult<()> {
        let idx = self
            .index_name_lookup
            .get(index_name)
            .copied()
            .ok_or_else(|| {
                DbError::Catalog(format!(
                    "index '{index_name}' does not exist on table '{}'",
                    self.name
                ))
            })?;
        self.indexes.remove(idx);
        self.rebuild_index_lookup();
        Ok(())
    }

    /// Lookup an index by name.
    pub fn index(&self, name: &str) -> DbResult<&IndexMeta> {
        let idx = self.index_name_lookup.get(name).copied().ok_or_else(|| {
            DbError::Catalog(format!(
                "index '{name}' does not exist on table '{}'",
                self.name
            ))
        })?;
        self.indexes
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("index '{name}' missing on '{}'", self.name)))
    }

    /// Lookup an index by identifier.
    pub fn index_by_id(&self, id: IndexId) -> DbResult<&IndexMeta> {
        let idx = self.index_id_lookup.get(&id).copied().ok_or_else(|| {
            DbError::Catalog(format!("unknown index id {} on '{}'", id.0, self.name))
        })?;
        self.indexes.get(idx).ok_or_else(|| {
            DbError::Catalog(format!(
                "index id {} missing in table '{}'",
                id.0, self.name
            ))
        })
    }

    /// Returns true if an index with the provided name exists.
    pub fn has_index(&self, index_name: &str) -> bool {
        self.index_name_lookup.contains_key(index_name)
    }

    /// Returns all indexes defined on this table.
    pub fn indexes(&self) -> &[IndexMeta] {
        &self.indexes
    }

    fn rebuild_index_lookup(&mut self) {
        self.index_name_lookup.clear();
        self.index_id_lookup.clear();
        for (idx, index) in self.indexes.iter().enumerate() {
            self.index_name_lookup.insert(index.name.clone(), idx);
            self.index_id_lookup.insert(index.id, idx);
        }
    }
}

/// Column layout for a table, along with helpful lookup structures.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    pub name_to_ordinal: Map<String, ColumnId>,
}

impl TableSchema {
    pub fn try_new(columns: Vec<Column>) -> DbResult<Self> {
        if columns.is_empty() {
            return Err(DbError::Catalog(
                "table must contain at least one column".into(),
            ));
        }
        if columns.len() > u16::MAX as usize {
            return Err(DbError::Catalog(
                "too many columns for a single table".into(),
            ));
        }
        let mut name_to_ordinal = Map::default();
        for (idx, column) in columns.iter().enumerate() {
            let ordinal = idx as ColumnId;
            if name_to_ordinal
                .insert(column.name.clone(), ordinal)
                .is_some()
            {
                return Err(DbError::Catalog(format!(
                    "duplicate column '{}' found while building schema",
                    column.name
                )));
            }
        }
        Ok(Self {
            columns,
            name_to_ordinal,
        })
    }

    /// Returns the ordinal for a column name.
    pub fn column_index(&self, name: &str) -> Option<ColumnId> {
        self.name_to_ordinal.get(name).copied()
    }

    /// Returns the declared type for the provided ordinal.
    pub fn column_type(&self, ordinal: ColumnId) -> Option<&TypeSpec> {
        self.columns.get(ordinal as usize).map(|c| &c.ty)
    }
}

/// Per-column constraints beyond the declared type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnConstraint {
    PrimaryKey,
    NotNull,
}

/// Describes a logical column within a table schema.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: TypeSpec,
    pub constraints: Vec<ColumnConstraint>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty,
            constraints: Vec::new(),
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<ColumnConstraint>) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Metadata describing a table index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexMeta {
    pub id: IndexId,
    pub name: String,
    pub columns: Vec<ColumnId>,
    pub kind: IndexKind,
    pub unique: bool,
    pub storage: StorageDescriptor,
}

/// Supported index implementations.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndexKind {
    BTree,
    Hash,
}

/// A named, single-level query over existing tables.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewMeta {
    pub id: ViewId,
    pub name: String,
    pub query_text: String,
    pub depends_on: Vec<String>,
}

/// Links catalog entries to physical storage artifacts, such as heap files.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageDescriptor {
    pub file_id: Uuid,
}

impl StorageDescriptor {
    pub fn new() -> Self {
        Self {
            file_id: Uuid::new_v4(),
        }
    }
}

impl Default for StorageDescriptor {
    fn default() -> Self {
        Self::new()
    }
}
