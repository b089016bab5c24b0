//! Compiled statements and the cursors they hand out.
//!
//! A [`PreparedStatement`] owns its bindings for its whole life: they are
//! encoded once at compile time and bound verbatim on every execution.
//! Executing yields a [`Cursor`] that has already taken its first step, so
//! the first row (if any) is available immediately.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use fallible_streaming_iterator::FallibleStreamingIterator;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Batch, CachedStatement, Connection, Row, Rows, Statement};
use serde::Serialize;

use crate::codec::{self, ColumnDecoder, KeyedRow};
use crate::config::BoolEncoding;
use crate::error::{CodecError, Error, Result, StatementError};

// ============================================================================
// ColumnMap
// ============================================================================

/// Result column names of one compiled statement, fixed at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ColumnMap {
    fn from_statement(stmt: &Statement<'_>) -> Self {
        Self::new(stmt.column_names().into_iter().map(str::to_owned).collect())
    }

    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // `SELECT a.id, b.id` yields two `id` columns; the first one wins.
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Column names in result order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, key: &str) -> Result<usize> {
        self.index.get(key).copied().ok_or_else(|| {
            Error::Codec(CodecError::SchemaMismatch {
                key: key.to_string(),
                query: String::new(),
            })
        })
    }
}

// ============================================================================
// PreparedStatement
// ============================================================================

/// Who finalizes the underlying engine statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Finalized when the wrapper drops.
    Owned,
    /// Returned to the connection's statement cache when the wrapper drops.
    Cached,
}

enum Handle<'c> {
    Owned(Statement<'c>),
    Cached(CachedStatement<'c>),
}

impl<'c> Deref for Handle<'c> {
    type Target = Statement<'c>;

    fn deref(&self) -> &Statement<'c> {
        match self {
            Handle::Owned(stmt) => stmt,
            Handle::Cached(stmt) => stmt,
        }
    }
}

impl<'c> DerefMut for Handle<'c> {
    fn deref_mut(&mut self) -> &mut Statement<'c> {
        match self {
            Handle::Owned(stmt) => stmt,
            Handle::Cached(stmt) => stmt,
        }
    }
}

/// Compile the one statement in `sql`.
///
/// Trailing SQL after it is refused, since only the first statement would
/// ever run. Whitespace, comments and a final `;` are fine.
pub(crate) fn prepare_single<'c>(conn: &'c Connection, sql: &str) -> Result<Statement<'c>> {
    let compile_error = |source: rusqlite::Error| StatementError::Compile {
        sql: sql.to_string(),
        source,
    };
    let mut batch = Batch::new(conn, sql);
    let Some(stmt) = batch.next().map_err(compile_error)? else {
        // Nothing but whitespace or comments: an empty statement.
        return conn.prepare(sql).map_err(|source| compile_error(source).into());
    };
    match batch.next() {
        Ok(None) => Ok(stmt),
        Ok(Some(_)) | Err(_) => Err(compile_error(rusqlite::Error::MultipleStatement).into()),
    }
}

pub struct PreparedStatement<'c> {
    handle: Handle<'c>,
    sql: String,
    columns: ColumnMap,
    bindings: Vec<SqlValue>,
}

impl<'c> PreparedStatement<'c> {
    /// Compile `sql` and encode `params` into its positional slots.
    pub fn compile<P: Serialize + ?Sized>(
        conn: &'c Connection,
        sql: &str,
        params: &P,
        bools: BoolEncoding,
    ) -> Result<Self> {
        let stmt = prepare_single(conn, sql)?;
        let bindings = codec::encode_params(params, stmt.parameter_count(), sql, bools)?;
        Ok(Self::new(Handle::Owned(stmt), sql, bindings))
    }

    /// Take `sql` from the connection's statement cache and bind the already
    /// encoded `bindings` to it.
    pub fn compile_cached(conn: &'c Connection, sql: &str, bindings: Vec<SqlValue>) -> Result<Self> {
        let stmt = conn.prepare_cached(sql).map_err(|source| StatementError::Compile {
            sql: sql.to_string(),
            source,
        })?;
        if stmt.parameter_count() != bindings.len() {
            return Err(StatementError::ParameterCount {
                sql: sql.to_string(),
                expected: stmt.parameter_count(),
                actual: bindings.len(),
            }
            .into());
        }
        Ok(Self::new(Handle::Cached(stmt), sql, bindings))
    }

    fn new(handle: Handle<'c>, sql: &str, bindings: Vec<SqlValue>) -> Self {
        let columns = ColumnMap::from_statement(&handle);
        Self {
            handle,
            sql: sql.to_string(),
            columns,
            bindings,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn bindings(&self) -> &[SqlValue] {
        &self.bindings
    }

    pub fn ownership(&self) -> Ownership {
        match self.handle {
            Handle::Owned(_) => Ownership::Owned,
            Handle::Cached(_) => Ownership::Cached,
        }
    }

    /// Bind and take the first step.
    pub fn execute(&mut self) -> Result<Cursor<'_>> {
        self.run(false)
    }

    /// Rewind, rebind the same values and take the first step again.
    ///
    /// Any cursor from an earlier execution has already been dropped (the
    /// borrow checker guarantees it), which resets the engine statement.
    pub fn reset(&mut self) -> Result<Cursor<'_>> {
        self.run(true)
    }

    fn run(&mut self, rerun: bool) -> Result<Cursor<'_>> {
        let sql = self.sql.as_str();
        let fail = |source: rusqlite::Error| -> Error {
            let sql = sql.to_string();
            if rerun {
                StatementError::Reset { sql, source }.into()
            } else {
                StatementError::Step { sql, source }.into()
            }
        };

        for (i, value) in self.bindings.iter().enumerate() {
            self.handle.raw_bind_parameter(i + 1, value).map_err(fail)?;
        }
        let mut rows = self.handle.raw_query();
        rows.advance().map_err(fail)?;
        let state = CursorState::of(&rows);
        Ok(Cursor {
            rows,
            columns: &self.columns,
            sql,
            state,
        })
    }
}

impl std::fmt::Debug for PreparedStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .field("ownership", &self.ownership())
            .field("columns", &self.columns)
            .finish()
    }
}

// ============================================================================
// Cursor
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// The last step produced a row.
    HasRow,
    /// The engine reported completion.
    Done,
}

impl CursorState {
    fn of(rows: &Rows<'_>) -> Self {
        if rows.get().is_some() {
            CursorState::HasRow
        } else {
            CursorState::Done
        }
    }
}

/// One execution of a [`PreparedStatement`].
pub struct Cursor<'s> {
    rows: Rows<'s>,
    columns: &'s ColumnMap,
    sql: &'s str,
    state: CursorState,
}

impl<'s> Cursor<'s> {
    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn columns(&self) -> &'s ColumnMap {
        self.columns
    }

    pub fn sql(&self) -> &'s str {
        self.sql
    }

    pub fn step(&mut self) -> Result<CursorState> {
        if self.state == CursorState::Done {
            return Ok(CursorState::Done);
        }
        self.rows.advance().map_err(|source| StatementError::Step {
            sql: self.sql.to_string(),
            source,
        })?;
        self.state = CursorState::of(&self.rows);
        Ok(self.state)
    }

    /// The row produced by the last step.
    pub fn current(&self) -> Result<&Row<'s>> {
        self.rows
            .get()
            .ok_or_else(|| Error::decode(format!("`{}` produced no row", self.sql)))
    }

    /// The last row viewed by column name.
    pub fn keyed(&self) -> Result<KeyedRow<'_, 's>> {
        let columns = self.columns;
        Ok(KeyedRow::new(self.current()?, columns, columns.keys().collect()))
    }

    /// Column `index` of the last row.
    pub fn column(&self, index: usize) -> Result<ColumnDecoder<'_, 's>> {
        let name = self
            .columns
            .name(index)
            .ok_or_else(|| Error::decode(format!("`{}` has no column {index}", self.sql)))?;
        Ok(ColumnDecoder::new(self.current()?, index, name))
    }
}
