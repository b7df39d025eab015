//! Record-to-table mapping and statement synthesis over SQLite.
//!
//! # Intention
//!
//! - Map plain structs to table rows through per-field annotations
//!   (`fn=<column>`, `pk=<bool>`, `_` to ignore) declared with [`record!`].
//! - Synthesize INSERT, UPDATE, DELETE and SELECT statements for a bound
//!   [`Table`] and scan result rows back into records, maps or scalars.
//! - Keep the connection pool and cursor lifecycle explicit: [`Database`]
//!   owns the pool, [`Table`] and [`Query`] only borrow it.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite access and row mapping belong here.
//! - No schema migration, relations or identifier quoting. Filter text is
//!   inserted into statements verbatim.
//!
//! ```
//! use rust_sorm::{record, Database, Source};
//!
//! #[derive(Debug, Default)]
//! struct Row {
//!     sid: i64,
//!     name: String,
//! }
//!
//! record!(Row {
//!     sid => "fn=id;pk=true",
//!     name,
//! });
//!
//! # fn main() -> rust_sorm::Result<()> {
//! let db = Database::open(":memory:")?;
//! db.exec_batch("CREATE TABLE xx(id INTEGER PRIMARY KEY, name TEXT)")?;
//! let table = db.bind_table("xx")?;
//! table.insert(Source::record(&Row { sid: 1, name: "one".into() }))?;
//!
//! let mut rows: Vec<Row> = Vec::new();
//! table.query("id > 0")?.all(&mut rows)?;
//! assert_eq!(rows[0].name, "one");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod debug;
pub mod error;
pub mod filter;
pub mod meta;
pub mod pool;
pub mod query;
pub mod scan;
pub mod sqlite;
pub mod statement;
pub mod table;
pub mod tag;

pub use config::{DatabaseConfig, PoolConfig};
pub use database::{Database, ExecResult};
pub use debug::{print_sql, set_print_sql};
pub use error::{Error, Result};
pub use filter::{Filter, QueryOperator};
pub use meta::{FieldDecl, FieldMap, FieldMetadata, Record};
pub use pool::PoolStats;
pub use query::{CancelToken, Query, QueryState};
pub use scan::{ColumnMap, Destination, ScanTarget};
pub use sqlite::{Field, Value};
pub use statement::{Placeholder, Source, Statement, Synthesizer};
pub use table::Table;
pub use tag::{Annotation, TagDiagnostic};
