//! `trainsql` is a teaching-grade relational database engine: a SQL lexer,
//! parser, planner and executor sitting on top of an MVCC transaction
//! manager, itself layered over a pluggable ordered key-value store.
//!
//! Persistence is provided by two interchangeable [`storage::engine::Engine`]
//! implementations: [`storage::memory::Memory`] (pure in-memory, no
//! durability) and [`storage::log_cask::LogCask`] (an append-only
//! bitcask-style log with an in-memory key index). Isolation is multi-version
//! concurrency control with snapshot reads, implemented in [`mvcc`].
//!
//! ## Getting started
//!
//! ```rust
//! use trainsql::mvcc::MVCC;
//! use trainsql::storage::memory::Memory;
//! use trainsql::session::Session;
//!
//! let mvcc = MVCC::new(Memory::new());
//! let mut session = Session::new(mvcc);
//!
//! session.execute("CREATE TABLE t (a INT PRIMARY KEY, b TEXT DEFAULT 'x');");
//! session.execute("INSERT INTO t (a) VALUES (1);");
//! let result = session.execute("SELECT * FROM t;");
//! println!("{}", result);
//! ```

pub mod error;
pub mod storage;
pub mod mvcc;
pub mod value;
pub mod expr;
pub mod table;
pub mod sql;
pub mod session;
pub mod result;
