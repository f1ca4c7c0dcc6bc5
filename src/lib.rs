//! # health-migrate
//!
//! A migration engine that moves personal health-tracking data out of
//! markdown files and into the website's SQLite database.
//!
//! Four domains are supported: health metrics, workout logs, meal logs,
//! and coaching notes. Each domain has a parser (pipe tables or dated
//! sections), a validator, and a migrator that stages rows inside one
//! transaction, journals the inserted primary keys for rollback, and
//! only then commits.
//!
//! ## Pipeline
//!
//! ```text
//! markdown ──▶ parser ──▶ validator ──▶ migrator ──▶ SQLite
//!                                          │
//!                                 rollback journal (JSON)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`parser`] | Markdown table and section parsers |
//! | [`validate`] | Field validation and normalization |
//! | [`store`] | Persistence port (trait) |
//! | [`store_sqlite`] | SQLite persistence |
//! | [`migrator`] | The per-domain migration pipeline |
//! | [`journal`] | Rollback journal and undo |
//! | [`backup`] | Pre-migration backups |
//! | [`lock`] | Advisory per-user, per-domain locks |
//! | [`orchestrator`] | Multi-domain runs |
//! | [`export`] | Regenerate markdown from the database |
//! | [`db`] | Database connection |
//! | [`schema`] | Schema creation |

pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod journal;
pub mod lock;
pub mod logging;
pub mod migrator;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod report;
pub mod schema;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod validate;
