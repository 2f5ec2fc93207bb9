//! Shared ledger, bus, and context-folding primitives for the research
//! pipeline workers (intake, search, analysis).

pub mod bus;
pub mod config;
pub mod error;
pub mod folding;
pub mod ledger;
pub mod models;
pub mod pool;
pub mod schema;

mod migrations;

pub use bus::{BusConsumer, BusProducer};
pub use error::{BusError, LedgerError};
pub use folding::fold_context;
pub use ledger::{ClaimId, Ledger, WorkHandle};
pub use migrations::run_pending_migrations;
pub use models::{AnalysisResult, NewAnalysisResult, NewSearchResult, Request, RequestStatus, SearchResult};
pub use pool::LedgerPool;
