//! Shared application state, injected explicitly into every handler.
//!
//! No global producer or ledger handle (§9 Design Notes): both are
//! constructed once in `main` and handed to the router via `with_state`.

use resynth_core::{BusProducer, Ledger};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub producer: std::sync::Arc<BusProducer>,
    pub search_topic: String,
}
