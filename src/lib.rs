pub mod commands;
pub mod middleware;
pub mod modules;
pub mod privacy;

use std::sync::Arc;

use modules::kv_store::KvStore;
use privacy::{IdnaEncoder, ObfuscationEngine, RandomnessProvider};

/// Engine wired with IDN encoding and the tiered randomness provider.
pub fn build_engine(store: Arc<dyn KvStore>) -> ObfuscationEngine {
    ObfuscationEngine::new(store, Arc::new(IdnaEncoder), Arc::new(RandomnessProvider::new()))
}
