// Hash obfuscation core

pub mod avatar_url;
pub mod canonical;
pub mod engine;
pub mod randomness;
pub mod salt;
pub mod whitelist;

pub use canonical::{DomainEncoder, IdnaEncoder, NoopEncoder, UNKNOWN_ADDRESS};
pub use engine::{IdentityHash, ObfuscationEngine};
pub use randomness::{EntropyTier, RandomnessProvider};
pub use salt::{SaltLookup, SaltManager, SaltPair};
pub use whitelist::{WhiteList, WhiteListKind};
