//! # Sentra Edge
//!
//! Receives confidential images from a central store and recognizes people
//! in probe images, entirely on-device.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       SENTRA EDGE                         │
//! │  ┌────────────┐   ┌─────────────┐   ┌──────────────────┐  │
//! │  │  REMOTE    │──▶│ SYNC ENGINE │──▶│ EMBEDDING STORE  │  │
//! │  │  SERVICE   │   │ fetch/open/ │   │ one vector per   │  │
//! │  │  (REST)    │   │ commit      │   │ committed asset  │  │
//! │  └────────────┘   └──────┬──────┘   └────────┬─────────┘  │
//! │                          │                   │            │
//! │                   ┌──────┴──────┐     ┌──────┴─────────┐  │
//! │                   │  KEYVAULT   │     │    MATCHER     │  │
//! │                   │ RSA custody │     │ cosine + gate  │  │
//! │                   │ + envelope  │     └────────────────┘  │
//! │                   └─────────────┘                         │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The sync engine commits each batch atomically: the embedding store and
//! sync state advance in one transaction, and the decrypted cache is
//! swapped in with atomic renames. Matcher queries therefore always observe
//! a complete batch.

pub mod annotate;
pub mod config;
pub mod embedder;
pub mod error;
pub mod matcher;
pub mod profile;
pub mod remote;
pub mod scan_log;
pub mod state;
pub mod store;
pub mod sync;

pub use config::EdgeConfig;
pub use embedder::{FaceEmbedder, PerceptualEmbedder};
pub use error::{EdgeError, EdgeResult};
pub use matcher::{MatchOutcome, Matcher};
pub use remote::{HttpRemoteStore, RemoteStore};
pub use state::SyncState;
pub use store::{EmbeddingRecord, EmbeddingStore};
pub use sync::{SyncEngine, SyncOutcome, SyncPhase, SyncReport};

/// Sentra Edge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
