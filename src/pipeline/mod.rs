//! The ingestion → clustering → enrichment → briefing pipeline stages.

pub mod briefing;
pub mod broadcast;
pub mod cluster;
pub mod confidence;
pub mod dispatch;
pub mod entities;
pub mod enrich;
pub mod fanin;
pub mod fingerprint;
pub mod materialize;
pub mod relationships;
pub mod safety;
pub mod similarity;
pub mod snapshot;
pub mod topics;
pub mod watchlist;

pub use briefing::{validate_roundtable, BriefingHandler, MoveType, Persona, RoundtablePayload, RoundtableTurn};
pub use broadcast::BroadcastClient;
pub use cluster::ClusterHandler;
pub use confidence::{score, status_for, ScoreHandler, TrustProfile};
pub use dispatch::IngestHandler;
pub use entities::{slugify, EntityExtractHandler};
pub use enrich::EnrichHandler;
pub use fanin::{FanInCoordinator, SweeperLoop};
pub use fingerprint::{fingerprint, normalize_title};
pub use materialize::MaterializeHandler;
pub use relationships::RelationshipExtractHandler;
pub use safety::{admit, GateEvidence, RiskClass};
pub use similarity::title_similarity;
pub use snapshot::{canonicalize_url, SnapshotHandler};
pub use topics::TopicAssignHandler;
pub use watchlist::WatchlistMatchHandler;
