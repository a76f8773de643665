//! ponder-sync — historical backfill, realtime head-following, and the
//! checkpoint-ordered multi-network event stream.

pub mod fetcher;
pub mod historical;
pub mod realtime;
pub mod stream;

pub use fetcher::{EvmFetcher, EvmRpcClient};
pub use historical::{gap_set, FactorySource, HistoricalSync, LogFilterSource};
pub use realtime::{NetworkSyncState, RealtimeOutcome, RealtimeSync, RealtimeTick, ReorgRecovery};
pub use stream::{event_stream, EventBatch, NetworkSource};
