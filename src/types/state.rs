use std::sync::Arc;

use serde::Serialize;

use crate::error::GridWindowError;

/// Fetch status of one block, tracked apart from cache presence.
#[derive(Debug, Clone, Default)]
pub enum BlockState {
    /// Not requested, or evicted/expired/refreshed since
    #[default]
    Idle,
    /// Waiting in the scheduler queue for a free slot
    Queued,
    /// Fetch running
    Loading,
    /// Rows are in the cache
    Loaded,
    /// Last fetch failed; the next read of the block retries it
    Failed(Arc<GridWindowError>),
}

impl BlockState {
    /// Queued or loading. A pending block is never submitted again.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Failed(_) => "failed",
        }
    }
}

/// What changed, delivered to every subscriber.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A block's rows landed in the cache
    BlockLoaded { block: u64 },
    /// A block's fetch failed
    BlockFailed {
        block: u64,
        error: Arc<GridWindowError>,
    },
    /// Expired blocks were dropped from the cache
    BlocksExpired { blocks: Vec<u64> },
    /// Cache and block states were cleared; `generation` is the new one
    Refreshed { generation: u64 },
    /// The source was torn down; no further events follow
    Destroyed,
}

impl SourceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlockLoaded { .. } => "blockLoaded",
            Self::BlockFailed { .. } => "blockFailed",
            Self::BlocksExpired { .. } => "blocksExpired",
            Self::Refreshed { .. } => "refreshed",
            Self::Destroyed => "destroyed",
        }
    }

    /// The single block this event is about, if any.
    pub fn block(&self) -> Option<u64> {
        match self {
            Self::BlockLoaded { block } | Self::BlockFailed { block, .. } => Some(*block),
            _ => None,
        }
    }
}

/// Point-in-time counters for a data source
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    /// Entries in the block cache (fresh or not yet found expired)
    pub cached_blocks: usize,
    /// Blocks whose fetch is running in the current generation
    pub loading_blocks: usize,
    /// Blocks waiting for a scheduler slot
    pub queued_blocks: usize,
    /// Blocks whose last fetch failed
    pub failed_blocks: usize,
    /// Fetches holding a slot, including stale ones from older generations
    pub in_flight: usize,
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
}
