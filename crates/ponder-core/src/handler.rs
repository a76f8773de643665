//! Event, block, and reorg handler traits + a name-keyed registry.
//!
//! Handlers are generic over a context type `C` so this crate never has to
//! depend on the indexing store or RPC client types that a real context
//! carries (db handle, client, contract addresses) — `ponder-indexing`
//! supplies its own `IndexContext` and instantiates these traits with it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::checkpoint::Checkpoint;
use crate::error::PonderError;
use crate::types::BlockHeader;

/// A decoded event log, ready for handler dispatch.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    /// The event schema name (e.g. `"ERC20Transfer"`).
    pub schema: String,
    /// Contract address that emitted the event.
    pub address: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Block number.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u32,
    /// Decoded fields as JSON (ABI decoding is an external collaborator).
    pub fields_json: serde_json::Value,
    /// The checkpoint this log occupies in the global event stream.
    pub checkpoint: Checkpoint,
}

/// Trait for user-provided event handlers.
#[async_trait]
pub trait EventHandler<C: Send + Sync>: Send + Sync {
    /// Called for each decoded event that matches the handler's schema.
    async fn handle(&self, event: &DecodedLog, ctx: &C) -> Result<(), PonderError>;

    /// The event schema name this handler processes (e.g. `"ERC20Transfer"`).
    fn schema_name(&self) -> &str;
}

/// Trait for user-provided block handlers, called once per block regardless
/// of events.
#[async_trait]
pub trait BlockHandler<C: Send + Sync>: Send + Sync {
    async fn handle_block(&self, block: &BlockHeader, ctx: &C) -> Result<(), PonderError>;
}

/// Trait for reorg handlers, called when a chain reorganization is detected.
#[async_trait]
pub trait ReorgHandler<C: Send + Sync>: Send + Sync {
    async fn on_reorg(&self, dropped: &[BlockHeader], ctx: &C) -> Result<(), PonderError>;
}

/// Registry of event + block + reorg handlers, keyed by schema name for
/// events.
pub struct HandlerRegistry<C: Send + Sync> {
    event_handlers: HashMap<String, Vec<Arc<dyn EventHandler<C>>>>,
    block_handlers: Vec<Arc<dyn BlockHandler<C>>>,
    reorg_handlers: Vec<Arc<dyn ReorgHandler<C>>>,
}

impl<C: Send + Sync> HandlerRegistry<C> {
    pub fn new() -> Self {
        Self {
            event_handlers: HashMap::new(),
            block_handlers: vec![],
            reorg_handlers: vec![],
        }
    }

    /// Register an event handler for a specific schema name.
    pub fn on_event(&mut self, handler: Arc<dyn EventHandler<C>>) {
        self.event_handlers
            .entry(handler.schema_name().to_string())
            .or_default()
            .push(handler);
    }

    /// Register a block handler (called for every block).
    pub fn on_block(&mut self, handler: Arc<dyn BlockHandler<C>>) {
        self.block_handlers.push(handler);
    }

    /// Register a reorg handler.
    pub fn on_reorg(&mut self, handler: Arc<dyn ReorgHandler<C>>) {
        self.reorg_handlers.push(handler);
    }

    /// Returns `true` if any handler is registered for `schema`.
    pub fn has_handler_for(&self, schema: &str) -> bool {
        self.event_handlers.contains_key(schema)
    }

    /// Dispatch an event to all matching handlers, in registration order.
    pub async fn dispatch_event(&self, event: &DecodedLog, ctx: &C) -> Result<(), PonderError> {
        if let Some(handlers) = self.event_handlers.get(&event.schema) {
            for handler in handlers {
                handler.handle(event, ctx).await.map_err(|e| match e {
                    PonderError::UserHandler { .. } => e,
                    other => PonderError::UserHandler {
                        handler: event.schema.clone(),
                        reason: other.to_string(),
                    },
                })?;
            }
        }
        Ok(())
    }

    /// Dispatch a block to all block handlers.
    pub async fn dispatch_block(&self, block: &BlockHeader, ctx: &C) -> Result<(), PonderError> {
        for handler in &self.block_handlers {
            handler.handle_block(block, ctx).await?;
        }
        Ok(())
    }

    /// Dispatch a reorg event to all reorg handlers.
    pub async fn dispatch_reorg(
        &self,
        dropped: &[BlockHeader],
        ctx: &C,
    ) -> Result<(), PonderError> {
        for handler in &self.reorg_handlers {
            handler.on_reorg(dropped, ctx).await?;
        }
        Ok(())
    }
}

impl<C: Send + Sync> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
