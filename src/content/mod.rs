//! Embedded content shown by the detail layer, and its message protocol.

mod host;
mod message;

use async_trait::async_trait;

use crate::error::Result;
use crate::layer::TransitionParams;

pub use host::{ContentFrame, ContentHost};
pub use message::{ContentMessage, MessageKind};

/// What the layer coordinator needs from the embedded-content side.
#[async_trait]
pub trait ContentController: Send + Sync {
    /// Resolves once the content acknowledged readiness; rejects on load
    /// failure or when the readiness watchdog fires.
    async fn open_screen(&self, id: &str, params: &TransitionParams) -> Result<()>;

    async fn close_screen(&self) -> Result<()>;

    fn has_screen(&self, id: &str) -> bool;
}
