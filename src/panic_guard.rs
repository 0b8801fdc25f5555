//! Isolates a single plugin's panic from the rest of the dispatch pipeline.
//!
//! The original C core runs plugins in the same process with no isolation
//! at all; a crashing plugin took the whole daemon down. Rust gives us
//! `catch_unwind` for free, and spec.md's `PluginError::Panicked` variant
//! expects a daemon that logs and keeps running rather than one bad plugin
//! taking every server session with it.

use futures::FutureExt;

use crate::error::PluginError;

pub async fn run<F>(fut: F) -> Result<(), PluginError>
where
    F: std::future::Future<Output = ()>,
{
    std::panic::AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| PluginError::Panicked(panic_message(payload)))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
