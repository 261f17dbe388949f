//! Profiling hooks
//!
//! Pipeline hot paths are instrumented with `profiling::scope!`, which is a
//! no-op unless a backend feature is enabled:
//! - `profile-with-puffin`: view with puffin_viewer after [`start_puffin_server`]
//! - `profile-with-tracy`: attach the tracy profiler

// Re-export profiling macros for convenience
pub use profiling;

/// Default puffin_http bind address
#[cfg(feature = "profile-with-puffin")]
pub const PUFFIN_ADDR: &str = "127.0.0.1:8585";

/// Enable puffin scopes and serve them over HTTP until the server is dropped.
#[cfg(feature = "profile-with-puffin")]
pub fn start_puffin_server(addr: &str) -> crate::error::Result<puffin_http::Server> {
    puffin::set_scopes_on(true);
    let server = puffin_http::Server::new(addr).map_err(|e| {
        crate::error::PipelineError::Config(format!("puffin server on {}: {}", addr, e))
    })?;
    tracing::debug!(addr, "Puffin server listening");
    Ok(server)
}

/// Mark the end of a profiling frame, e.g. once per published chart cycle batch.
pub fn finish_frame() {
    profiling::finish_frame!();
}
