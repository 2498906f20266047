//! Renderer seam and per-render worker isolation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::SliceRandom;

use nimbus_config::NimbusConfig;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The frequency mapping was empty or degenerate.
    #[error("Nothing to render: empty frequency mapping")]
    EmptyFrequencies,
    #[error("Render failed: {0}")]
    Failed(String),
}

/// Options handed to the renderer for one render call.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub background_color: String,
    /// One concrete colormap, already chosen among the configured set.
    pub colormap: String,
    pub font_path: Option<PathBuf>,
    /// Raw bitmap mask bytes, if a mask is configured for the target.
    pub mask: Option<Vec<u8>>,
    /// Passthrough options the renderer may or may not understand.
    pub extra: HashMap<String, serde_json::Value>,
}

impl RenderOptions {
    /// Assemble options from config, picking one colormap at random when
    /// several are configured.
    pub fn from_config(config: &NimbusConfig, mask: Option<Vec<u8>>) -> Self {
        let colormap = config
            .colormap
            .names()
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "viridis".to_string());
        Self {
            width: config.width,
            height: config.height,
            background_color: config.background_color.clone(),
            colormap,
            font_path: config.font_path.clone(),
            mask,
            extra: config.renderer_options.clone(),
        }
    }
}

/// External word-cloud rasterizer.
///
/// Implementations must fail with [`RenderError::EmptyFrequencies`] rather
/// than produce an image from an empty mapping.
pub trait CloudRenderer: Send + Sync + 'static {
    fn render(
        &self,
        frequencies: &HashMap<String, f64>,
        options: &RenderOptions,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Run one render on a freshly spawned, then discarded, thread.
///
/// The renderer may leak native resources across calls, so each call gets
/// its own short-lived worker instead of a long-lived pool.
pub async fn render_detached(
    renderer: Arc<dyn CloudRenderer>,
    frequencies: HashMap<String, f64>,
    options: RenderOptions,
) -> Result<Vec<u8>, RenderError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let _ = tx.send(renderer.render(&frequencies, &options));
    });
    rx.await
        .map_err(|_| RenderError::Failed("render worker exited before replying".to_string()))?
}
