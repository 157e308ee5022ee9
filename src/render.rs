use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::layout::AssetLayout;
use crate::model::ContentPlan;
use crate::timeline::Timeline;

/// Everything a compositor needs to draw one video.
pub struct RenderJob<'a> {
    pub plan: &'a ContentPlan,
    pub layout: &'a AssetLayout,
    pub timeline: &'a Timeline,
    pub output: &'a Path,
}

#[async_trait]
pub trait Compositor: Send + Sync {
    /// Writes the finished video to `job.output`, or fails with `RenderFailure`.
    async fn render(&self, job: &RenderJob<'_>) -> Result<()>;
}
