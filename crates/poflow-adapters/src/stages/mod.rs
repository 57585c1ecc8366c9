//! The six stage processors (spec §4.4 C4), one module per stage tag.
//!
//! Each processor is deliberately thin: fetch/compute, delegate scoring and
//! pricing decisions to `poflow-policies`, persist through the
//! `poflow-core` repository traits, and hand a JSON payload to the next
//! stage. None of them owns workflow-row mutation or retry bookkeeping —
//! that stays with the orchestrator, per `poflow_core::stage`'s contract.

pub mod draft;
pub mod finalize;
pub mod images;
pub mod parse;
pub mod save;
pub mod sync;

use chrono::Utc;
use poflow_core::stage::StageContext;
use poflow_domain::{channel_name, ProgressEvent, ProgressEventType, StageTag};

/// Publishes one sparse intermediate progress event (spec §4.4 step 1/2:
/// "Publish progress(stage, 5%, starting)", "publish intermediate progress
/// sparsely"). Final per-stage completion events are the orchestrator's
/// job, not the processor's.
pub(crate) async fn publish_progress(ctx: &StageContext<'_>, stage: StageTag, percent: u8, message: &str) {
    let event = ProgressEvent::new(ProgressEventType::Progress, ctx.job.workflow_id.clone(), stage, percent, Utc::now())
        .with_message(message.to_string());
    let channel = channel_name(&ctx.job.merchant_id, ProgressEventType::Progress);
    ctx.progress.publish(&channel, event).await;
}
