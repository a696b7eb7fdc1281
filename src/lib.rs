//! Sequential WhatsApp campaign sender.
//!
//! [`engine::CampaignEngine`] drains a snapshot of supporters one at a time through a
//! [`engine::Gateway`], pausing between recipients and honouring a cooperative stop.
//! [`orchestrator`] and [`progress`] are the pieces a control surface needs to drive and
//! display a run; [`cli`] is the bundled command-line surface.

pub mod cli;
pub mod engine;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod settings;
pub mod source;
pub mod storage;
mod text_summary;
