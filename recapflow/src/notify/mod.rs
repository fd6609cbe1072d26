//! The notification dispatcher and its chat channel seam.
//!
//! Messages are rendered minimally, cut to the channel's field size budget,
//! and posted with bounded retries. When every attempt fails the payload is
//! written to the recovery store instead of being dropped.

mod channel;
mod dispatcher;
mod render;
mod size_budget;
#[cfg(feature = "http")]
mod webhook;

pub use channel::{ChatChannel, DeliveryReceipt};
pub use dispatcher::{DeliveryOutcome, NotificationDispatcher, Preservation, NOTIFICATION_STEP};
pub use render::{
    render_delivery_failed_message, render_failure_message, render_result_message, MessageField,
    MessageLink, RenderedMessage,
};
pub use size_budget::{truncate_field, truncate_result, FIELD_CHAR_LIMIT, TRUNCATION_MARKER};
#[cfg(feature = "http")]
pub use webhook::WebhookChatChannel;
