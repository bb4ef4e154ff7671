//! Plain-text rendering of notifications.

use std::sync::Arc;

use common::{BotConfig, Classification, Notification};

/// Source display names from the `sources` config section.
#[derive(Debug, Clone)]
pub struct Labels(Arc<BotConfig>);

impl Labels {
    pub fn new(config: Arc<BotConfig>) -> Self {
        Self(config)
    }

    /// Configured label, else the transport-supplied source name.
    pub fn label(&self, notification: &Notification) -> String {
        self.0
            .source_label(&notification.source_id, &notification.source_name)
            .to_string()
    }
}

/// Render `notification` for a chat destination. `label` is the display
/// name for the source.
pub fn render(notification: &Notification, label: &str) -> String {
    let mut lines = Vec::with_capacity(notification.triggers.len() + 3);
    lines.push(format!(
        "🎲 {} · period {} → {}",
        label, notification.outcome.period_id, notification.outcome.face
    ));
    for trigger in &notification.triggers {
        let what = match trigger.classification {
            Classification::Alternation => "alternating".to_string(),
            c => format!("{} in a row", c.label()),
        };
        lines.push(format!("• {} ×{}", what, trigger.run));
    }
    // Oldest first reads naturally left to right.
    let faces: Vec<String> = notification
        .recent
        .iter()
        .rev()
        .map(|o| o.face.to_string())
        .collect();
    if !faces.is_empty() {
        lines.push(format!("Recent: {}", faces.join(" ")));
    }
    lines.join("\n")
}
