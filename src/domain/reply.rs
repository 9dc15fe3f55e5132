use serde::{Deserialize, Serialize};

/// A media payload the transport should attach to the outgoing message.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Attachment {
    /// Reference to an image (e.g. a QR code) the transport can render.
    Image(String),
}

/// An instruction for the transport that targets someone other than the
/// sender of the inbound message.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SideEffect {
    DeliverTo { customer_id: String, text: String },
    Broadcast { recipients: Vec<String>, text: String },
}

/// The single response shape every handler produces.
///
/// Attachments and side effects are empty by default so the transport always
/// handles one shape, never a string-or-object union.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Reply {
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub side_effects: Vec<SideEffect>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_side_effect(mut self, effect: SideEffect) -> Self {
        self.side_effects.push(effect);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_reply_has_no_extras() {
        let reply = Reply::text("hi");
        assert_eq!(reply.text, "hi");
        assert!(reply.attachments.is_empty());
        assert!(reply.side_effects.is_empty());
    }

    #[test]
    fn test_builder_appends() {
        let reply = Reply::text("paid")
            .with_attachment(Attachment::Image("qris://abc".to_string()))
            .with_side_effect(SideEffect::DeliverTo {
                customer_id: "628111".to_string(),
                text: "creds".to_string(),
            });
        assert_eq!(reply.attachments.len(), 1);
        assert_eq!(reply.side_effects.len(), 1);
    }
}
