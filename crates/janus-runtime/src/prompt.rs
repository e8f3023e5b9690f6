//! Prompt assembly for the runner wire.

use janus_core::{Message, PromptInput, Role};

/// A rendered prompt plus the image attachments referenced from it.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// The prompt text, with `[img-N]` placeholders for attachments.
    pub text: String,
    /// Base64-encoded images, in placeholder order (ids start at 1).
    pub images: Vec<String>,
}

/// Renders a prompt input into runner-wire form.
///
/// Chat histories use a plain role-tagged transcript; model-specific chat
/// templates live in the runner, which sees the rendered text as-is.
#[must_use]
pub fn render(prompt: &PromptInput) -> RenderedPrompt {
    match prompt {
        PromptInput::Text(text) => RenderedPrompt {
            text: text.clone(),
            images: Vec::new(),
        },
        PromptInput::Messages(messages) => render_transcript(messages),
    }
}

fn render_transcript(messages: &[Message]) -> RenderedPrompt {
    let mut text = String::new();
    let mut images = Vec::new();

    for message in messages {
        let tag = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        text.push_str("<|");
        text.push_str(tag);
        text.push_str("|>\n");
        for image in &message.images {
            images.push(image.clone());
            text.push_str(&format!("[img-{}]", images.len()));
            text.push('\n');
        }
        text.push_str(&message.content);
        text.push('\n');
    }
    text.push_str("<|assistant|>\n");

    RenderedPrompt { text, images }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let rendered = render(&PromptInput::from("Hello"));
        assert_eq!(rendered.text, "Hello");
        assert!(rendered.images.is_empty());
    }

    #[test]
    fn transcript_ends_with_assistant_turn() {
        let rendered = render(&PromptInput::Messages(vec![
            Message::system("Be brief."),
            Message::user("Hi"),
        ]));
        assert!(rendered.text.starts_with("<|system|>\nBe brief.\n"));
        assert!(rendered.text.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn images_get_numbered_placeholders() {
        let rendered = render(&PromptInput::Messages(vec![Message::user_with_image(
            "what is this?",
            "aGVsbG8=",
        )]));
        assert!(rendered.text.contains("[img-1]"));
        assert_eq!(rendered.images, vec!["aGVsbG8=".to_string()]);
    }
}
