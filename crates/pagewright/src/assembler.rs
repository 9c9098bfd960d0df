//! Builds the initial conversation transcript from the system prompt,
//! the user prompt and preprocessed document pages. Pure: same inputs,
//! same roles and content, no side effects.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::document::DocumentPage;
use crate::models::message::Message;

/// Produce the initial transcript: one system message, then one user
/// message carrying every document's page images (documents in
/// submission order, pages in index order) followed by the prompt text.
pub fn assemble(
    system_prompt: &str,
    user_prompt: &str,
    documents: &[Vec<DocumentPage>],
) -> Vec<Message> {
    let mut user = Message::user();

    for pages in documents {
        for page in pages {
            user = user.with_image(BASE64.encode(&page.data), "image/png");
        }
    }
    user = user.with_text(user_prompt);

    vec![Message::system().with_text(system_prompt), user]
}
