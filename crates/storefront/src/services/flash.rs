//! Session-backed flash messages.
//!
//! Handlers queue messages with [`push`]; the next rendered page drains them
//! with [`take`].

use tower_sessions::Session;

use crate::models::{FlashMessage, session_keys};

/// Queue a message for the next rendered page.
///
/// # Errors
///
/// Returns an error if the session cannot be read or written.
pub async fn push(
    session: &Session,
    message: FlashMessage,
) -> Result<(), tower_sessions::session::Error> {
    let mut queue: Vec<FlashMessage> = session
        .get(session_keys::MESSAGES)
        .await?
        .unwrap_or_default();
    queue.push(message);
    session.insert(session_keys::MESSAGES, queue).await
}

/// Remove and return every queued message.
///
/// A corrupt queue is dropped rather than failing the page.
pub async fn take(session: &Session) -> Vec<FlashMessage> {
    match session
        .remove::<Vec<FlashMessage>>(session_keys::MESSAGES)
        .await
    {
        Ok(messages) => messages.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unreadable flash messages");
            Vec::new()
        }
    }
}
