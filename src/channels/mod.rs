//! Messaging-platform integration.
//!
//! The gateway receives Telegram updates over a webhook, relays message text
//! to the session executor, and sends formatted responses back through the
//! Bot API.

pub mod formatter;
mod gateway;
mod telegram;

pub use formatter::{FormattedMessage, MAX_MESSAGE_LENGTH, format_error, format_for_telegram};
pub use gateway::{GatewayContext, TelegramUpdate, handle_update, router};
pub use telegram::TelegramChannel;
