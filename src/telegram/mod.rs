pub mod admin;
pub mod bot;
pub mod broadcast;
pub mod envelope;
pub mod gateway;
pub mod handlers;
pub mod song_picker;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use gateway::{MessengerGateway, TelegramGateway};
pub use handlers::{schema, HandlerDeps, HandlerError};
