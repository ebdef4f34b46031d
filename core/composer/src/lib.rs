pub mod api;
pub mod composer;
pub mod templates;

pub use api::{library_router, ApiError, AppState};
pub use composer::{select_media, ChatReply, Composer};
pub use templates::{Aspect, MediaRequest, Mood, TemplateRenderer};
