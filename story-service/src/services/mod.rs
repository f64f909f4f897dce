pub mod story;
pub mod titles;

pub use story::{spawn_story_stream, StreamFormat, STORY_ERROR_MESSAGE};
pub use titles::make_story_title;
