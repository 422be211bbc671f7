// Comment threads with spoiler gating on unaired episodes
pub use handlers::{create_comment, delete_comment, list_comments, vote_comment};

mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod types;

pub use service::CommentService;
