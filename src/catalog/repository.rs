use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::models::{Episode, Show};
use crate::shared::AppError;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn upsert_show(&self, show: Show) -> Result<(), AppError>;
    async fn upsert_episode(&self, episode: Episode) -> Result<(), AppError>;
    async fn get_show(&self, show_id: &str) -> Result<Option<Show>, AppError>;
    async fn get_episode(&self, episode_id: &str) -> Result<Option<Episode>, AppError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCatalogRepository {
    shows: RwLock<HashMap<String, Show>>,
    episodes: RwLock<HashMap<String, Episode>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    #[instrument(skip(self, show), fields(show_id = %show.id))]
    async fn upsert_show(&self, show: Show) -> Result<(), AppError> {
        debug!(title = %show.title, "Upserting show");
        self.shows.write().await.insert(show.id.clone(), show);
        Ok(())
    }

    #[instrument(skip(self, episode), fields(episode_id = %episode.id))]
    async fn upsert_episode(&self, episode: Episode) -> Result<(), AppError> {
        debug!(show_id = %episode.show_id, "Upserting episode");
        self.episodes
            .write()
            .await
            .insert(episode.id.clone(), episode);
        Ok(())
    }

    async fn get_show(&self, show_id: &str) -> Result<Option<Show>, AppError> {
        Ok(self.shows.read().await.get(show_id).cloned())
    }

    async fn get_episode(&self, episode_id: &str) -> Result<Option<Episode>, AppError> {
        Ok(self.episodes.read().await.get(episode_id).cloned())
    }
}
