use std::sync::Arc;

use crate::config::{AppConfig, ExtractorProvider};
use crate::db::Database;
use crate::services::ai::extractor::{CachingExtractor, LlmExtractor, StructuredExtractor};
use crate::services::ai::groq::GroqProvider;
use crate::services::ai::ollama::OllamaProvider;
use crate::services::ai::LlmProvider;
use crate::services::booking::BookingManager;
use crate::services::conversation::BookingConversation;
use crate::services::directory::{Directory, SqliteDirectory};
use crate::services::notify::webhook::WebhookNotifier;
use crate::services::notify::{LogNotifier, Notifier};
use crate::services::resolver::DateTimeResolver;
use crate::services::sessions::SessionStore;
use crate::services::slots::SlotEngine;

pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub directory: Arc<dyn Directory>,
    pub slots: Arc<SlotEngine>,
    pub booking: Arc<BookingManager>,
    pub conversation: BookingConversation,
    pub sessions: SessionStore,
}

impl AppState {
    /// Wires every service over one database. `extractor` is wrapped in the
    /// bounded cache; `None` leaves the resolver on rules only.
    pub fn new(
        config: AppConfig,
        db: Arc<Database>,
        extractor: Option<Arc<dyn StructuredExtractor>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let directory: Arc<dyn Directory> = Arc::new(SqliteDirectory::new(db.clone()));
        let slots = Arc::new(SlotEngine::new(db.clone(), config.working_hours.clone()));
        let booking = Arc::new(BookingManager::new(db.clone(), config.working_hours.clone()));

        let resolver = match extractor {
            Some(extractor) => {
                let cached: Arc<dyn StructuredExtractor> =
                    Arc::new(CachingExtractor::new(extractor, config.extractor_cache_size));
                DateTimeResolver::with_extractor(cached, config.horizon_days)
            }
            None => DateTimeResolver::rules_only(config.horizon_days),
        };

        let conversation = BookingConversation::new(
            directory.clone(),
            slots.clone(),
            booking.clone(),
            Arc::new(resolver),
            notifier,
        );

        Self {
            sessions: SessionStore::new(config.session_ttl),
            config,
            db,
            directory,
            slots,
            booking,
            conversation,
        }
    }

    /// Builds the providers named in `config`.
    pub fn from_config(config: AppConfig, db: Arc<Database>) -> anyhow::Result<Self> {
        let llm: Option<Box<dyn LlmProvider>> = match config.extractor_provider {
            ExtractorProvider::Groq => {
                anyhow::ensure!(
                    !config.groq_api_key.is_empty(),
                    "GROQ_API_KEY must be set when EXTRACTOR_PROVIDER=groq"
                );
                tracing::info!("using Groq extractor (model: {})", config.groq_model);
                Some(Box::new(GroqProvider::new(
                    config.groq_api_key.clone(),
                    config.groq_model.clone(),
                )))
            }
            ExtractorProvider::Ollama => {
                tracing::info!("using Ollama extractor (url: {})", config.ollama_url);
                Some(Box::new(OllamaProvider::new(
                    config.ollama_url.clone(),
                    config.ollama_model.clone(),
                )))
            }
            ExtractorProvider::None => {
                tracing::info!("no extractor configured, date/time resolution uses rules only");
                None
            }
        };
        let extractor = llm.map(|llm| {
            Arc::new(LlmExtractor::new(llm, config.extractor_timeout)) as Arc<dyn StructuredExtractor>
        });

        let notifier: Arc<dyn Notifier> = if config.notify_webhook_url.is_empty() {
            tracing::info!("no NOTIFY_WEBHOOK_URL, confirmations are logged only");
            Arc::new(LogNotifier)
        } else {
            Arc::new(WebhookNotifier::new(config.notify_webhook_url.clone()))
        };

        Ok(Self::new(config, db, extractor, notifier))
    }
}
