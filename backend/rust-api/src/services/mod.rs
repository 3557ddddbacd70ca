use std::sync::Arc;

use crate::config::{BankBackend, Config};
use gemini_client::{GeminiClient, GenerativeModel};
use slot_storage::{FileSlotStorage, MemorySlotStorage, RedisSlotStorage, SlotStorage};

pub mod ai_error;
pub mod exam_analysis;
pub mod gemini_client;
pub mod paper_generator;
pub mod printable;
pub mod question_bank;
pub mod slot_storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use exam_analysis::ExamAnalysisService;
pub use paper_generator::PaperGeneratorService;
pub use question_bank::QuestionBank;

pub struct AppState {
    pub config: Config,
    pub analysis: ExamAnalysisService,
    pub generator: PaperGeneratorService,
    pub bank: QuestionBank,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let model: Arc<dyn GenerativeModel> = Arc::new(GeminiClient::new(&config.gemini)?);
        tracing::info!(
            "Gemini client ready: model={}, api_key_configured={}",
            model.model_name(),
            config.gemini.api_key.is_some()
        );

        let storage: Arc<dyn SlotStorage> = match config.bank_backend {
            BankBackend::File => {
                tracing::info!("Question bank stored under {}", config.bank_dir);
                Arc::new(FileSlotStorage::new(&config.bank_dir))
            }
            BankBackend::Redis => Arc::new(RedisSlotStorage::connect(&config.redis_uri).await?),
            BankBackend::Memory => {
                tracing::warn!("Question bank is in-memory; saved questions are lost on restart");
                Arc::new(MemorySlotStorage::new())
            }
        };

        Ok(Self::with_components(config, model, storage))
    }

    /// Assembles the state from already-built collaborators.
    pub fn with_components(
        config: Config,
        model: Arc<dyn GenerativeModel>,
        storage: Arc<dyn SlotStorage>,
    ) -> Self {
        let bank = QuestionBank::new(storage, config.bank_key.clone());
        Self {
            analysis: ExamAnalysisService::new(model.clone()),
            generator: PaperGeneratorService::new(model),
            bank,
            config,
        }
    }
}
