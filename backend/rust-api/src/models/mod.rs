pub mod analysis;
pub mod paper;

pub use analysis::{AnalysisResult, AnalyzeExamRequest, Difficulty, ImagePayload, WrongQuestion};
pub use paper::{
    BankQuery, DeleteQuestionResponse, GeneratePaperRequest, GeneratedPaper, GeneratedQuestion,
    PaperConfig,
};
