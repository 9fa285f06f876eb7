pub mod llm;

pub use llm::OpenAiCompletionClient;
