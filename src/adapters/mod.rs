// Adapters layer: concrete implementations of the domain ports (LLM provider, web search, page fetching).

pub mod llm;
pub mod page_fetcher;
pub mod search;

pub use llm::OpenAiCompatibleClient;
pub use page_fetcher::HttpContentFetcher;
pub use search::HtmlSearchEngine;
