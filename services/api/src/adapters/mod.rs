pub mod avatar;
pub mod embeddings;
pub mod livekit;
pub mod llm;
pub mod weaviate;

pub use avatar::BeyondPresenceAdapter;
pub use embeddings::OpenAiEmbeddingAdapter;
pub use livekit::LiveKitAdapter;
pub use llm::OpenAiChatAdapter;
pub use weaviate::WeaviateAdapter;
