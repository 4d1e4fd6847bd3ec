pub mod mistral;
pub mod openai;
pub mod traits;
pub mod utils;

pub use mistral::MistralProvider;
pub use openai::OpenAIProvider;
