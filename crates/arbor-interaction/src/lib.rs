//! Model-facing side of arbor: the chat model client and the per-node
//! thread registry that implements the thread collaborator.

pub mod chat_model;
pub mod openai;
pub mod thread_manager;

pub use chat_model::ChatModel;
pub use openai::OpenAiChatModel;
pub use thread_manager::ThreadManager;
