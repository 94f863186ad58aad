pub mod typing;

pub use typing::TypingRegistry;
