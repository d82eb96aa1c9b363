pub mod mock_provider;
pub mod prepare_env;

pub use mock_provider::MockProvider;
