pub mod ethereum;
pub mod mock;
pub mod traits;

pub use ethereum::EthersChainClient;
pub use mock::{MockChainClient, SubmittedTransaction};
pub use traits::ChainClient;
