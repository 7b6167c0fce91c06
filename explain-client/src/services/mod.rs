pub mod audit;
pub mod aws_credentials;
pub mod backend_client;
pub mod claims;
pub mod identity;
pub mod local_store;
pub mod object_store;
pub mod poller;
pub mod search;
pub mod session;
pub mod storage_gateway;
pub mod tenant;
pub mod token_store;
