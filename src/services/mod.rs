pub mod assembler;
pub mod enumerator;
pub mod metadata_store;
pub mod reconciler;
pub mod retry;
pub mod source_client;
