pub mod connection;
pub mod repositories;
pub mod schema;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use repositories::{
    ContextStore, InMemoryContextStore, InMemoryMessageMetadataStore, MessageMetadataStore,
    MessageRecord, RepositoryError, SqlContextStore, SqlMessageMetadataStore,
};
pub use schema::TableNames;
