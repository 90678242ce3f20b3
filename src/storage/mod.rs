mod feeds;
mod items;
mod schema;
mod store;
mod types;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{
    DatabaseError, FeedDefinition, FeedItem, ItemUpsert, NewFeed, UpsertOutcome,
};
