//! Generic record-store adapter. Every persistent component talks to this
//! minimal contract: create/read/update/delete against named collections,
//! filtered by top-level field equality. There are no transactions and no
//! joins; all composition happens in the services.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Collection names, kept in one place so services and tests agree.
pub mod collections {
    pub const GROUP_CONFIGS: &str = "group_configs";
    pub const BALANCES: &str = "balances";
    pub const TRANSACTIONS: &str = "transactions";
    pub const TRANSFER_INTENTS: &str = "transfer_intents";
    pub const JOIN_REQUESTS: &str = "join_requests";
    pub const ENDORSEMENTS: &str = "endorsements";
    pub const DELEGATIONS: &str = "delegations";
    pub const STRIKES: &str = "strikes";
    pub const FEE_INCOME_VOTES: &str = "fee_income_votes";
    pub const EXCHANGE_POSITIONS: &str = "exchange_positions";
    pub const REMITTANCE_COUPONS: &str = "remittance_coupons";
    pub const REDEEM_TICKETS: &str = "redeem_tickets";
    pub const MARKET_LISTINGS: &str = "market_listings";
}

/// An equality predicate on a top-level record field.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    /// `field == value`. Panics only if `value` fails to serialize, which
    /// cannot happen for the id/string/bool types used in filters.
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            value: serde_json::to_value(value).expect("filter value serializes"),
        }
    }
}

/// Collapses filters into one JSON object (used for `@>` containment by
/// the Postgres store and reused when building patches).
pub fn filters_to_object(filters: &[Filter]) -> Value {
    let mut map = Map::new();
    for filter in filters {
        map.insert(filter.field.clone(), filter.value.clone());
    }
    Value::Object(map)
}

/// The store contract. Object-safe so services hold `Arc<dyn DataStore>`;
/// typed access goes through [`DataStoreExt`].
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Inserts one record and returns it as stored.
    async fn insert(&self, collection: &str, record: Value) -> Result<Value>;

    /// Returns every record matching all filters, in insertion order.
    async fn select(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Value>>;

    /// Merges `patch` (a JSON object) into every matching record.
    /// Returns the number of records touched.
    async fn update(&self, collection: &str, filters: &[Filter], patch: Value) -> Result<u64>;

    /// Deletes every matching record, returning the number removed.
    async fn delete(&self, collection: &str, filters: &[Filter]) -> Result<u64>;
}

/// Typed convenience layer over the raw JSON contract.
#[async_trait]
pub trait DataStoreExt: DataStore {
    async fn insert_as<T>(&self, collection: &str, record: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        self.insert(collection, serde_json::to_value(record)?)
            .await?;
        Ok(())
    }

    async fn select_as<T>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let rows = self.select(collection, filters).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(Into::into))
            .collect()
    }

    async fn select_one<T>(&self, collection: &str, filters: &[Filter]) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut rows = self.select_as::<T>(collection, filters).await?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.swap_remove(0)))
        }
    }

    async fn exists(&self, collection: &str, filters: &[Filter]) -> Result<bool> {
        Ok(!self.select(collection, filters).await?.is_empty())
    }

    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<u64> {
        Ok(self.select(collection, filters).await?.len() as u64)
    }
}

impl<S: DataStore + ?Sized> DataStoreExt for S {}
