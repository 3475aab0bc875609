use async_trait::async_trait;

use vitrine_store::Query;

use crate::context::Context;
use crate::error::CoreError;

/// Plain CRUD interface shared by the project, tag and build ledgers.
#[async_trait]
pub trait Ledger: Send + Sync {
  type Record: Send;
  type New: Send;
  type Patch: Send;

  async fn list(&self, ctx: &Context, query: Query) -> Result<Vec<Self::Record>, CoreError>;

  async fn create(&self, ctx: &Context, input: Self::New) -> Result<Self::Record, CoreError>;

  async fn get(&self, ctx: &Context, id: &str) -> Result<Self::Record, CoreError>;

  async fn has(&self, ctx: &Context, id: &str) -> Result<bool, CoreError>;

  async fn update(
    &self,
    ctx: &Context,
    id: &str,
    patch: Self::Patch,
  ) -> Result<Self::Record, CoreError>;

  async fn delete(&self, ctx: &Context, id: &str) -> Result<(), CoreError>;
}
