use std::sync::Arc;

use axum::extract::FromRef;
use pottogether_collab::Collab;

use crate::storage::ArcedStore;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
    pub store: ArcedStore,
}
