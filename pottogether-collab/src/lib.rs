mod auth;
mod clock;
mod db;
mod error;
mod ingredients;
mod overview;
mod records;
mod rooms;
mod util;

pub use auth::*;
pub use clock::*;
pub use db::*;
pub use error::*;
pub use ingredients::*;
pub use overview::*;
pub use records::*;
pub use rooms::*;

/// The pottogether collab system, facilitating rooms, records, authentication, and more.
pub struct Collab {
    context: CollabContext,

    pub auth: Auth,
    pub rooms: RoomManager,
    pub records: RecordManager,
    pub overviews: OverviewBuilder,
    pub ingredients: IngredientCatalog,
}

/// A type passed to various components of the collab system, to access the database and the time.
#[derive(Clone)]
pub struct CollabContext {
    pub database: ArcedDatabase,
    pub clock: ArcedClock,
}

impl Collab {
    pub fn new(database: ArcedDatabase, clock: ArcedClock) -> Self {
        let context = CollabContext { database, clock };

        Self {
            auth: Auth::new(&context),
            rooms: RoomManager::new(&context),
            records: RecordManager::new(&context),
            overviews: OverviewBuilder::new(&context),
            ingredients: IngredientCatalog::new(&context),
            context,
        }
    }

    pub fn context(&self) -> &CollabContext {
        &self.context
    }
}
