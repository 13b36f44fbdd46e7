use log::info;

use crate::{
    error::LogInternal, CollabContext, CollabError, CollabResult, IngredientData, NewIngredient,
};

impl NewIngredient {
    /// Trims the text fields. The image is not checked, so this can run before uploading it.
    pub fn validated(self) -> CollabResult<Self> {
        let name = self.name.trim().to_string();

        if name.is_empty() {
            return Err(CollabError::invalid("ingredient name must not be empty"));
        }

        if self.interval < 0 {
            return Err(CollabError::invalid("interval must not be negative"));
        }

        Ok(Self {
            name,
            requirement: self.requirement.trim().to_string(),
            ..self
        })
    }
}

/// The list of ingredients records can be cooked with
pub struct IngredientCatalog {
    context: CollabContext,
}

impl IngredientCatalog {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Every ingredient, ordered by id
    pub async fn list(&self) -> CollabResult<Vec<IngredientData>> {
        self.context
            .database
            .list_ingredients()
            .await
            .log_internal("list ingredients", "catalog")
    }

    pub async fn add(&self, new_ingredient: NewIngredient) -> CollabResult<IngredientData> {
        let new_ingredient = new_ingredient.validated()?;

        let ingredient = self
            .context
            .database
            .create_ingredient(new_ingredient)
            .await
            .log_internal("add ingredient", "catalog")?;

        info!("Added ingredient {} ({})", ingredient.id, ingredient.name);
        Ok(ingredient)
    }
}
