pub mod favorites;
pub mod ingredients;
pub mod recipes;
pub mod shopping_list;
pub mod subscriptions;
pub mod tags;
pub mod users;
pub mod validation;

use crate::{
    assets::AssetStore,
    authentication::middleware::Identity,
    database::{
        error::Error,
        schema::{Id, RecipeDetail, RecipePayload, RecipeRelation, RecipeSummary},
        store::Datastore,
    },
};

/// Every recipe request, dispatched by [`perform`].
#[derive(Debug, Clone)]
pub enum RecipeOperation {
    Create(RecipePayload),
    Read(Id),
    Update(Id, RecipePayload),
    Delete(Id),
    Toggle {
        relation: RecipeRelation,
        recipe_id: Id,
        add: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecipeOutcome {
    Detail(RecipeDetail),
    Summary(RecipeSummary),
    Removed,
}

pub async fn perform(
    operation: RecipeOperation,
    identity: &Identity,
    store: &dyn Datastore,
    assets: &dyn AssetStore,
) -> Result<RecipeOutcome, Error> {
    match operation {
        RecipeOperation::Read(id) => recipes::get_recipe(id, identity.user_id(), store)
            .await
            .map(RecipeOutcome::Detail),
        RecipeOperation::Create(payload) => {
            recipes::create_recipe(payload, identity.require()?, store, assets)
                .await
                .map(RecipeOutcome::Detail)
        }
        RecipeOperation::Update(id, payload) => {
            recipes::update_recipe(id, payload, identity.require()?, store, assets)
                .await
                .map(RecipeOutcome::Detail)
        }
        RecipeOperation::Delete(id) => recipes::delete_recipe(id, identity.require()?, store)
            .await
            .map(|_| RecipeOutcome::Removed),
        RecipeOperation::Toggle {
            relation,
            recipe_id,
            add: true,
        } => favorites::add_relation(relation, recipe_id, identity.require()?, store)
            .await
            .map(RecipeOutcome::Summary),
        RecipeOperation::Toggle {
            relation,
            recipe_id,
            add: false,
        } => favorites::remove_relation(relation, recipe_id, identity.require()?, store)
            .await
            .map(|_| RecipeOutcome::Removed),
    }
}
