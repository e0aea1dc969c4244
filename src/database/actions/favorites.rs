use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    database::{
        error::Error,
        schema::{Id, RecipeRelation, RecipeSummary},
        store::Datastore,
    },
};

/// Puts the recipe into the user's favorites or cart. A second add is a conflict.
pub async fn add_relation(
    relation: RecipeRelation,
    recipe_id: Id,
    session: &SessionData,
    store: &dyn Datastore,
) -> Result<RecipeSummary, Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let recipe = store
        .get_recipe(recipe_id)
        .await?
        .ok_or_else(|| Error::not_found("No recipe exists with specified id"))?;

    store
        .insert_relation(relation, session.user_id, recipe_id)
        .await?;

    log::info!(
        "User {} added recipe {recipe_id} to {}",
        session.user_id,
        relation.label()
    );

    Ok(recipe.into())
}

pub async fn remove_relation(
    relation: RecipeRelation,
    recipe_id: Id,
    session: &SessionData,
    store: &dyn Datastore,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    if !store
        .delete_relation(relation, session.user_id, recipe_id)
        .await?
    {
        return Err(Error::NotFound(format!(
            "Recipe is not in {}",
            relation.label()
        )));
    }

    log::info!(
        "User {} removed recipe {recipe_id} from {}",
        session.user_id,
        relation.label()
    );

    Ok(())
}
