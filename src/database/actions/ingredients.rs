use std::path::Path;

use crate::database::{
    error::Error,
    schema::{Id, Ingredient, NewIngredient},
    store::Datastore,
};

pub fn parse_ingredients(json: &str) -> Result<Vec<NewIngredient>, Error> {
    let ingredients: Vec<NewIngredient> = serde_json::from_str(json)
        .map_err(|e| Error::Validation(format!("Invalid ingredient data: {e}")))?;

    if let Some(bad) = ingredients
        .iter()
        .find(|i| i.name.trim().is_empty() || i.measurement_unit.trim().is_empty())
    {
        return Err(Error::Validation(format!(
            "Ingredient entry is incomplete: {bad:?}"
        )));
    }

    Ok(ingredients)
}

/// Loads a JSON array of `{name, measurement_unit}` and inserts the entries
/// that are not present yet. Returns how many were inserted.
pub async fn import_ingredients(path: &Path, store: &dyn Datastore) -> Result<u64, Error> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Validation(format!("Failed to read {}: {e}", path.display()))
    })?;

    let ingredients = parse_ingredients(&json)?;
    let total = ingredients.len();
    let inserted = store.insert_ingredients(ingredients).await?;

    log::info!(
        "Imported {inserted} of {total} ingredients from {}",
        path.display()
    );

    Ok(inserted)
}

/// Case-insensitive name-prefix search. An empty prefix lists everything.
pub async fn search_ingredients(
    prefix: &str,
    store: &dyn Datastore,
) -> Result<Vec<Ingredient>, Error> {
    store.search_ingredients(prefix.trim()).await
}

pub async fn get_ingredient(id: Id, store: &dyn Datastore) -> Result<Ingredient, Error> {
    store
        .get_ingredient(id)
        .await?
        .ok_or_else(|| Error::not_found("No ingredient exists with specified id"))
}
