use std::collections::HashSet;

use crate::constants::{
    MAX_COOKING_TIME, MAX_INGREDIENT_AMOUNT, MAX_NAME_LENGTH, MIN_COOKING_TIME,
    MIN_INGREDIENT_AMOUNT,
};
use crate::database::{
    error::Error,
    schema::{RecipePayload, ValidatedRecipe},
    store::Datastore,
};

/// Field and set checks that need no datastore access.
pub fn check_recipe_payload(payload: &RecipePayload, require_image: bool) -> Result<(), Error> {
    if payload.ingredients.is_empty() {
        return Err(Error::validation("Recipe needs at least one ingredient"));
    }

    let mut seen = HashSet::new();
    for part in payload.ingredients.iter() {
        if !seen.insert(part.id) {
            return Err(Error::Validation(format!(
                "Ingredient {} is listed more than once",
                part.id
            )));
        }
        if !(MIN_INGREDIENT_AMOUNT..=MAX_INGREDIENT_AMOUNT).contains(&part.amount) {
            return Err(Error::Validation(format!(
                "Amount must be between {MIN_INGREDIENT_AMOUNT} and {MAX_INGREDIENT_AMOUNT}"
            )));
        }
    }

    if payload.tags.is_empty() {
        return Err(Error::validation("Recipe needs at least one tag"));
    }

    let mut seen = HashSet::new();
    if let Some(tag) = payload.tags.iter().find(|tag| !seen.insert(**tag)) {
        return Err(Error::Validation(format!(
            "Tag {tag} is listed more than once"
        )));
    }

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(Error::validation("Recipe name is required"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "Recipe name is longer than {MAX_NAME_LENGTH} characters"
        )));
    }

    if payload.text.trim().is_empty() {
        return Err(Error::validation("Recipe text is required"));
    }

    if !(MIN_COOKING_TIME..=MAX_COOKING_TIME).contains(&payload.cooking_time) {
        return Err(Error::Validation(format!(
            "Cooking time must be between {MIN_COOKING_TIME} and {MAX_COOKING_TIME}"
        )));
    }

    if require_image && payload.image.as_deref().map(str::is_empty).unwrap_or(true) {
        return Err(Error::validation("Recipe image is required"));
    }

    Ok(())
}

/// Runs every recipe check, including that each referenced ingredient and tag exists.
pub async fn validate_recipe(
    payload: RecipePayload,
    require_image: bool,
    store: &dyn Datastore,
) -> Result<ValidatedRecipe, Error> {
    check_recipe_payload(&payload, require_image)?;

    let ingredient_ids: Vec<_> = payload.ingredients.iter().map(|part| part.id).collect();
    let missing = store.missing_ingredients(&ingredient_ids).await?;
    if !missing.is_empty() {
        return Err(Error::Validation(format!(
            "Unknown ingredient ids: {missing:?}"
        )));
    }

    let missing = store.missing_tags(&payload.tags).await?;
    if !missing.is_empty() {
        return Err(Error::Validation(format!("Unknown tag ids: {missing:?}")));
    }

    Ok(ValidatedRecipe {
        name: payload.name.trim().to_string(),
        text: payload.text,
        cooking_time: payload.cooking_time,
        image: payload.image.filter(|image| !image.is_empty()),
        ingredients: payload.ingredients,
        tags: payload.tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::IngredientAmount;

    fn payload() -> RecipePayload {
        RecipePayload {
            ingredients: vec![
                IngredientAmount { id: 1, amount: 5 },
                IngredientAmount { id: 2, amount: 1 },
            ],
            tags: vec![1],
            image: Some(String::from("data:image/png;base64,AAAA")),
            name: String::from("Pancakes"),
            text: String::from("Mix and fry"),
            cooking_time: 20,
        }
    }

    fn rejects(payload: RecipePayload) -> bool {
        matches!(
            check_recipe_payload(&payload, true),
            Err(Error::Validation(_))
        )
    }

    #[test]
    fn valid_payload_passes() {
        assert_eq!(check_recipe_payload(&payload(), true), Ok(()));
    }

    #[test]
    fn ingredient_set_must_be_nonempty_and_unique() {
        assert!(rejects(RecipePayload {
            ingredients: vec![],
            ..payload()
        }));
        assert!(rejects(RecipePayload {
            ingredients: vec![
                IngredientAmount { id: 1, amount: 5 },
                IngredientAmount { id: 1, amount: 2 },
            ],
            ..payload()
        }));
        assert!(rejects(RecipePayload {
            ingredients: vec![IngredientAmount { id: 1, amount: 0 }],
            ..payload()
        }));
    }

    #[test]
    fn tag_set_must_be_nonempty_and_unique() {
        assert!(rejects(RecipePayload {
            tags: vec![],
            ..payload()
        }));
        assert!(rejects(RecipePayload {
            tags: vec![3, 3],
            ..payload()
        }));
    }

    #[test]
    fn scalar_fields_are_bounded() {
        assert!(rejects(RecipePayload {
            name: String::from("  "),
            ..payload()
        }));
        assert!(rejects(RecipePayload {
            name: "x".repeat(MAX_NAME_LENGTH + 1),
            ..payload()
        }));
        assert!(rejects(RecipePayload {
            cooking_time: 0,
            ..payload()
        }));
        assert!(rejects(RecipePayload {
            text: String::new(),
            ..payload()
        }));
    }

    #[test]
    fn image_is_only_required_on_create() {
        let without_image = RecipePayload {
            image: None,
            ..payload()
        };

        assert!(check_recipe_payload(&without_image, true).is_err());
        assert!(check_recipe_payload(&without_image, false).is_ok());
    }
}
