use crate::{
    assets::{save_image, AssetStore},
    authentication::{jwt::SessionData, permissions::ActionType},
    database::{
        error::Error,
        form::Form,
        pagination::{PageContext, PageRequest},
        schema::{
            Id, Recipe, RecipeDetail, RecipeFilter, RecipePayload, RecipeRelation, RecipeWrite,
            UserProfile,
        },
        store::Datastore,
    },
};

use super::validation::validate_recipe;

/// Listing filters as given by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeQuery {
    pub tags: Vec<String>,
    pub author: Option<Id>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeQuery {
    pub fn from_form(form: &Form) -> Result<Self, Error> {
        Ok(Self {
            tags: form.get_all("tags"),
            author: form.get_optional_number("author")?,
            is_favorited: form.get_flag("is_favorited")?,
            is_in_shopping_cart: form.get_flag("is_in_shopping_cart")?,
        })
    }

    /// Per-user filters only apply to authenticated viewers.
    pub fn into_filter(self, viewer: Option<Id>) -> RecipeFilter {
        RecipeFilter {
            tags: self.tags,
            author: self.author,
            favorited_by: viewer.filter(|_| self.is_favorited),
            in_cart_of: viewer.filter(|_| self.is_in_shopping_cart),
        }
    }
}

async fn fetch_recipe(id: Id, store: &dyn Datastore) -> Result<Recipe, Error> {
    store
        .get_recipe(id)
        .await?
        .ok_or_else(|| Error::not_found("No recipe exists with specified id"))
}

pub async fn build_recipe_detail(
    recipe: Recipe,
    viewer: Option<Id>,
    store: &dyn Datastore,
) -> Result<RecipeDetail, Error> {
    let author = store
        .get_user(recipe.author_id)
        .await?
        .ok_or_else(|| Error::not_found("Recipe author does not exist"))?;

    let (is_subscribed, is_favorited, is_in_shopping_cart) = match viewer {
        Some(user_id) => (
            store.is_subscribed(user_id, author.id).await?,
            store
                .has_relation(RecipeRelation::Favorite, user_id, recipe.id)
                .await?,
            store
                .has_relation(RecipeRelation::ShoppingCart, user_id, recipe.id)
                .await?,
        ),
        None => (false, false, false),
    };

    Ok(RecipeDetail {
        id: recipe.id,
        tags: store.recipe_tags(recipe.id).await?,
        author: UserProfile::from_user(author, is_subscribed),
        ingredients: store.recipe_parts(recipe.id).await?,
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
        pub_date: recipe.pub_date,
    })
}

pub async fn get_recipe(
    id: Id,
    viewer: Option<Id>,
    store: &dyn Datastore,
) -> Result<RecipeDetail, Error> {
    let recipe = fetch_recipe(id, store).await?;
    build_recipe_detail(recipe, viewer, store).await
}

pub async fn list_recipes(
    query: RecipeQuery,
    viewer: Option<Id>,
    page: PageRequest,
    store: &dyn Datastore,
) -> Result<PageContext<RecipeDetail>, Error> {
    let filter = query.into_filter(viewer);
    let (rows, total_count) = store
        .filter_recipes(&filter, page.limit, page.offset())
        .await?;

    let mut details = Vec::with_capacity(rows.len());
    for recipe in rows {
        details.push(build_recipe_detail(recipe, viewer, store).await?);
    }

    Ok(PageContext::from_rows(
        details,
        total_count,
        page,
        "/api/recipes",
    ))
}

pub async fn create_recipe(
    payload: RecipePayload,
    session: &SessionData,
    store: &dyn Datastore,
    assets: &dyn AssetStore,
) -> Result<RecipeDetail, Error> {
    session.authenticate(ActionType::CreateRecipes)?;

    let recipe = validate_recipe(payload, true, store).await?;
    let image = match recipe.image.as_deref() {
        Some(uri) => save_image(uri, assets).await?,
        None => return Err(Error::validation("Recipe image is required")),
    };

    let id = store
        .insert_recipe(
            session.user_id,
            RecipeWrite {
                name: recipe.name,
                text: recipe.text,
                cooking_time: recipe.cooking_time,
                image: Some(image),
                ingredients: recipe.ingredients,
                tags: recipe.tags,
            },
        )
        .await?;

    log::info!("User {} created recipe {id}", session.user_id);

    get_recipe(id, Some(session.user_id), store).await
}

pub async fn update_recipe(
    id: Id,
    payload: RecipePayload,
    session: &SessionData,
    store: &dyn Datastore,
    assets: &dyn AssetStore,
) -> Result<RecipeDetail, Error> {
    let existing = fetch_recipe(id, store).await?;
    session.authenticate_owner(existing.author_id)?;

    let recipe = validate_recipe(payload, false, store).await?;
    let image = match recipe.image.as_deref() {
        Some(uri) => Some(save_image(uri, assets).await?),
        None => None,
    };

    store
        .replace_recipe(
            id,
            RecipeWrite {
                name: recipe.name,
                text: recipe.text,
                cooking_time: recipe.cooking_time,
                image,
                ingredients: recipe.ingredients,
                tags: recipe.tags,
            },
        )
        .await?;

    log::info!("User {} updated recipe {id}", session.user_id);

    get_recipe(id, Some(session.user_id), store).await
}

pub async fn delete_recipe(
    id: Id,
    session: &SessionData,
    store: &dyn Datastore,
) -> Result<(), Error> {
    let existing = fetch_recipe(id, store).await?;
    session.authenticate_owner(existing.author_id)?;

    if !store.delete_recipe(id).await? {
        return Err(Error::not_found("No recipe exists with specified id"));
    }

    log::info!("User {} deleted recipe {id}", session.user_id);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_filters_need_a_viewer() {
        let query = RecipeQuery {
            tags: vec![String::from("lunch")],
            author: Some(2),
            is_favorited: true,
            is_in_shopping_cart: true,
        };

        let anonymous = query.clone().into_filter(None);
        assert_eq!(anonymous.favorited_by, None);
        assert_eq!(anonymous.in_cart_of, None);
        assert_eq!(anonymous.author, Some(2));

        let user = query.into_filter(Some(5));
        assert_eq!(user.favorited_by, Some(5));
        assert_eq!(user.in_cart_of, Some(5));
    }

    #[test]
    fn query_is_read_from_form() {
        let form = Form::from_data(vec![
            (String::from("tags"), String::from("breakfast")),
            (String::from("tags"), String::from("dinner")),
            (String::from("is_favorited"), String::from("1")),
        ]);

        let query = RecipeQuery::from_form(&form).unwrap();
        assert_eq!(query.tags, vec!["breakfast", "dinner"]);
        assert!(query.is_favorited);
        assert!(!query.is_in_shopping_cart);
        assert_eq!(query.author, None);
    }
}
