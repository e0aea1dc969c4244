use async_trait::async_trait;

use super::{
    error::Error,
    schema::{
        Id, Ingredient, NewIngredient, NewTag, NewUser, Recipe, RecipeFilter, RecipePart,
        RecipeRelation, RecipeRowCounts, RecipeWrite, ShoppingListEntry, Tag, User,
    },
};

/// Relational datastore handle injected into every action.
///
/// Implementations must enforce the constraints the actions rely on:
/// unique (user, recipe) relation pairs, unique (recipe, ingredient) and
/// (recipe, tag) pairs, unique (user, following) subscriptions with
/// `user <> following`, cascade deletes from recipes, and atomicity of every
/// multi-row write. Unique/check violations surface as [`Error::Conflict`],
/// dangling references as [`Error::NotFound`].
#[async_trait]
pub trait Datastore: Send + Sync {
    // users

    async fn insert_user(&self, user: NewUser) -> Result<User, Error>;

    async fn get_user(&self, id: Id) -> Result<Option<User>, Error>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    // reference data

    async fn insert_ingredients(&self, ingredients: Vec<NewIngredient>) -> Result<u64, Error>;

    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, Error>;

    /// Ingredients whose name starts with `prefix` (case-insensitive), ordered by name.
    async fn search_ingredients(&self, prefix: &str) -> Result<Vec<Ingredient>, Error>;

    /// Returns the subset of `ids` that has no ingredient row.
    async fn missing_ingredients(&self, ids: &[Id]) -> Result<Vec<Id>, Error>;

    async fn insert_tag(&self, tag: NewTag) -> Result<Tag, Error>;

    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, Error>;

    async fn list_tags(&self) -> Result<Vec<Tag>, Error>;

    /// Returns the subset of `ids` that has no tag row.
    async fn missing_tags(&self, ids: &[Id]) -> Result<Vec<Id>, Error>;

    // recipes

    /// Inserts the recipe, its tag links and ingredient rows atomically.
    async fn insert_recipe(&self, author_id: Id, recipe: RecipeWrite) -> Result<Id, Error>;

    /// Replaces tag links and ingredient rows, then the scalar fields, atomically.
    /// A `None` image keeps the stored one.
    async fn replace_recipe(&self, id: Id, recipe: RecipeWrite) -> Result<(), Error>;

    /// Deletes the recipe and everything hanging off it. Returns false when absent.
    async fn delete_recipe(&self, id: Id) -> Result<bool, Error>;

    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, Error>;

    async fn recipe_parts(&self, recipe_id: Id) -> Result<Vec<RecipePart>, Error>;

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error>;

    /// Newest first. Returns the page and the total number of matches.
    async fn filter_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error>;

    async fn recipe_row_counts(&self, recipe_id: Id) -> Result<RecipeRowCounts, Error>;

    // favorites and shopping carts

    /// Fails with a conflict when the pair already exists.
    async fn insert_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<(), Error>;

    /// Returns false when the pair did not exist.
    async fn delete_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error>;

    async fn has_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error>;

    /// Ingredient totals over every recipe in the user's cart, ordered by name.
    async fn shopping_list(&self, user_id: Id) -> Result<Vec<ShoppingListEntry>, Error>;

    // subscriptions

    async fn insert_subscription(&self, user_id: Id, following_id: Id) -> Result<(), Error>;

    async fn delete_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error>;

    async fn is_subscribed(&self, user_id: Id, following_id: Id) -> Result<bool, Error>;

    /// Followed authors ordered by username, with the total count.
    async fn list_subscriptions(
        &self,
        user_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error>;

    /// Newest first, at most `limit` when given.
    async fn recipes_by_author(
        &self,
        author_id: Id,
        limit: Option<i64>,
    ) -> Result<Vec<Recipe>, Error>;

    async fn count_recipes_by_author(&self, author_id: Id) -> Result<i64, Error>;
}
