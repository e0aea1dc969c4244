use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Executor, Pool, Postgres, QueryBuilder, Transaction};

use super::{
    error::{recipe_write_error, Error},
    schema::{
        Id, Ingredient, NewIngredient, NewTag, NewUser, Recipe, RecipeFilter, RecipePart,
        RecipeRelation, RecipeRow, RecipeRowCounts, RecipeWrite, ShoppingListEntry, Tag, User,
    },
    store::Datastore,
};

pub const SCHEMA: &str = r#"
DO $$ BEGIN
    CREATE TYPE user_role AS ENUM ('user', 'admin');
EXCEPTION
    WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS users (
    id SERIAL PRIMARY KEY,
    email VARCHAR(254) NOT NULL UNIQUE,
    username VARCHAR(150) NOT NULL UNIQUE,
    first_name VARCHAR(150) NOT NULL,
    last_name VARCHAR(150) NOT NULL,
    password TEXT NOT NULL,
    role user_role NOT NULL DEFAULT 'user'
);

CREATE TABLE IF NOT EXISTS ingredients (
    id SERIAL PRIMARY KEY,
    name VARCHAR(200) NOT NULL,
    measurement_unit VARCHAR(200) NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS users_lower_email_idx ON users (LOWER(email));

CREATE INDEX IF NOT EXISTS ingredients_lower_name_idx ON ingredients (LOWER(name));

CREATE TABLE IF NOT EXISTS tags (
    id SERIAL PRIMARY KEY,
    name VARCHAR(200) NOT NULL UNIQUE,
    color VARCHAR(7) NOT NULL UNIQUE,
    slug VARCHAR(200) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS recipes (
    id SERIAL PRIMARY KEY,
    author_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    name VARCHAR(200) NOT NULL,
    text TEXT NOT NULL,
    cooking_time INTEGER NOT NULL CHECK (cooking_time > 0),
    image TEXT NOT NULL,
    pub_date TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS recipe_ingredients (
    recipe_id INTEGER NOT NULL REFERENCES recipes (id) ON DELETE CASCADE,
    ingredient_id INTEGER NOT NULL REFERENCES ingredients (id) ON DELETE CASCADE,
    amount INTEGER NOT NULL CHECK (amount > 0),
    CONSTRAINT unique_recipe_ingredient UNIQUE (recipe_id, ingredient_id)
);

CREATE TABLE IF NOT EXISTS recipe_tags (
    recipe_id INTEGER NOT NULL REFERENCES recipes (id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags (id) ON DELETE CASCADE,
    CONSTRAINT unique_recipe_tag UNIQUE (recipe_id, tag_id)
);

CREATE TABLE IF NOT EXISTS favorites (
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    recipe_id INTEGER NOT NULL REFERENCES recipes (id) ON DELETE CASCADE,
    pub_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT unique_favorite_recipe UNIQUE (user_id, recipe_id)
);

CREATE TABLE IF NOT EXISTS shopping_carts (
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    recipe_id INTEGER NOT NULL REFERENCES recipes (id) ON DELETE CASCADE,
    pub_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT unique_shoppingcart_recipe UNIQUE (user_id, recipe_id)
);

CREATE TABLE IF NOT EXISTS subscriptions (
    user_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    following_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    CONSTRAINT unique_user_following UNIQUE (user_id, following_id),
    CONSTRAINT no_self_subscription CHECK (user_id <> following_id)
);
"#;

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Creates missing tables, types and indexes. Safe to run on every start.
    pub async fn init_schema(&self) -> Result<(), Error> {
        self.pool.execute(SCHEMA).await?;
        log::info!("Database schema is up to date");

        Ok(())
    }
}

async fn insert_recipe_links(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Id,
    recipe: &RecipeWrite,
) -> Result<(), Error> {
    if !recipe.tags.is_empty() {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");

        query_builder.push_values(recipe.tags.iter(), |mut b, tag_id| {
            b.push_bind(recipe_id).push_bind(*tag_id);
        });

        query_builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(recipe_write_error)?;
    }

    if !recipe.ingredients.is_empty() {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ",
        );

        query_builder.push_values(recipe.ingredients.iter(), |mut b, part| {
            b.push_bind(recipe_id)
                .push_bind(part.id)
                .push_bind(part.amount);
        });

        query_builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(recipe_write_error)?;
    }

    Ok(())
}

/// Appends the `AND ...` conditions of `filter` to a query over `recipes r`.
fn push_recipe_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &RecipeFilter) {
    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    if let Some(user_id) = filter.favorited_by {
        query
            .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
            .push_bind(user_id)
            .push(")");
    }

    if let Some(user_id) = filter.in_cart_of {
        query
            .push(" AND EXISTS (SELECT 1 FROM shopping_carts sc WHERE sc.recipe_id = r.id AND sc.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn missing_ids(requested: &[Id], found: Vec<(Id,)>) -> Vec<Id> {
    let found: HashSet<Id> = found.into_iter().map(|row| row.0).collect();
    requested
        .iter()
        .filter(|id| !found.contains(id))
        .copied()
        .collect()
}

#[async_trait]
impl Datastore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, Error> {
        let row: User = sqlx::query_as(
            "
            INSERT INTO users (email, username, first_name, last_name, password, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        ",
        )
        .bind(user.email)
        .bind(user.username)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.password)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>, Error> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row: Option<User> =
            sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row)
    }

    async fn insert_ingredients(&self, ingredients: Vec<NewIngredient>) -> Result<u64, Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for ingredient in ingredients {
            let result = sqlx::query(
                "
                INSERT INTO ingredients (name, measurement_unit)
                SELECT $1::VARCHAR, $2::VARCHAR
                WHERE NOT EXISTS (
                    SELECT 1 FROM ingredients WHERE name = $1 AND measurement_unit = $2
                )
            ",
            )
            .bind(ingredient.name)
            .bind(ingredient.measurement_unit)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        Ok(inserted)
    }

    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, Error> {
        let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn search_ingredients(&self, prefix: &str) -> Result<Vec<Ingredient>, Error> {
        let rows: Vec<Ingredient> = sqlx::query_as(
            r#"
            SELECT * FROM ingredients
            WHERE name ILIKE $1
            ORDER BY LOWER(name) COLLATE "C", name COLLATE "C", measurement_unit COLLATE "C"
        "#,
        )
        .bind(format!("{}%", escape_like(prefix)))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn missing_ingredients(&self, ids: &[Id]) -> Result<Vec<Id>, Error> {
        let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        Ok(missing_ids(ids, found))
    }

    async fn insert_tag(&self, tag: NewTag) -> Result<Tag, Error> {
        let row: Tag =
            sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *")
                .bind(tag.name)
                .bind(tag.color)
                .bind(tag.slug)
                .fetch_one(&self.pool)
                .await?;

        Ok(row)
    }

    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, Error> {
        let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let rows: Vec<Tag> =
            sqlx::query_as(r#"SELECT * FROM tags ORDER BY LOWER(name) COLLATE "C", name COLLATE "C""#)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }

    async fn missing_tags(&self, ids: &[Id]) -> Result<Vec<Id>, Error> {
        let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        Ok(missing_ids(ids, found))
    }

    async fn insert_recipe(&self, author_id: Id, recipe: RecipeWrite) -> Result<Id, Error> {
        let mut tx = self.pool.begin().await?;

        let id: (Id,) = sqlx::query_as(
            "
            INSERT INTO recipes (author_id, name, text, cooking_time, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
        ",
        )
        .bind(author_id)
        .bind(&recipe.name)
        .bind(&recipe.text)
        .bind(recipe.cooking_time)
        .bind(recipe.image.as_deref().unwrap_or(""))
        .fetch_one(&mut *tx)
        .await
        .map_err(recipe_write_error)?;

        insert_recipe_links(&mut tx, id.0, &recipe).await?;

        tx.commit().await?;

        Ok(id.0)
    }

    async fn replace_recipe(&self, id: Id, recipe: RecipeWrite) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Id,)> = sqlx::query_as("SELECT id FROM recipes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if row.is_none() {
            return Err(Error::not_found("No recipe exists with specified id"));
        }

        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_recipe_links(&mut tx, id, &recipe).await?;

        sqlx::query(
            "
            UPDATE recipes SET
            name = $1,
            text = $2,
            cooking_time = $3,
            image = COALESCE($4, image)
            WHERE id = $5
        ",
        )
        .bind(&recipe.name)
        .bind(&recipe.text)
        .bind(recipe.cooking_time)
        .bind(recipe.image.as_deref())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn delete_recipe(&self, id: Id) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, Error> {
        let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn recipe_parts(&self, recipe_id: Id) -> Result<Vec<RecipePart>, Error> {
        let rows: Vec<RecipePart> = sqlx::query_as(
            r#"
            SELECT i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ri.amount AS amount
            FROM recipe_ingredients ri
            INNER JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE ri.recipe_id = $1
            ORDER BY LOWER(i.name) COLLATE "C", i.name COLLATE "C"
        "#,
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error> {
        let rows: Vec<Tag> = sqlx::query_as(
            r#"
            SELECT t.*
            FROM recipe_tags rt
            INNER JOIN tags t ON t.id = rt.tag_id
            WHERE rt.recipe_id = $1
            ORDER BY LOWER(t.name) COLLATE "C", t.name COLLATE "C"
        "#,
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn filter_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");
        push_recipe_filter(&mut query, filter);

        query
            .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<RecipeRow> = query.build_query_as().fetch_all(&self.pool).await?;

        let total_count = match rows.first() {
            Some(row) => row.count,
            // past the last page the window count has no row to ride on
            None if offset > 0 => {
                let mut count: QueryBuilder<Postgres> =
                    QueryBuilder::new("SELECT COUNT(*) FROM recipes r WHERE TRUE");
                push_recipe_filter(&mut count, filter);
                let total: (i64,) = count.build_query_as().fetch_one(&self.pool).await?;
                total.0
            }
            None => 0,
        };
        let rows = rows.into_iter().map(Recipe::from).collect();

        Ok((rows, total_count))
    }

    async fn recipe_row_counts(&self, recipe_id: Id) -> Result<RecipeRowCounts, Error> {
        let counts: RecipeRowCounts = sqlx::query_as(
            "
            SELECT
                (SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = $1) AS ingredients,
                (SELECT COUNT(*) FROM recipe_tags WHERE recipe_id = $1) AS tags,
                (SELECT COUNT(*) FROM favorites WHERE recipe_id = $1) AS favorites,
                (SELECT COUNT(*) FROM shopping_carts WHERE recipe_id = $1) AS shopping_carts
        ",
        )
        .bind(recipe_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }

    async fn insert_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<(), Error> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            relation.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "Recipe is already in {}",
                relation.label()
            )));
        }

        Ok(())
    }

    async fn delete_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
            relation.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        let row: Option<(Id,)> = sqlx::query_as(&format!(
            "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = $2",
            relation.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn shopping_list(&self, user_id: Id) -> Result<Vec<ShoppingListEntry>, Error> {
        let rows: Vec<ShoppingListEntry> = sqlx::query_as(
            r#"
            SELECT i.name AS name, i.measurement_unit AS measurement_unit, SUM(ri.amount)::BIGINT AS total_amount
            FROM shopping_carts sc
            INNER JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
            INNER JOIN ingredients i ON i.id = ri.ingredient_id
            WHERE sc.user_id = $1
            GROUP BY i.id, i.name, i.measurement_unit
            ORDER BY LOWER(i.name) COLLATE "C", i.name COLLATE "C", i.measurement_unit COLLATE "C"
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn insert_subscription(&self, user_id: Id, following_id: Id) -> Result<(), Error> {
        let result = sqlx::query(
            "INSERT INTO subscriptions (user_id, following_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(following_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::conflict("Already subscribed to this user"));
        }

        Ok(())
    }

    async fn delete_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        let result =
            sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND following_id = $2")
                .bind(user_id)
                .bind(following_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_subscribed(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        let row: Option<(Id,)> = sqlx::query_as(
            "SELECT following_id FROM subscriptions WHERE user_id = $1 AND following_id = $2",
        )
        .bind(user_id)
        .bind(following_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn list_subscriptions(
        &self,
        user_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<User> = sqlx::query_as(
            r#"
            SELECT u.*
            FROM subscriptions s
            INNER JOIN users u ON u.id = s.following_id
            WHERE s.user_id = $1
            ORDER BY LOWER(u.username) COLLATE "C", u.username COLLATE "C"
            LIMIT $2 OFFSET $3
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total.0))
    }

    async fn recipes_by_author(
        &self,
        author_id: Id,
        limit: Option<i64>,
    ) -> Result<Vec<Recipe>, Error> {
        let rows: Vec<Recipe> = sqlx::query_as(
            "SELECT * FROM recipes WHERE author_id = $1 ORDER BY pub_date DESC, id DESC LIMIT $2",
        )
        .bind(author_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_recipes_by_author(&self, author_id: Id) -> Result<i64, Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn missing_ids_keep_request_order() {
        let missing = missing_ids(&[4, 1, 9, 2], vec![(1,), (2,)]);
        assert_eq!(missing, vec![4, 9]);
    }
}
